//! Hierarchical configuration tree with typed lookups.
//!
//! A [`Config`] is a read-mostly, ordered map from string keys to
//! [`Value`]s: scalars, strings, numeric vectors, or lists of nested
//! configs (used for a machine's element sequence). Parsing lattice files
//! into configs is out of scope here; configs arrive as values.

use indexmap::IndexMap;
use std::fmt;

use crate::error::ConfigError;

/// A single configuration value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// A floating-point scalar.
    Scalar(f64),
    /// A string.
    Str(String),
    /// A flat numeric vector (also used for row-major matrices).
    Vector(Vec<f64>),
    /// An ordered list of nested configs.
    Configs(Vec<Config>),
}

impl Value {
    /// Short name of the variant, used in type-mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Str(_) => "string",
            Self::Vector(_) => "vector",
            Self::Configs(_) => "configs",
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Scalar(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Self::Vector(v)
    }
}

impl From<Vec<Config>> for Value {
    fn from(v: Vec<Config>) -> Self {
        Self::Configs(v)
    }
}

/// An ordered key/value configuration tree.
///
/// Key order is insertion order and is preserved by [`Config::keys`] and
/// the [`fmt::Display`] rendering. Lookups are typed: asking for a key
/// that is absent yields [`ConfigError::Missing`]; asking with the wrong
/// type yields [`ConfigError::WrongType`] even when a default is supplied.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Config {
    entries: IndexMap<String, Value>,
}

impl Config {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value under `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Builder-style [`insert`](Config::insert).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Raw value lookup.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    fn require(&self, key: &str) -> Result<&Value, ConfigError> {
        self.entries.get(key).ok_or_else(|| ConfigError::Missing {
            key: key.to_string(),
        })
    }

    fn mismatch(key: &str, expected: &'static str, found: &Value) -> ConfigError {
        ConfigError::WrongType {
            key: key.to_string(),
            expected,
            found: found.kind(),
        }
    }

    /// Required scalar lookup.
    pub fn get_f64(&self, key: &str) -> Result<f64, ConfigError> {
        match self.require(key)? {
            Value::Scalar(v) => Ok(*v),
            other => Err(Self::mismatch(key, "scalar", other)),
        }
    }

    /// Scalar lookup with a default for absent keys.
    ///
    /// A present key of the wrong type is still an error; the default only
    /// covers absence.
    pub fn get_f64_or(&self, key: &str, default: f64) -> Result<f64, ConfigError> {
        match self.entries.get(key) {
            None => Ok(default),
            Some(Value::Scalar(v)) => Ok(*v),
            Some(other) => Err(Self::mismatch(key, "scalar", other)),
        }
    }

    /// Required string lookup.
    pub fn get_str(&self, key: &str) -> Result<&str, ConfigError> {
        match self.require(key)? {
            Value::Str(v) => Ok(v),
            other => Err(Self::mismatch(key, "string", other)),
        }
    }

    /// String lookup with a default for absent keys.
    pub fn get_str_or<'a>(&'a self, key: &str, default: &'a str) -> Result<&'a str, ConfigError> {
        match self.entries.get(key) {
            None => Ok(default),
            Some(Value::Str(v)) => Ok(v),
            Some(other) => Err(Self::mismatch(key, "string", other)),
        }
    }

    /// Required numeric-vector lookup.
    pub fn get_vector(&self, key: &str) -> Result<&[f64], ConfigError> {
        match self.require(key)? {
            Value::Vector(v) => Ok(v),
            other => Err(Self::mismatch(key, "vector", other)),
        }
    }

    /// Optional numeric-vector lookup: `Ok(None)` when absent.
    pub fn get_vector_opt(&self, key: &str) -> Result<Option<&[f64]>, ConfigError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(Value::Vector(v)) => Ok(Some(v)),
            Some(other) => Err(Self::mismatch(key, "vector", other)),
        }
    }

    /// Required nested-config-list lookup.
    pub fn get_configs(&self, key: &str) -> Result<&[Config], ConfigError> {
        match self.require(key)? {
            Value::Configs(v) => Ok(v),
            other => Err(Self::mismatch(key, "configs", other)),
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.entries {
            match value {
                Value::Scalar(v) => writeln!(f, "{key} = {v}")?,
                Value::Str(v) => writeln!(f, "{key} = \"{v}\"")?,
                Value::Vector(v) => writeln!(f, "{key} = {v:?}")?,
                Value::Configs(list) => {
                    writeln!(f, "{key} = [{} configs]", list.len())?;
                }
            }
        }
        Ok(())
    }
}
