//! Error types shared across the Strahl workspace.
//!
//! Organized by subsystem: configuration lookup, state assignment,
//! element/state construction, and per-element advance. Registry and
//! machine errors live in the engine crate next to their subsystems.

use std::error::Error;
use std::fmt;

/// Errors from typed [`Config`](crate::Config) lookups.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A required key is absent and no default was supplied.
    Missing {
        /// The missing key.
        key: String,
    },
    /// The key is present but holds a different value variant.
    WrongType {
        /// The offending key.
        key: String,
        /// The variant the caller asked for.
        expected: &'static str,
        /// The variant actually stored.
        found: &'static str,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { key } => write!(f, "missing required parameter '{key}'"),
            Self::WrongType {
                key,
                expected,
                found,
            } => {
                write!(f, "parameter '{key}' has type {found}, expected {expected}")
            }
        }
    }
}

impl Error for ConfigError {}

/// Errors from [`State::assign`](crate::State::assign).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateError {
    /// Source and destination states belong to different simulation types.
    KindMismatch {
        /// Kind of the destination state.
        expected: &'static str,
        /// Kind of the source state.
        found: &'static str,
    },
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KindMismatch { expected, found } => {
                write!(f, "cannot assign state of kind '{found}' to '{expected}'")
            }
        }
    }
}

impl Error for StateError {}

/// Errors raised while building a state or element from a config.
///
/// The machine constructor maps `Config(Missing)` to its `MissingParameter`
/// variant (annotated with element index and name) and everything else to
/// a generic construction failure.
#[derive(Clone, Debug, PartialEq)]
pub enum BuildError {
    /// A config lookup failed.
    Config(ConfigError),
    /// Any other construction failure, described in prose.
    Other(String),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "{e}"),
            Self::Other(reason) => write!(f, "{reason}"),
        }
    }
}

impl Error for BuildError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Other(_) => None,
        }
    }
}

impl From<ConfigError> for BuildError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Errors from [`Element::advance`](crate::Element::advance).
///
/// These propagate unmodified to the `propagate` caller; the state's
/// contents are unspecified afterwards and must be discarded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdvanceError {
    /// The element was handed a state of a kind it cannot transform.
    Unsupported {
        /// Name of the element.
        element: String,
        /// Kind of the state it received.
        state_kind: &'static str,
    },
    /// A numerical failure during the transform.
    Numerical {
        /// Name of the element.
        element: String,
        /// Description of the failure.
        reason: String,
    },
}

impl fmt::Display for AdvanceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported {
                element,
                state_kind,
            } => {
                write!(
                    f,
                    "element '{element}' cannot advance a state of kind '{state_kind}'"
                )
            }
            Self::Numerical { element, reason } => {
                write!(f, "element '{element}' failed: {reason}")
            }
        }
    }
}

impl Error for AdvanceError {}
