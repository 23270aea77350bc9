//! Process-wide simulation-type registry.
//!
//! Maps a simulation-type name to its state constructor and element
//! catalogue. Physics crates populate the registry once at startup via
//! [`register_state`] and [`register_element`]; every machine
//! construction consults it through [`lookup`]. One exclusive lock
//! serializes all access, held only for the duration of the individual
//! call — element building happens outside it.

use indexmap::IndexMap;
use std::error::Error;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use strahl_core::{BuildError, Config, Element, ElementBuild, State, StateBuild};

// ── Builders ───────────────────────────────────────────────────────

/// Errors from [`ElementBuilder::rebuild`].
#[derive(Clone, Debug, PartialEq)]
pub enum RebuildError {
    /// Building the transient replacement failed.
    Build(BuildError),
    /// The existing element is of a different concrete kind than the
    /// replacement; reconfiguration cannot change element kind.
    TypeMismatch {
        /// Type name of the existing element.
        expected: &'static str,
        /// Type name the new config resolved to.
        requested: &'static str,
    },
}

impl fmt::Display for RebuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build(e) => write!(f, "{e}"),
            Self::TypeMismatch {
                expected,
                requested,
            } => {
                write!(
                    f,
                    "reconfigure cannot change element kind ('{expected}' to '{requested}')"
                )
            }
        }
    }
}

impl Error for RebuildError {}

/// Factory for one element type in a simulation type's catalogue.
///
/// `build` constructs a fresh element; `rebuild` replaces an existing
/// element's value in place, preserving its pipeline index, observer,
/// and storage identity.
pub trait ElementBuilder: Send + Sync {
    /// Construct a fresh element from `conf`.
    fn build(&self, conf: &Config) -> Result<Box<dyn Element>, BuildError>;

    /// Rebuild `target` in place from `conf`.
    ///
    /// Builds a transient replacement, requires `target` to be the same
    /// concrete kind ([`RebuildError::TypeMismatch`] otherwise, leaving
    /// `target` untouched), then moves the replacement into `target`'s
    /// storage. The target's index and observer carry over; its name and
    /// configuration-derived parameters come from the replacement.
    fn rebuild(&self, target: &mut Box<dyn Element>, conf: &Config) -> Result<(), RebuildError>;
}

/// Generic [`ElementBuilder`] for any [`ElementBuild`] type.
struct BuilderFor<E>(PhantomData<fn() -> E>);

impl<E: ElementBuild> ElementBuilder for BuilderFor<E> {
    fn build(&self, conf: &Config) -> Result<Box<dyn Element>, BuildError> {
        Ok(Box::new(E::build(conf)?))
    }

    fn rebuild(&self, target: &mut Box<dyn Element>, conf: &Config) -> Result<(), RebuildError> {
        let mut replacement = E::build(conf).map_err(RebuildError::Build)?;
        let expected = target.type_name();
        match target.as_any_mut().downcast_mut::<E>() {
            Some(existing) => {
                replacement.core_mut().set_index(existing.core().index());
                let observer = existing.core_mut().take_observer();
                replacement.core_mut().set_observer(observer);
                *existing = replacement;
                Ok(())
            }
            None => Err(RebuildError::TypeMismatch {
                expected,
                requested: replacement.type_name(),
            }),
        }
    }
}

// ── Simulation-type entries ────────────────────────────────────────

type StateBuilderFn = dyn Fn(&Config) -> Result<Box<dyn State>, BuildError> + Send + Sync;

/// One registry entry: a simulation type's state constructor and element
/// catalogue.
///
/// [`lookup`] hands out clones; the builders are `Arc`-shared, so a
/// machine keeps its bound entry alive independently of later registry
/// mutation (including [`reset`]).
#[derive(Clone)]
pub struct SimTypeInfo {
    name: Arc<str>,
    state_builder: Arc<StateBuilderFn>,
    elements: IndexMap<String, Arc<dyn ElementBuilder>>,
}

impl SimTypeInfo {
    /// The simulation-type name this entry was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Construct a state of this simulation type.
    pub fn alloc_state(&self, conf: &Config) -> Result<Box<dyn State>, BuildError> {
        (self.state_builder)(conf)
    }

    /// The builder registered under `elem_type`, if any.
    pub fn element_builder(&self, elem_type: &str) -> Option<&Arc<dyn ElementBuilder>> {
        self.elements.get(elem_type)
    }

    /// Registered element-type names, in registration order.
    pub fn element_types(&self) -> impl Iterator<Item = &str> {
        self.elements.keys().map(String::as_str)
    }
}

impl fmt::Debug for SimTypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimTypeInfo")
            .field("name", &self.name)
            .field("elements", &self.elements.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ── Errors ─────────────────────────────────────────────────────────

/// Errors from registration and lookup calls.
///
/// A failed call leaves the registry unchanged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// A simulation type with this name is already registered.
    DuplicateSimType {
        /// The contested name.
        sim_type: String,
    },
    /// An element type with this name is already registered under the
    /// simulation type.
    DuplicateElemType {
        /// The owning simulation type.
        sim_type: String,
        /// The contested element-type name.
        elem_type: String,
    },
    /// No simulation type with this name is registered.
    UnknownSimType {
        /// The name that failed to resolve.
        sim_type: String,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateSimType { sim_type } => {
                write!(f, "sim_type \"{sim_type}\" is already registered")
            }
            Self::DuplicateElemType {
                sim_type,
                elem_type,
            } => {
                write!(
                    f,
                    "element type \"{elem_type}\" is already registered for sim_type \"{sim_type}\""
                )
            }
            Self::UnknownSimType { sim_type } => {
                write!(f, "unsupported sim_type \"{sim_type}\"")
            }
        }
    }
}

impl Error for RegistryError {}

// ── Global registry ────────────────────────────────────────────────

static REGISTRY: LazyLock<Mutex<IndexMap<String, SimTypeInfo>>> =
    LazyLock::new(|| Mutex::new(IndexMap::new()));

fn registry() -> std::sync::MutexGuard<'static, IndexMap<String, SimTypeInfo>> {
    // No user code runs under the lock, so a poisoned mutex still holds
    // a consistent map.
    REGISTRY.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Register a new simulation type with `S` as its state representation.
///
/// Fails with [`RegistryError::DuplicateSimType`] if `name` is taken.
pub fn register_state<S: StateBuild>(name: &str) -> Result<(), RegistryError> {
    let mut reg = registry();
    if reg.contains_key(name) {
        return Err(RegistryError::DuplicateSimType {
            sim_type: name.to_string(),
        });
    }
    reg.insert(
        name.to_string(),
        SimTypeInfo {
            name: Arc::from(name),
            state_builder: Arc::new(|conf| Ok(Box::new(S::build(conf)?) as Box<dyn State>)),
            elements: IndexMap::new(),
        },
    );
    Ok(())
}

/// Register element type `E` under an existing simulation type.
///
/// Fails with [`RegistryError::UnknownSimType`] if `sim_type` is absent
/// and [`RegistryError::DuplicateElemType`] if `elem_type` is taken.
pub fn register_element<E: ElementBuild>(
    sim_type: &str,
    elem_type: &str,
) -> Result<(), RegistryError> {
    let mut reg = registry();
    let info = reg
        .get_mut(sim_type)
        .ok_or_else(|| RegistryError::UnknownSimType {
            sim_type: sim_type.to_string(),
        })?;
    if info.elements.contains_key(elem_type) {
        return Err(RegistryError::DuplicateElemType {
            sim_type: sim_type.to_string(),
            elem_type: elem_type.to_string(),
        });
    }
    info.elements
        .insert(elem_type.to_string(), Arc::new(BuilderFor::<E>(PhantomData)));
    Ok(())
}

/// Snapshot the entry for `sim_type`.
///
/// The returned entry is self-contained: machines bound to it keep
/// working across later registry mutation.
pub fn lookup(sim_type: &str) -> Result<SimTypeInfo, RegistryError> {
    registry()
        .get(sim_type)
        .cloned()
        .ok_or_else(|| RegistryError::UnknownSimType {
            sim_type: sim_type.to_string(),
        })
}

/// Discard every registered simulation type.
///
/// Intended for just before process exit (leak checking). Live machines
/// keep their `Arc`-shared entries and continue to function.
pub fn reset() {
    registry().clear();
}
