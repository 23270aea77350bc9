//! The element contract: identity, configuration snapshot, observers.
//!
//! An [`Element`] is one configured stage of a machine's pipeline. It
//! consumes a [`State`] and transforms it in place; subclasses may keep
//! cached derived data (a transfer operator) whose validity depends on
//! quantities observed from the state during `advance`.

use std::any::Any;
use std::fmt;

use crate::config::Config;
use crate::error::{AdvanceError, BuildError, ConfigError};
use crate::state::State;

/// External collaborator notified with the post-advance state of one
/// element.
///
/// Installed with [`ElementCore::set_observer`]; at most one per element.
/// Implementations needing to record what they saw use interior
/// mutability (`RefCell`, channels) behind the `&self` receiver.
pub trait Observer: Send {
    /// Inspect `state` as it leaves `element`.
    fn view(&self, element: &dyn Element, state: &dyn State);
}

/// Identity and shared storage carried by every element.
///
/// `name` and `index` are fixed by the machine at construction and only
/// rewritten through reconfiguration, which preserves the element's
/// storage identity.
pub struct ElementCore {
    name: String,
    index: usize,
    /// Longitudinal length of this element, added to the state's `pos`.
    pub length: f64,
    conf: Config,
    observer: Option<Box<dyn Observer>>,
}

impl fmt::Debug for ElementCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementCore")
            .field("name", &self.name)
            .field("index", &self.index)
            .field("length", &self.length)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl ElementCore {
    /// Read identity fields from a config. `name` is required; `L`
    /// defaults to zero.
    pub fn from_config(conf: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            name: conf.get_str("name")?.to_string(),
            index: 0,
            length: conf.get_f64_or("L", 0.0)?,
            conf: conf.clone(),
            observer: None,
        })
    }

    /// Element name, unique within its machine.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pipeline position, dense and zero-based.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Stamp the pipeline position. Called once by the machine during
    /// construction and again during reconfiguration to preserve the
    /// replaced element's identity; not for use by element code.
    pub fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    /// The config this element was built from, retained for
    /// reconfiguration and debugging.
    pub fn conf(&self) -> &Config {
        &self.conf
    }

    /// The installed observer, if any.
    pub fn observer(&self) -> Option<&dyn Observer> {
        self.observer.as_deref()
    }

    /// Install or clear the observer. Replaces any existing one.
    pub fn set_observer(&mut self, observer: Option<Box<dyn Observer>>) {
        self.observer = observer;
    }

    /// Detach the observer, leaving `None`. Used by reconfiguration to
    /// carry the observer over to the rebuilt element.
    pub fn take_observer(&mut self) -> Option<Box<dyn Observer>> {
        self.observer.take()
    }
}

/// One configured pipeline stage.
///
/// # Object safety
///
/// Object-safe; machines hold elements as `Box<dyn Element>`.
pub trait Element: Send + 'static {
    /// Shared identity and storage.
    fn core(&self) -> &ElementCore;

    /// Mutable access to shared identity and storage.
    fn core_mut(&mut self) -> &mut ElementCore;

    /// The catalogue key this element was registered under; also the
    /// kind discriminant checked by reconfiguration.
    fn type_name(&self) -> &'static str;

    /// Transform `state` in place.
    ///
    /// May overwrite `state.core_mut().next_elem` to branch or loop. On
    /// error the state's contents are unspecified.
    fn advance(&mut self, state: &mut dyn State) -> Result<(), AdvanceError>;

    /// One-line rendering, used by the machine's `Display`.
    fn show(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Element {}: {} ({})",
            self.core().index(),
            self.core().name(),
            self.type_name()
        )
    }

    /// Upcast for concrete-kind reads.
    fn as_any(&self) -> &dyn Any;

    /// Upcast for concrete-kind writes; reconfiguration downcasts through
    /// this to replace the element value in place.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Elements constructible from a config, used by registry registration.
pub trait ElementBuild: Element + Sized {
    /// Build a fresh element. Raising [`BuildError::Config`] for a
    /// missing key becomes the machine's `MissingParameter`, annotated
    /// with the element's pipeline index and declared name.
    fn build(conf: &Config) -> Result<Self, BuildError>;
}

/// Adapter making any `&dyn Element` usable with `{}` formatting.
pub struct DisplayElement<'a>(pub &'a dyn Element);

impl fmt::Display for DisplayElement<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.show(f)
    }
}
