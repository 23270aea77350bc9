//! Strahl: a beam-transport simulation engine with pluggable simulation
//! types.
//!
//! This is the top-level facade crate re-exporting the public API of the
//! Strahl sub-crates. For most users, adding `strahl` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use strahl::{Config, Machine, State};
//!
//! strahl::register_all().unwrap();
//!
//! let conf = Config::new().with("sim_type", "vector").with(
//!     "elements",
//!     vec![
//!         Config::new()
//!             .with("name", "s0")
//!             .with("type", "source")
//!             .with("initial", vec![0.0, 1.0e-3, 0.0, 0.0, 0.0, 0.0]),
//!         Config::new()
//!             .with("name", "d0")
//!             .with("type", "drift")
//!             .with("L", 2.0),
//!     ],
//! );
//!
//! let mut machine = Machine::new(&conf).unwrap();
//! let mut state = machine.alloc_state_default().unwrap();
//! machine.propagate_all(state.as_mut()).unwrap();
//!
//! assert_eq!(state.core().next_elem, 2);
//! assert_eq!(state.core().pos, 2.0);
//! ```
//!
//! # Custom simulation types
//!
//! Implement [`State`]/[`StateBuild`] and [`Element`]/[`ElementBuild`],
//! then register them through [`registry`]; the machine resolves element
//! types by name from the bound catalogue. See the `strahl-elements`
//! sources for two complete examples.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub use strahl_core::{
    AdvanceError, ArrayData, ArrayView, BuildError, Config, ConfigError, DisplayElement,
    DisplayState, Element, ElementBuild, ElementCore, Observer, State, StateBuild, StateCore,
    StateError, Value,
};
pub use strahl_engine::{registry, Machine, MachineError, RegistryError};

/// The reference simulation types (`"vector"`, `"moment"`).
pub use strahl_elements::{moment, rf_cavity, register_all, transfer, vector};

/// Everything needed to build and run a machine.
pub mod prelude {
    pub use strahl_core::{Config, Element, Observer, State};
    pub use strahl_elements::register_all;
    pub use strahl_engine::Machine;
}
