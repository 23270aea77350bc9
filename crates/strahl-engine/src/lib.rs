//! Simulation-type registry and machine pipeline for Strahl.
//!
//! The [`registry`] module holds the process-wide mapping from simulation
//! type name to state constructor and element catalogue; physics crates
//! populate it at startup. The [`machine`] module builds ordered element
//! pipelines from configs and drives states through them.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod machine;
pub mod registry;

pub use machine::{Machine, MachineError};
pub use registry::{
    register_element, register_state, ElementBuilder, RebuildError, RegistryError, SimTypeInfo,
};
