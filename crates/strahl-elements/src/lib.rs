//! Reference simulation types and elements for the Strahl engine.
//!
//! Two simulation types, each with its own state representation and
//! element catalogue:
//!
//! 1. [`vector`] — single-particle linear optics on a 6-component
//!    phase-space vector.
//! 2. [`moment`] — envelope tracking of a bunch centroid plus its
//!    second-moment (covariance) matrix, with a reference particle for
//!    phase/energy bookkeeping. Includes the energy-cached
//!    [`rf_cavity::RfCavityElement`].
//!
//! Call [`register_all`] once at startup (or the per-type `register_*`
//! functions) before constructing machines.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod moment;
pub mod rf_cavity;
pub mod transfer;
pub mod vector;

pub use moment::register_moment;
pub use vector::register_vector;

use strahl_engine::RegistryError;

/// Register every simulation type this crate provides.
pub fn register_all() -> Result<(), RegistryError> {
    register_vector()?;
    register_moment()?;
    Ok(())
}
