//! Core types and contracts for the Strahl beam-transport engine.
//!
//! This is the leaf crate with zero internal dependencies. It defines the
//! configuration tree, the shared error types, and the [`State`] /
//! [`Element`] / [`Observer`] contracts that every simulation type
//! implements. The engine crate builds machines out of these contracts;
//! the elements crate provides concrete implementations.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod element;
pub mod error;
pub mod state;

pub use config::{Config, Value};
pub use element::{DisplayElement, Element, ElementBuild, ElementCore, Observer};
pub use error::{AdvanceError, BuildError, ConfigError, StateError};
pub use state::{ArrayData, ArrayShape, ArrayView, DisplayState, State, StateBuild, StateCore};
