//! The beam-state contract: scalar core fields, cloning, introspection.
//!
//! A [`State`] is the evolving description of a particle bunch as it moves
//! through a machine. Each simulation type provides one concrete state
//! implementation; elements downcast through [`State::as_any_mut`] to
//! reach the representation they transform.

use smallvec::SmallVec;
use std::any::Any;
use std::fmt;
use std::slice;

use crate::config::Config;
use crate::error::{BuildError, ConfigError, StateError};

/// Scalar fields every simulation state carries.
///
/// Constructed from a [`Config`] with zero defaults for absent keys.
/// `next_elem` is the index of the next element to execute; elements may
/// overwrite it during `advance` to branch or loop.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateCore {
    /// Index of the next element the machine will execute.
    pub next_elem: usize,
    /// Absolute longitudinal position at the end of the last element.
    pub pos: f64,
    /// Longitudinal-only mode flag; non-zero restricts cavity-like
    /// elements to reference-particle propagation.
    pub clng: f64,
    /// Ionic charge state.
    pub ion_z: f64,
    /// Rest energy.
    pub ion_es: f64,
    /// Kinetic energy.
    pub ion_ek: f64,
    /// Total energy.
    pub ion_w: f64,
}

impl StateCore {
    /// Number of introspectable core arrays; concrete states start their
    /// own arrays at this index.
    pub const ARRAY_COUNT: usize = 7;

    /// Read the scalar fields from a config, zero-defaulting absent keys.
    pub fn from_config(conf: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            next_elem: 0,
            pos: conf.get_f64_or("pos", 0.0)?,
            clng: conf.get_f64_or("clng", 0.0)?,
            ion_z: conf.get_f64_or("IonZ", 0.0)?,
            ion_es: conf.get_f64_or("IonEs", 0.0)?,
            ion_ek: conf.get_f64_or("IonEk", 0.0)?,
            ion_w: conf.get_f64_or("IonW", 0.0)?,
        })
    }

    /// Introspect core field `idx`; `None` past [`StateCore::ARRAY_COUNT`].
    ///
    /// Concrete states chain onto this for indices below `ARRAY_COUNT` and
    /// append their own arrays after it.
    pub fn get_array(&self, idx: usize) -> Option<ArrayView<'_>> {
        let view = match idx {
            0 => ArrayView::index_scalar("next_elem", &self.next_elem),
            1 => ArrayView::f64_scalar("pos", &self.pos),
            2 => ArrayView::f64_scalar("clng", &self.clng),
            3 => ArrayView::f64_scalar("IonZ", &self.ion_z),
            4 => ArrayView::f64_scalar("IonEs", &self.ion_es),
            5 => ArrayView::f64_scalar("IonEk", &self.ion_ek),
            6 => ArrayView::f64_scalar("IonW", &self.ion_w),
            _ => return None,
        };
        Some(view)
    }

    /// Render the scalar fields, one `name=value` pair per line group.
    pub fn show(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "next_elem={} pos={} IonZ={} IonEs={} IonEk={} IonW={}",
            self.next_elem, self.pos, self.ion_z, self.ion_es, self.ion_ek, self.ion_w
        )
    }
}

/// Borrowed storage behind one introspected array.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ArrayData<'a> {
    /// Floating-point storage.
    F64(&'a [f64]),
    /// Index-typed storage (`next_elem`).
    Index(&'a [usize]),
}

/// Shape of an introspected array; empty = scalar, one entry = vector,
/// two = matrix. Inline up to rank 2 without heap allocation.
pub type ArrayShape = SmallVec<[usize; 2]>;

/// Descriptor for one introspectable field of a [`State`].
///
/// The data borrows the state's own storage, so it stays valid (and
/// points at the same location) for as long as the borrow lives.
#[derive(Clone, Debug, PartialEq)]
pub struct ArrayView<'a> {
    /// Field name, stable per simulation type.
    pub name: &'static str,
    /// Borrowed storage.
    pub data: ArrayData<'a>,
    /// Dimensions; empty for scalars.
    pub shape: ArrayShape,
}

impl<'a> ArrayView<'a> {
    /// Scalar f64 view.
    pub fn f64_scalar(name: &'static str, value: &'a f64) -> Self {
        Self {
            name,
            data: ArrayData::F64(slice::from_ref(value)),
            shape: ArrayShape::new(),
        }
    }

    /// Scalar index view.
    pub fn index_scalar(name: &'static str, value: &'a usize) -> Self {
        Self {
            name,
            data: ArrayData::Index(slice::from_ref(value)),
            shape: ArrayShape::new(),
        }
    }

    /// Rank-1 f64 view over `len` entries.
    pub fn f64_vector(name: &'static str, data: &'a [f64]) -> Self {
        let mut shape = ArrayShape::new();
        shape.push(data.len());
        Self {
            name,
            data: ArrayData::F64(data),
            shape,
        }
    }

    /// Rank-2 f64 view with explicit dimensions.
    pub fn f64_matrix(name: &'static str, data: &'a [f64], rows: usize, cols: usize) -> Self {
        let mut shape = ArrayShape::new();
        shape.push(rows);
        shape.push(cols);
        Self {
            name,
            data: ArrayData::F64(data),
            shape,
        }
    }
}

/// The beam-state contract.
///
/// # Object safety
///
/// Object-safe; machines hold states as `Box<dyn State>`. Implementations
/// are `Send + 'static` so machines can move between threads.
pub trait State: Send + 'static {
    /// Simulation-type discriminant, used by [`State::assign`] mismatch
    /// errors and diagnostics.
    fn kind(&self) -> &'static str;

    /// Shared scalar fields.
    fn core(&self) -> &StateCore;

    /// Mutable access to the shared scalar fields.
    fn core_mut(&mut self) -> &mut StateCore;

    /// Deep copy; the clone never shares mutable storage with the
    /// original.
    fn clone_state(&self) -> Box<dyn State>;

    /// Copy all fields from `other`, which must be of the same kind.
    fn assign(&mut self, other: &dyn State) -> Result<(), StateError>;

    /// Introspect field `idx`; enumerate from 0 until `None`.
    ///
    /// Indices below [`StateCore::ARRAY_COUNT`] are the core scalar
    /// fields; concrete states append their own arrays after those. The
    /// descriptor borrows the state's storage, which must not move
    /// between calls for a live state.
    fn get_array(&self, idx: usize) -> Option<ArrayView<'_>>;

    /// Textual rendering of all fields.
    fn show(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;

    /// Upcast for concrete-kind reads.
    fn as_any(&self) -> &dyn Any;

    /// Upcast for concrete-kind writes inside `advance`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// States constructible from a config, used by registry registration.
pub trait StateBuild: State + Sized {
    /// Build a fresh state, zero-defaulting absent scalar keys.
    fn build(conf: &Config) -> Result<Self, BuildError>;
}

/// Adapter making any `&dyn State` usable with `{}` formatting.
pub struct DisplayState<'a>(pub &'a dyn State);

impl fmt::Display for DisplayState<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.show(f)
    }
}
