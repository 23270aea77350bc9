//! The `"vector"` simulation type: single-particle linear optics.
//!
//! The state is one 6-component phase-space vector
//! `(x, x', y, y', phi, delta)`; every element is a linear map applied to
//! it. This is the smallest complete simulation type and the reference
//! for how a catalogue is wired up.

use nalgebra::{SMatrix, SVector};
use std::any::Any;
use std::fmt;

use strahl_core::{
    AdvanceError, ArrayView, BuildError, Config, Element, ElementBuild, ElementCore, State,
    StateBuild, StateCore, StateError,
};
use strahl_engine::{register_element, register_state, RegistryError};

use crate::transfer;

/// Phase-space dimension of the vector simulation.
pub const VEC_DIM: usize = 6;

/// Simulation-type name this module registers under.
pub const SIM_TYPE: &str = "vector";

// ── State ──────────────────────────────────────────────────────────

/// Single-particle state: the shared scalar core plus one phase-space
/// vector.
pub struct VectorState {
    core: StateCore,
    /// The phase-space vector `(x, x', y, y', phi, delta)`.
    pub state: SVector<f64, VEC_DIM>,
}

impl StateBuild for VectorState {
    fn build(conf: &Config) -> Result<Self, BuildError> {
        let state = match conf.get_vector_opt("initial")? {
            None => SVector::zeros(),
            Some(data) if data.len() == VEC_DIM => SVector::from_column_slice(data),
            Some(data) => {
                return Err(BuildError::Other(format!(
                    "'initial' must have {VEC_DIM} components, got {}",
                    data.len()
                )))
            }
        };
        Ok(Self {
            core: StateCore::from_config(conf)?,
            state,
        })
    }
}

impl State for VectorState {
    fn kind(&self) -> &'static str {
        SIM_TYPE
    }

    fn core(&self) -> &StateCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StateCore {
        &mut self.core
    }

    fn clone_state(&self) -> Box<dyn State> {
        Box::new(Self {
            core: self.core.clone(),
            state: self.state,
        })
    }

    fn assign(&mut self, other: &dyn State) -> Result<(), StateError> {
        let found = other.kind();
        let other = other
            .as_any()
            .downcast_ref::<Self>()
            .ok_or(StateError::KindMismatch {
                expected: SIM_TYPE,
                found,
            })?;
        self.core = other.core.clone();
        self.state = other.state;
        Ok(())
    }

    fn get_array(&self, idx: usize) -> Option<ArrayView<'_>> {
        if idx < StateCore::ARRAY_COUNT {
            return self.core.get_array(idx);
        }
        match idx - StateCore::ARRAY_COUNT {
            0 => Some(ArrayView::f64_vector("state", self.state.as_slice())),
            _ => None,
        }
    }

    fn show(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.core.show(f)?;
        write!(f, " state={:?}", self.state.as_slice())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn vector_state<'a>(
    core: &ElementCore,
    state: &'a mut dyn State,
) -> Result<&'a mut VectorState, AdvanceError> {
    let state_kind = state.kind();
    state
        .as_any_mut()
        .downcast_mut::<VectorState>()
        .ok_or_else(|| AdvanceError::Unsupported {
            element: core.name().to_string(),
            state_kind,
        })
}

// ── Elements ───────────────────────────────────────────────────────

/// Reinitialises the phase-space vector from its own `initial`
/// parameter; the conventional first element of a lattice.
pub struct SourceElement {
    core: ElementCore,
    initial: SVector<f64, VEC_DIM>,
}

impl ElementBuild for SourceElement {
    fn build(conf: &Config) -> Result<Self, BuildError> {
        let initial = match conf.get_vector_opt("initial")? {
            None => SVector::zeros(),
            Some(data) if data.len() == VEC_DIM => SVector::from_column_slice(data),
            Some(data) => {
                return Err(BuildError::Other(format!(
                    "'initial' must have {VEC_DIM} components, got {}",
                    data.len()
                )))
            }
        };
        Ok(Self {
            core: ElementCore::from_config(conf)?,
            initial,
        })
    }
}

impl Element for SourceElement {
    fn core(&self) -> &ElementCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut ElementCore {
        &mut self.core
    }
    fn type_name(&self) -> &'static str {
        "source"
    }
    fn advance(&mut self, state: &mut dyn State) -> Result<(), AdvanceError> {
        let st = vector_state(&self.core, state)?;
        st.state = self.initial;
        st.core_mut().pos += self.core.length;
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Identity transform; useful as a named observation point.
pub struct MarkerElement {
    core: ElementCore,
}

impl ElementBuild for MarkerElement {
    fn build(conf: &Config) -> Result<Self, BuildError> {
        Ok(Self {
            core: ElementCore::from_config(conf)?,
        })
    }
}

impl Element for MarkerElement {
    fn core(&self) -> &ElementCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut ElementCore {
        &mut self.core
    }
    fn type_name(&self) -> &'static str {
        "marker"
    }
    fn advance(&mut self, state: &mut dyn State) -> Result<(), AdvanceError> {
        let st = vector_state(&self.core, state)?;
        st.core_mut().pos += self.core.length;
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Field-free drift; requires `L`.
#[derive(Debug)]
pub struct DriftElement {
    core: ElementCore,
    transfer: SMatrix<f64, VEC_DIM, VEC_DIM>,
}

impl ElementBuild for DriftElement {
    fn build(conf: &Config) -> Result<Self, BuildError> {
        let length = conf.get_f64("L")?;
        Ok(Self {
            core: ElementCore::from_config(conf)?,
            transfer: transfer::drift(length),
        })
    }
}

impl Element for DriftElement {
    fn core(&self) -> &ElementCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut ElementCore {
        &mut self.core
    }
    fn type_name(&self) -> &'static str {
        "drift"
    }
    fn advance(&mut self, state: &mut dyn State) -> Result<(), AdvanceError> {
        let st = vector_state(&self.core, state)?;
        st.state = self.transfer * st.state;
        st.core_mut().pos += self.core.length;
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Thick-lens quadrupole; requires `L` and the strength `K`.
pub struct QuadElement {
    core: ElementCore,
    transfer: SMatrix<f64, VEC_DIM, VEC_DIM>,
}

impl ElementBuild for QuadElement {
    fn build(conf: &Config) -> Result<Self, BuildError> {
        let length = conf.get_f64("L")?;
        let strength = conf.get_f64("K")?;
        Ok(Self {
            core: ElementCore::from_config(conf)?,
            transfer: transfer::quadrupole(length, strength),
        })
    }
}

impl Element for QuadElement {
    fn core(&self) -> &ElementCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut ElementCore {
        &mut self.core
    }
    fn type_name(&self) -> &'static str {
        "quadrupole"
    }
    fn advance(&mut self, state: &mut dyn State) -> Result<(), AdvanceError> {
        let st = vector_state(&self.core, state)?;
        st.state = self.transfer * st.state;
        st.core_mut().pos += self.core.length;
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Arbitrary user-supplied linear map; requires a row-major 36-entry
/// `transfer` vector.
pub struct GenericElement {
    core: ElementCore,
    transfer: SMatrix<f64, VEC_DIM, VEC_DIM>,
}

impl ElementBuild for GenericElement {
    fn build(conf: &Config) -> Result<Self, BuildError> {
        let data = conf.get_vector("transfer")?;
        let transfer = transfer::from_row_major(data).ok_or_else(|| {
            BuildError::Other(format!(
                "'transfer' must have {} entries, got {}",
                VEC_DIM * VEC_DIM,
                data.len()
            ))
        })?;
        Ok(Self {
            core: ElementCore::from_config(conf)?,
            transfer,
        })
    }
}

impl Element for GenericElement {
    fn core(&self) -> &ElementCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut ElementCore {
        &mut self.core
    }
    fn type_name(&self) -> &'static str {
        "generic"
    }
    fn advance(&mut self, state: &mut dyn State) -> Result<(), AdvanceError> {
        let st = vector_state(&self.core, state)?;
        st.state = self.transfer * st.state;
        st.core_mut().pos += self.core.length;
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ── Registration ───────────────────────────────────────────────────

/// Register the `"vector"` simulation type and its element catalogue.
pub fn register_vector() -> Result<(), RegistryError> {
    register_state::<VectorState>(SIM_TYPE)?;
    register_element::<SourceElement>(SIM_TYPE, "source")?;
    register_element::<MarkerElement>(SIM_TYPE, "marker")?;
    register_element::<DriftElement>(SIM_TYPE, "drift")?;
    register_element::<QuadElement>(SIM_TYPE, "quadrupole")?;
    register_element::<GenericElement>(SIM_TYPE, "generic")?;
    Ok(())
}
