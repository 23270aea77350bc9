//! The `"moment"` simulation type: bunch-envelope tracking.
//!
//! The state carries the bunch centroid (first moment) and covariance
//! (second moment) in a 7-dimensional phase space whose last component
//! is the homogeneous coordinate, plus two [`Particle`] records: the
//! nominal *reference* particle riding the design trajectory and the
//! *real* particle describing the actual bunch. Cavity-like elements use
//! the reference particle to populate the reserved phase-slip and
//! energy-deviation components ([`PS_S`], [`PS_PS`]).

use nalgebra::{SMatrix, SVector};
use std::any::Any;
use std::fmt;

use strahl_core::{
    AdvanceError, ArrayView, BuildError, Config, Element, ElementBuild, ElementCore, State,
    StateBuild, StateCore, StateError,
};
use strahl_engine::{register_element, register_state, RegistryError};

use crate::rf_cavity::RfCavityElement;
use crate::transfer;

/// Phase-space dimension, including the homogeneous coordinate.
pub const PS_DIM: usize = 7;

/// Horizontal position index.
pub const PS_X: usize = 0;
/// Horizontal angle index.
pub const PS_PX: usize = 1;
/// Vertical position index.
pub const PS_Y: usize = 2;
/// Vertical angle index.
pub const PS_PY: usize = 3;
/// Phase-slip index (relative to the reference particle).
pub const PS_S: usize = 4;
/// Energy-deviation index (relative to the reference particle).
pub const PS_PS: usize = 5;

/// Simulation-type name this module registers under.
pub const SIM_TYPE: &str = "moment";

/// Speed of light [m/s].
pub const C0: f64 = 2.997_924_58e8;

/// eV per MeV; energy deviations are reported in MeV.
pub const MEV: f64 = 1.0e6;

/// Sampling frequency for phase bookkeeping [Hz].
pub const SAMPLE_FREQ: f64 = 80.5e6;

/// Sampling wavelength [m].
pub const SAMPLE_LAMBDA: f64 = C0 / SAMPLE_FREQ;

/// Centroid/covariance operator type for the moment simulation.
pub type MomentMatrix = SMatrix<f64, PS_DIM, PS_DIM>;

/// Centroid vector type for the moment simulation.
pub type MomentVector = SVector<f64, PS_DIM>;

// ── Particle ───────────────────────────────────────────────────────

/// One particle's longitudinal bookkeeping: energies, relativistic
/// factors, sampling wavenumber, and accumulated phase.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Particle {
    /// Ionic charge state.
    pub ion_z: f64,
    /// Rest energy [eV].
    pub ion_es: f64,
    /// Kinetic energy [eV].
    pub ion_ek: f64,
    /// Total energy [eV]; maintained as `ion_es + ion_ek` by `recalc`.
    pub ion_w: f64,
    /// Lorentz factor.
    pub gamma: f64,
    /// Velocity over c.
    pub beta: f64,
    /// `beta * gamma`.
    pub bg: f64,
    /// Sampling wavenumber `2*pi / (beta * SAMPLE_LAMBDA)`.
    pub sample_ion_k: f64,
    /// Accumulated phase at the sampling frequency [rad].
    pub phis: f64,
}

impl Particle {
    /// Create a particle and derive its relativistic quantities.
    pub fn new(ion_z: f64, ion_es: f64, ion_ek: f64) -> Self {
        let mut p = Self {
            ion_z,
            ion_es,
            ion_ek,
            ..Self::default()
        };
        p.recalc();
        p
    }

    /// Refresh the derived quantities from `ion_es` and `ion_ek`.
    pub fn recalc(&mut self) {
        self.ion_w = self.ion_es + self.ion_ek;
        self.gamma = if self.ion_es != 0.0 {
            self.ion_w / self.ion_es
        } else {
            1.0
        };
        self.beta = (1.0 - 1.0 / (self.gamma * self.gamma)).max(0.0).sqrt();
        self.bg = self.beta * self.gamma;
        self.sample_ion_k = if self.beta != 0.0 {
            2.0 * std::f64::consts::PI / (self.beta * SAMPLE_LAMBDA)
        } else {
            0.0
        };
    }
}

// ── State ──────────────────────────────────────────────────────────

/// Envelope state: scalar core, reference and real particles, centroid,
/// and covariance.
pub struct MomentState {
    core: StateCore,
    /// The nominal design-trajectory particle.
    pub ref_part: Particle,
    /// The actual bunch particle.
    pub real_part: Particle,
    /// First moment (centroid); component [`PS_DIM`]` - 1` is the
    /// homogeneous coordinate and stays 1.
    pub moment0: MomentVector,
    /// Second moment (covariance).
    pub state: MomentMatrix,
}

impl MomentState {
    /// Copy the real particle's scalars into the shared core fields so
    /// introspection through [`StateCore`] stays consistent.
    pub fn sync_core(&mut self) {
        self.core.ion_z = self.real_part.ion_z;
        self.core.ion_es = self.real_part.ion_es;
        self.core.ion_ek = self.real_part.ion_ek;
        self.core.ion_w = self.real_part.ion_w;
    }
}

fn centroid_from(conf: &Config) -> Result<MomentVector, BuildError> {
    match conf.get_vector_opt("moment0")? {
        None => {
            let mut v = MomentVector::zeros();
            v[PS_DIM - 1] = 1.0;
            Ok(v)
        }
        Some(data) if data.len() == PS_DIM => Ok(MomentVector::from_column_slice(data)),
        Some(data) => Err(BuildError::Other(format!(
            "'moment0' must have {PS_DIM} components, got {}",
            data.len()
        ))),
    }
}

fn covariance_from(conf: &Config) -> Result<MomentMatrix, BuildError> {
    match conf.get_vector_opt("initial")? {
        None => Ok(MomentMatrix::zeros()),
        Some(data) => transfer::from_row_major(data).ok_or_else(|| {
            BuildError::Other(format!(
                "'initial' must have {} entries, got {}",
                PS_DIM * PS_DIM,
                data.len()
            ))
        }),
    }
}

impl StateBuild for MomentState {
    fn build(conf: &Config) -> Result<Self, BuildError> {
        let core = StateCore::from_config(conf)?;
        let particle = Particle::new(core.ion_z, core.ion_es, core.ion_ek);
        let mut st = Self {
            core,
            ref_part: particle,
            real_part: particle,
            moment0: centroid_from(conf)?,
            state: covariance_from(conf)?,
        };
        st.sync_core();
        Ok(st)
    }
}

impl State for MomentState {
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
            ref_part: self.ref_part,
            real_part: self.real_part,
            moment0: self.moment0,
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
        self.ref_part = other.ref_part;
        self.real_part = other.real_part;
        self.moment0 = other.moment0;
        self.state = other.state;
        Ok(())
    }

    fn get_array(&self, idx: usize) -> Option<ArrayView<'_>> {
        if idx < StateCore::ARRAY_COUNT {
            return self.core.get_array(idx);
        }
        match idx - StateCore::ARRAY_COUNT {
            0 => Some(ArrayView::f64_vector("moment0", self.moment0.as_slice())),
            1 => Some(ArrayView::f64_matrix(
                "state",
                self.state.as_slice(),
                PS_DIM,
                PS_DIM,
            )),
            2 => Some(ArrayView::f64_scalar("ref_IonEk", &self.ref_part.ion_ek)),
            3 => Some(ArrayView::f64_scalar("ref_phis", &self.ref_part.phis)),
            4 => Some(ArrayView::f64_scalar("real_phis", &self.real_part.phis)),
            _ => None,
        }
    }

    fn show(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.core.show(f)?;
        write!(
            f,
            " ref_IonEk={} ref_phis={} moment0={:?}",
            self.ref_part.ion_ek,
            self.ref_part.phis,
            self.moment0.as_slice()
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub(crate) fn moment_state<'a>(
    core: &ElementCore,
    state: &'a mut dyn State,
) -> Result<&'a mut MomentState, AdvanceError> {
    let state_kind = state.kind();
    state
        .as_any_mut()
        .downcast_mut::<MomentState>()
        .ok_or_else(|| AdvanceError::Unsupported {
            element: core.name().to_string(),
            state_kind,
        })
}

// ── Misalignment ───────────────────────────────────────────────────

/// Build the misalignment operator and its inverse from the `dx`/`dy`
/// placement errors: a translation into the element frame (through the
/// homogeneous coordinate) and the translation back out.
pub(crate) fn misalign_pair(dx: f64, dy: f64) -> (MomentMatrix, MomentMatrix) {
    let mut into = MomentMatrix::identity();
    into[(PS_X, PS_DIM - 1)] = -dx;
    into[(PS_Y, PS_DIM - 1)] = -dy;
    let mut out_of = MomentMatrix::identity();
    out_of[(PS_X, PS_DIM - 1)] = dx;
    out_of[(PS_Y, PS_DIM - 1)] = dy;
    (into, out_of)
}

// ── Shared transform application ───────────────────────────────────

/// Common machinery for moment-sim elements with a fixed linear map:
/// identity, config snapshot, misalignment, and the congruence
/// application to centroid and covariance.
pub struct MomentTransport {
    pub(crate) core: ElementCore,
    pub(crate) transfer: MomentMatrix,
    pub(crate) misalign: MomentMatrix,
    pub(crate) misalign_inv: MomentMatrix,
}

impl MomentTransport {
    pub(crate) fn from_config(conf: &Config) -> Result<Self, BuildError> {
        let dx = conf.get_f64_or("dx", 0.0)?;
        let dy = conf.get_f64_or("dy", 0.0)?;
        let (misalign, misalign_inv) = misalign_pair(dx, dy);
        Ok(Self {
            core: ElementCore::from_config(conf)?,
            transfer: MomentMatrix::identity(),
            misalign,
            misalign_inv,
        })
    }

    /// Apply the composed operator to centroid and covariance and
    /// advance `pos` by the element length.
    pub(crate) fn apply(&self, st: &mut MomentState) {
        let m = self.misalign_inv * self.transfer * self.misalign;
        st.moment0 = m * st.moment0;
        st.state = m * st.state * m.transpose();
        st.core_mut().pos += self.core.length;
    }
}

// ── Elements ───────────────────────────────────────────────────────

/// Reinitialises the whole envelope state (particles, centroid,
/// covariance) from its own config.
pub struct SourceElement {
    core: ElementCore,
    ref_part: Particle,
    moment0: MomentVector,
    state: MomentMatrix,
}

impl ElementBuild for SourceElement {
    fn build(conf: &Config) -> Result<Self, BuildError> {
        let ion_z = conf.get_f64_or("IonZ", 0.0)?;
        let ion_es = conf.get_f64_or("IonEs", 0.0)?;
        let ion_ek = conf.get_f64_or("IonEk", 0.0)?;
        Ok(Self {
            core: ElementCore::from_config(conf)?,
            ref_part: Particle::new(ion_z, ion_es, ion_ek),
            moment0: centroid_from(conf)?,
            state: covariance_from(conf)?,
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
        let st = moment_state(&self.core, state)?;
        st.ref_part = self.ref_part;
        st.real_part = self.ref_part;
        st.moment0 = self.moment0;
        st.state = self.state;
        st.sync_core();
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

/// Identity transform; a named observation point.
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
        let st = moment_state(&self.core, state)?;
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
pub struct DriftElement {
    transport: MomentTransport,
}

impl ElementBuild for DriftElement {
    fn build(conf: &Config) -> Result<Self, BuildError> {
        let length = conf.get_f64("L")?;
        let mut transport = MomentTransport::from_config(conf)?;
        transport.transfer = transfer::drift(length);
        Ok(Self { transport })
    }
}

impl Element for DriftElement {
    fn core(&self) -> &ElementCore {
        &self.transport.core
    }
    fn core_mut(&mut self) -> &mut ElementCore {
        &mut self.transport.core
    }
    fn type_name(&self) -> &'static str {
        "drift"
    }
    fn advance(&mut self, state: &mut dyn State) -> Result<(), AdvanceError> {
        let st = moment_state(&self.transport.core, state)?;
        self.transport.apply(st);
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
    transport: MomentTransport,
}

impl ElementBuild for QuadElement {
    fn build(conf: &Config) -> Result<Self, BuildError> {
        let length = conf.get_f64("L")?;
        let strength = conf.get_f64("K")?;
        let mut transport = MomentTransport::from_config(conf)?;
        transport.transfer = transfer::quadrupole(length, strength);
        Ok(Self { transport })
    }
}

impl Element for QuadElement {
    fn core(&self) -> &ElementCore {
        &self.transport.core
    }
    fn core_mut(&mut self) -> &mut ElementCore {
        &mut self.transport.core
    }
    fn type_name(&self) -> &'static str {
        "quadrupole"
    }
    fn advance(&mut self, state: &mut dyn State) -> Result<(), AdvanceError> {
        let st = moment_state(&self.transport.core, state)?;
        self.transport.apply(st);
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Arbitrary user-supplied linear map; requires a row-major 49-entry
/// `transfer` vector.
pub struct GenericElement {
    transport: MomentTransport,
}

impl ElementBuild for GenericElement {
    fn build(conf: &Config) -> Result<Self, BuildError> {
        let data = conf.get_vector("transfer")?;
        let mut transport = MomentTransport::from_config(conf)?;
        transport.transfer = transfer::from_row_major(data).ok_or_else(|| {
            BuildError::Other(format!(
                "'transfer' must have {} entries, got {}",
                PS_DIM * PS_DIM,
                data.len()
            ))
        })?;
        Ok(Self { transport })
    }
}

impl Element for GenericElement {
    fn core(&self) -> &ElementCore {
        &self.transport.core
    }
    fn core_mut(&mut self) -> &mut ElementCore {
        &mut self.transport.core
    }
    fn type_name(&self) -> &'static str {
        "generic"
    }
    fn advance(&mut self, state: &mut dyn State) -> Result<(), AdvanceError> {
        let st = moment_state(&self.transport.core, state)?;
        self.transport.apply(st);
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

/// Register the `"moment"` simulation type and its element catalogue,
/// including the RF cavity.
pub fn register_moment() -> Result<(), RegistryError> {
    register_state::<MomentState>(SIM_TYPE)?;
    register_element::<SourceElement>(SIM_TYPE, "source")?;
    register_element::<MarkerElement>(SIM_TYPE, "marker")?;
    register_element::<DriftElement>(SIM_TYPE, "drift")?;
    register_element::<QuadElement>(SIM_TYPE, "quadrupole")?;
    register_element::<GenericElement>(SIM_TYPE, "generic")?;
    register_element::<RfCavityElement>(SIM_TYPE, "rfcavity")?;
    Ok(())
}
