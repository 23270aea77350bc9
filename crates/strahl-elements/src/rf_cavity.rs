//! The RF cavity element: energy-dependent transfer recomputation.
//!
//! Rebuilding a cavity's transfer operator means numerically integrating
//! the on-axis field table for the transit-time factors, which is far
//! more expensive than applying the operator. The cavity therefore keys
//! its cached operator on the kinetic energy of the incoming real
//! particle and rebuilds only when that energy changes; the recompute
//! also advances the reference particle through the same gap model, and
//! the difference between real and reference phase/energy fills the
//! reserved phase-slip and energy-deviation components of the centroid.

use std::any::Any;
use std::f64::consts::PI;

use strahl_core::{AdvanceError, BuildError, Config, Element, ElementBuild, ElementCore, State};

use crate::moment::{
    misalign_pair, moment_state, MomentMatrix, MomentState, Particle, C0, MEV, PS_DIM, PS_PS,
    PS_PX, PS_PY, PS_S, PS_X, PS_Y,
};
use crate::transfer;

/// Accelerating cavity driven by an on-axis field table.
///
/// Config keys: `L` (length, required), `f` (RF frequency, required),
/// `phi` (synchronous phase in degrees, required), `scl_fac` (field
/// amplitude scale, default 1), `axis_s`/`axis_ez` (field table samples,
/// required), `dx`/`dy` (placement error, default 0).
#[derive(Debug)]
pub struct RfCavityElement {
    core: ElementCore,
    freq: f64,
    phi: f64,
    scl_fac: f64,
    axis_s: Vec<f64>,
    axis_ez: Vec<f64>,
    transfer: MomentMatrix,
    misalign: MomentMatrix,
    misalign_inv: MomentMatrix,
    // Cache keys for the transfer operator. Exact comparison: cache
    // validity is keyed on the bit pattern of the incoming energy.
    last_energy_in: f64,
    last_energy_out: f64,
}

impl ElementBuild for RfCavityElement {
    fn build(conf: &Config) -> Result<Self, BuildError> {
        let length = conf.get_f64("L")?;
        let freq = conf.get_f64("f")?;
        let phi = conf.get_f64("phi")?.to_radians();
        let scl_fac = conf.get_f64_or("scl_fac", 1.0)?;
        let axis_s = conf.get_vector("axis_s")?.to_vec();
        let axis_ez = conf.get_vector("axis_ez")?.to_vec();

        if freq <= 0.0 {
            return Err(BuildError::Other(format!(
                "'f' must be positive, got {freq}"
            )));
        }
        if axis_s.len() != axis_ez.len() {
            return Err(BuildError::Other(format!(
                "field table length mismatch: {} s samples, {} Ez samples",
                axis_s.len(),
                axis_ez.len()
            )));
        }
        if axis_s.len() < 2 {
            return Err(BuildError::Other(
                "field table needs at least two samples".to_string(),
            ));
        }

        let dx = conf.get_f64_or("dx", 0.0)?;
        let dy = conf.get_f64_or("dy", 0.0)?;
        let (misalign, misalign_inv) = misalign_pair(dx, dy);

        let mut core = ElementCore::from_config(conf)?;
        core.length = length;

        Ok(Self {
            core,
            freq,
            phi,
            scl_fac,
            axis_s,
            axis_ez,
            transfer: MomentMatrix::identity(),
            misalign,
            misalign_inv,
            // NaN compares unequal to every energy, so the first advance
            // always recomputes.
            last_energy_in: f64::NAN,
            last_energy_out: f64::NAN,
        })
    }
}

impl RfCavityElement {
    /// Kinetic energy the cached operator was built for.
    pub fn last_energy_in(&self) -> f64 {
        self.last_energy_in
    }

    /// Kinetic energy the gap model produced at that build.
    pub fn last_energy_out(&self) -> f64 {
        self.last_energy_out
    }

    /// Trapezoidal transit-time factors of the field table at wavenumber
    /// `k`: returns `(T, S, V0)` with `V0` the table's voltage integral.
    fn transit_factors(&self, k: f64) -> (f64, f64, f64) {
        let mut v0 = 0.0;
        let mut t = 0.0;
        let mut s = 0.0;
        for i in 1..self.axis_s.len() {
            let ds = self.axis_s[i] - self.axis_s[i - 1];
            let (s0, s1) = (self.axis_s[i - 1], self.axis_s[i]);
            let (e0, e1) = (self.axis_ez[i - 1], self.axis_ez[i]);
            v0 += 0.5 * (e0 + e1) * ds;
            t += 0.5 * (e0 * (k * s0).cos() + e1 * (k * s1).cos()) * ds;
            s += 0.5 * (e0 * (k * s0).sin() + e1 * (k * s1).sin()) * ds;
        }
        if v0 != 0.0 {
            (t / v0, s / v0, v0)
        } else {
            (0.0, 0.0, 0.0)
        }
    }

    /// Advance one particle through the gap model: energy boost from the
    /// transit-time factors at the particle's own velocity, then phase
    /// accumulation across the cavity length.
    fn propagate_long(&self, p: &mut Particle) {
        p.recalc();
        let lambda = C0 / self.freq;
        let k = 2.0 * PI / (p.beta * lambda);
        let (t, s, v0) = self.transit_factors(k);
        let dw = p.ion_z * self.scl_fac * v0 * (t * self.phi.cos() - s * self.phi.sin());
        p.ion_ek += dw;
        p.recalc();
        p.phis += p.sample_ion_k * self.core.length;
    }

    /// Drift–kick–drift operator around a thin RF defocusing kick at the
    /// entry energy.
    fn build_transfer(&self, entry: &Particle, avebeta: f64, avegamma: f64) -> MomentMatrix {
        let lambda = C0 / self.freq;
        let k = 2.0 * PI / (entry.beta * lambda);
        let (t, _, v0) = self.transit_factors(k);
        let denom = entry.ion_es * avebeta * avebeta * avegamma.powi(3) * lambda;
        let kd = if denom != 0.0 {
            PI * entry.ion_z * self.scl_fac * v0 * t * self.phi.sin() / denom
        } else {
            0.0
        };
        let half = transfer::drift::<PS_DIM>(self.core.length / 2.0);
        let mut kick = MomentMatrix::identity();
        kick[(PS_PX, PS_X)] = -kd;
        kick[(PS_PY, PS_Y)] = -kd;
        half * kick * half
    }

    /// Rebuild the cached transfer operator for the incoming energy and
    /// advance both particles through the gap model.
    ///
    /// The real particle's sampling wavenumber is saved and restored: the
    /// gap model's `recalc` must not disturb the wavenumber the rest of
    /// the lattice is phased against.
    fn recompute_matrix(&mut self, st: &mut MomentState) {
        self.last_energy_in = st.real_part.ion_ek;
        let sample_k = st.real_part.sample_ion_k;

        self.propagate_long(&mut st.ref_part);

        let entry = st.real_part;
        self.propagate_long(&mut st.real_part);
        let avebeta = 0.5 * (entry.beta + st.real_part.beta);
        let avegamma = 0.5 * (entry.gamma + st.real_part.gamma);
        self.transfer = self.build_transfer(&entry, avebeta, avegamma);
        self.last_energy_out = st.real_part.ion_ek;

        st.real_part.sample_ion_k = sample_k;
    }
}

impl Element for RfCavityElement {
    fn core(&self) -> &ElementCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ElementCore {
        &mut self.core
    }

    fn type_name(&self) -> &'static str {
        "rfcavity"
    }

    fn advance(&mut self, state: &mut dyn State) -> Result<(), AdvanceError> {
        let st = moment_state(&self.core, state)?;

        if st.core().clng != 0.0 {
            // longitudinal-only run: the reference particle alone rides
            // the gap model
            st.ref_part.recalc();
            if st.ref_part.beta == 0.0 {
                return Err(AdvanceError::Numerical {
                    element: self.core.name().to_string(),
                    reason: "zero-velocity beam entering cavity".to_string(),
                });
            }
            self.propagate_long(&mut st.ref_part);
            st.core_mut().pos += self.core.length;
            st.ref_part.recalc();
            return Ok(());
        }

        st.real_part.recalc();
        st.ref_part.recalc();
        if st.real_part.beta == 0.0 || st.ref_part.beta == 0.0 {
            return Err(AdvanceError::Numerical {
                element: self.core.name().to_string(),
                reason: "zero-velocity beam entering cavity".to_string(),
            });
        }

        if st.real_part.ion_ek != self.last_energy_in {
            self.recompute_matrix(st);
            st.real_part.recalc();
            st.ref_part.recalc();
        }

        st.core_mut().pos += self.core.length;

        st.moment0 = self.misalign * st.moment0;
        st.moment0 = self.transfer * st.moment0;
        st.moment0[PS_S] = st.real_part.phis - st.ref_part.phis;
        st.moment0[PS_PS] = (st.real_part.ion_ek - st.ref_part.ion_ek) / MEV;
        st.moment0 = self.misalign_inv * st.moment0;

        st.state = self.misalign * st.state * self.misalign.transpose();
        st.state = self.transfer * st.state * self.transfer.transpose();
        st.state = self.misalign_inv * st.state * self.misalign_inv.transpose();

        st.sync_core();
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
