//! This module implements some domain-specific 4-momentum handling logic.
//!
//! Reconstructed and generated particles are stored as (px, py, pz, E) vectors,
//! built from the (pt, eta, phi, mass) coordinates found in event records.

use crate::numeric::{functions::wrap_phi, Float};
use nalgebra::SVector;
use num_traits::Zero;
use prefix_num_ops::real::*;

/// 4-momentum dimension
pub const MOMENTUM_DIM: usize = 4;

/// Relativistic 4-momentum
pub type Momentum = SVector<Float, MOMENTUM_DIM>;

/// Convenience const for accessing the X coordinate of a 4-vector
pub const X: usize = 0;

/// Convenience const for accessing the Y coordinate of a 4-vector
pub const Y: usize = 1;

/// Convenience const for accessing the Z coordinate of a 4-vector
pub const Z: usize = 2;

/// Convenience const for accessing the E coordinate of a 4-vector
pub const E: usize = 3;

/// Pseudorapidity reported for vectors along the beam axis
const BEAM_AXIS_ETA: Float = 1e10;

/// Build a 4-momentum from collider coordinates
pub fn from_pt_eta_phi_m(pt: Float, eta: Float, phi: Float, mass: Float) -> Momentum {
    let pt = abs(pt);
    let px = pt * cos(phi);
    let py = pt * sin(phi);
    let pz = pt * eta.sinh();
    let p2 = px * px + py * py + pz * pz;
    let e = if mass >= 0. {
        sqrt(p2 + mass * mass)
    } else {
        // Negative masses are tachyonic in the record conventions
        sqrt((p2 - mass * mass).max(0.))
    };
    Momentum::new(px, py, pz, e)
}

/// The zero 4-momentum, used before any particle has been recorded
pub fn zero() -> Momentum {
    Momentum::zero()
}

/// Collider kinematics of a 4-momentum
pub trait Kinematics {
    /// Transverse momentum
    fn pt(&self) -> Float;

    /// Pseudorapidity
    fn eta(&self) -> Float;

    /// Azimuthal angle in [-π, π]
    fn phi(&self) -> Float;

    /// Squared invariant mass
    fn m2(&self) -> Float;

    /// Invariant mass, negative for space-like vectors
    fn m(&self) -> Float {
        let m2 = self.m2();
        if m2 < 0. {
            -sqrt(-m2)
        } else {
            sqrt(m2)
        }
    }

    /// Angular distance in the (eta, phi) plane
    fn delta_r(&self, other: &Self) -> Float {
        let d_eta = self.eta() - other.eta();
        let d_phi = delta_phi(self.phi(), other.phi());
        sqrt(d_eta * d_eta + d_phi * d_phi)
    }
}
//
impl Kinematics for Momentum {
    fn pt(&self) -> Float {
        sqrt(self[X] * self[X] + self[Y] * self[Y])
    }

    fn eta(&self) -> Float {
        let pt = self.pt();
        if pt > 0. {
            (self[Z] / pt).asinh()
        } else if self[Z] > 0. {
            BEAM_AXIS_ETA
        } else if self[Z] < 0. {
            -BEAM_AXIS_ETA
        } else {
            0.
        }
    }

    fn phi(&self) -> Float {
        if self[X] == 0. && self[Y] == 0. {
            0.
        } else {
            self[Y].atan2(self[X])
        }
    }

    fn m2(&self) -> Float {
        self[E] * self[E] - self[X] * self[X] - self[Y] * self[Y] - self[Z] * self[Z]
    }
}

/// Azimuthal difference `phi1 - phi2`, wrapped into (-π, π]
pub fn delta_phi(phi1: Float, phi2: Float) -> Float {
    wrap_phi(phi1 - phi2)
}

/// Transverse mass of a lepton and missing transverse energy
///
/// The product under the square root is clamped at zero, so the result is
/// never NaN even for unphysical negative inputs.
///
pub fn transverse_mass(lepton_pt: Float, met: Float, d_phi: Float) -> Float {
    sqrt((2. * lepton_pt * met * (1. - cos(d_phi))).max(0.))
}
