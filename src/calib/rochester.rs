//! Muon momentum scale and resolution correction
//!
//! The correction is queried through the `MomentumScaleCorrection` trait, in
//! one of three modes:
//!
//! - `k_scale_dt` for collision data,
//! - `k_spread_mc` for simulated muons matched to a generator muon,
//! - `k_smear_mc` for simulated muons without generator match, which needs a
//!   uniform random number.
//!
//! Every mode also takes a systematic variation, identified by a (set, member)
//! pair. The analysis always uses `FIXED_VARIATION`.
//!
//! `RochesterTables` is a parametrized implementation of this contract. Scale
//! parameters are tabulated on an (|eta|, phi) grid, resolution parameters on
//! the |eta| binning alone.

use super::{axis::Axis, read_json};
use crate::{
    config::Era,
    numeric::{reals::consts::PI, Float},
    Result,
};

use eyre::{ensure, WrapErr};
use prefix_num_ops::real::*;
use serde::Deserialize;
use statrs::distribution::{ContinuousCDF, Normal};

use std::path::Path;

/// Systematic variation used for every query, as (set, member)
pub const FIXED_VARIATION: (u32, u32) = (5, 0);

/// Query interface of the momentum scale correction
///
/// Each mode returns a multiplicative factor to be applied to the muon
/// four-momentum.
pub trait MomentumScaleCorrection: Send + Sync {
    /// Scale factor for a muon from collision data
    fn k_scale_dt(
        &self,
        charge: i32,
        pt: Float,
        eta: Float,
        phi: Float,
        set: u32,
        member: u32,
    ) -> Float;

    /// Scale factor for a simulated muon matched to a generator muon of pT `gen_pt`
    #[allow(clippy::too_many_arguments)]
    fn k_spread_mc(
        &self,
        charge: i32,
        pt: Float,
        eta: Float,
        phi: Float,
        gen_pt: Float,
        set: u32,
        member: u32,
    ) -> Float;

    /// Scale factor for an unmatched simulated muon
    ///
    /// `u` is a uniform random number in [0, 1).
    #[allow(clippy::too_many_arguments)]
    fn k_smear_mc(
        &self,
        charge: i32,
        pt: Float,
        eta: Float,
        phi: Float,
        n_layers: i32,
        u: Float,
        set: u32,
        member: u32,
    ) -> Float;
}

// ### FILE FORMAT ###

#[derive(Clone, Debug, Deserialize)]
struct StoredTables {
    abs_eta_edges: Vec<Float>,
    n_phi: usize,
    n_layers_ref: Float,
    variations: Vec<Variation>,
}

/// One systematic variation
#[derive(Clone, Debug, Deserialize)]
struct Variation {
    set: u32,
    member: u32,
    data: ScaleGrid,
    mc: ScaleGrid,
    resolution: Vec<Resolution>,
}

/// Scale parameters, each indexed as [eta bin][phi bin]
#[derive(Clone, Debug, Deserialize)]
struct ScaleGrid {
    m: Vec<Vec<Float>>,
    a: Vec<Vec<Float>>,
}

/// Resolution parameters of one |eta| bin
#[derive(Clone, Copy, Debug, Deserialize)]
struct Resolution {
    /// Ratio of data to simulated resolution
    rho: Float,

    /// Relative resolution at the reference number of tracker layers
    sigma: Float,

    /// Relative change of resolution per missing tracker layer
    slope: Float,
}

// ### TABLES ###

/// Tabulated momentum scale correction
#[derive(Clone, Debug)]
pub struct RochesterTables {
    abs_eta: Axis,
    n_phi: usize,
    n_layers_ref: Float,
    variations: Vec<Variation>,
    normal: Normal,
}
//
impl RochesterTables {
    /// Load the tables of an era
    pub fn load(calibration_dir: &Path, era: Era) -> Result<Self> {
        let path = calibration_dir
            .join("rochester")
            .join(format!("RoccoR{}.json", era.rochester_tag()));
        let tables = Self::from_json(read_json(&path)?)
            .wrap_err_with(|| format!("Bad momentum scale tables in {}", path.display()))?;
        tracing::info!(
            "Loaded {} momentum scale variation(s) from {}",
            tables.variations.len(),
            path.display()
        );
        Ok(tables)
    }

    fn from_json(stored: StoredTables) -> Result<Self> {
        let abs_eta = Axis::new(stored.abs_eta_edges)?;
        ensure!(stored.n_phi > 0, "Need at least one phi bin");
        let (n_eta, n_phi) = (abs_eta.num_bins(), stored.n_phi);
        let grid_ok = |grid: &[Vec<Float>]| {
            grid.len() == n_eta && grid.iter().all(|row| row.len() == n_phi)
        };

        for v in &stored.variations {
            ensure!(
                grid_ok(&v.data.m) && grid_ok(&v.data.a) && grid_ok(&v.mc.m) && grid_ok(&v.mc.a),
                "Scale grids of variation ({}, {}) are not {n_eta}x{n_phi}",
                v.set,
                v.member
            );
            ensure!(
                v.resolution.len() == n_eta,
                "Variation ({}, {}) needs {n_eta} resolution entries",
                v.set,
                v.member
            );
        }
        let (set, member) = FIXED_VARIATION;
        ensure!(
            stored.variations.iter().any(|v| v.set == set && v.member == member),
            "Variation ({set}, {member}) is missing"
        );

        Ok(Self {
            abs_eta,
            n_phi,
            n_layers_ref: stored.n_layers_ref,
            variations: stored.variations,
            normal: Normal::new(0., 1.).wrap_err("Failed to set up the normal distribution")?,
        })
    }

    /// Find a variation, complaining if it is unknown
    fn variation(&self, set: u32, member: u32) -> Option<&Variation> {
        let found = self
            .variations
            .iter()
            .find(|v| v.set == set && v.member == member);
        if found.is_none() {
            tracing::error!("Unknown momentum scale variation ({set}, {member}), using factor 1");
        }
        found
    }

    /// Grid cell of a muon direction
    ///
    /// Muons beyond the tabulated |eta| range use the outermost bin.
    fn cell(&self, eta: Float, phi: Float) -> (usize, usize) {
        let eta_bin = self.abs_eta.clamped_bin(abs(eta));
        let phi_width = 2. * PI / self.n_phi as Float;
        let phi_bin = ((phi + PI) / phi_width).floor().max(0.) as usize;
        (eta_bin, phi_bin.min(self.n_phi - 1))
    }

    /// Scale factor from a grid, `1 / (M + Q·A·pT)`
    fn scale(grid: &ScaleGrid, (eta_bin, phi_bin): (usize, usize), charge: i32, pt: Float) -> Float {
        let m = grid.m[eta_bin][phi_bin];
        let a = grid.a[eta_bin][phi_bin];
        let denominator = m + Float::from(charge) * a * pt;
        if denominator > 0. {
            1. / denominator
        } else {
            tracing::warn!("Degenerate momentum scale at pT {pt}, using factor 1");
            1.
        }
    }
}
//
impl MomentumScaleCorrection for RochesterTables {
    fn k_scale_dt(
        &self,
        charge: i32,
        pt: Float,
        eta: Float,
        phi: Float,
        set: u32,
        member: u32,
    ) -> Float {
        match self.variation(set, member) {
            Some(v) => Self::scale(&v.data, self.cell(eta, phi), charge, pt),
            None => 1.,
        }
    }

    fn k_spread_mc(
        &self,
        charge: i32,
        pt: Float,
        eta: Float,
        phi: Float,
        gen_pt: Float,
        set: u32,
        member: u32,
    ) -> Float {
        let Some(v) = self.variation(set, member) else {
            return 1.;
        };
        let cell = self.cell(eta, phi);
        let k = Self::scale(&v.mc, cell, charge, pt);
        let corrected_pt = k * pt;
        if corrected_pt <= 0. {
            return k;
        }
        let rho = v.resolution[cell.0].rho;
        k * (gen_pt + rho * (corrected_pt - gen_pt)) / corrected_pt
    }

    fn k_smear_mc(
        &self,
        charge: i32,
        pt: Float,
        eta: Float,
        phi: Float,
        n_layers: i32,
        u: Float,
        set: u32,
        member: u32,
    ) -> Float {
        let Some(v) = self.variation(set, member) else {
            return 1.;
        };
        let cell = self.cell(eta, phi);
        let k = Self::scale(&v.mc, cell, charge, pt);
        let res = v.resolution[cell.0];
        let sigma =
            (res.sigma * (1. + res.slope * (self.n_layers_ref - Float::from(n_layers)))).max(0.);
        let extra = sqrt((res.rho * res.rho - 1.).max(0.));
        // The quantile diverges at 0 and 1
        let u = u.clamp(Float::EPSILON, 1. - Float::EPSILON);
        k * (1. + sigma * extra * self.normal.inverse_cdf(u))
    }
}
