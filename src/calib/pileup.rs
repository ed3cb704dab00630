//! Pileup reweighting

use super::{axis::Axis, read_named, StoredHist1d};
use crate::{config::Era, numeric::Float, Result};

use eyre::{ensure, WrapErr};

use std::path::Path;

/// Ratio of the normalized data pileup profile to the simulated one
#[derive(Clone, Debug)]
pub struct PileupTable {
    /// Binning in number of true interactions
    axis: Axis,

    /// Weight of each bin
    weights: Vec<Float>,
}
//
impl PileupTable {
    /// Build the weights from the data and simulation profiles
    ///
    /// The data profile is normalized to unit integral before the division.
    /// Bins where the simulated profile is empty get weight 0.
    pub fn new(data: StoredHist1d, mc: StoredHist1d) -> Result<Self> {
        let (axis, data) = data.into_parts().wrap_err("Bad data pileup profile")?;
        let (mc_axis, mc) = mc.into_parts().wrap_err("Bad simulated pileup profile")?;
        ensure!(
            axis == mc_axis,
            "Data and simulated pileup profiles have different binnings"
        );
        let integral = data.iter().sum::<Float>();
        ensure!(integral > 0., "Data pileup profile is empty");
        let weights = data
            .iter()
            .zip(&mc)
            .map(|(&d, &m)| if m != 0. { (d / integral) / m } else { 0. })
            .collect();
        Ok(Self { axis, weights })
    }

    /// Load the profiles of an era from the calibration directory
    pub fn load(calibration_dir: &Path, era: Era) -> Result<Self> {
        let tag = era.pileup_tag();
        let dir = calibration_dir.join("pileup");
        let data_path = dir.join(format!(
            "PileupHistogram-goldenJSON-13tev-{tag}-69200ub-99bins.json"
        ));
        let mc_path = dir.join(format!("pileup_{tag}_UL_MC_99bins.json"));
        let table = Self::new(
            read_named(&data_path, "pileup")?,
            read_named(&mc_path, "pileup")?,
        )?;
        tracing::info!(
            "Loaded pileup weights from {} and {}",
            data_path.display(),
            mc_path.display()
        );
        Ok(table)
    }

    /// Weight for a number of true interactions, `None` outside the tabulated range
    pub fn weight(&self, true_interactions: Float) -> Option<Float> {
        self.axis
            .find_bin(true_interactions)
            .map(|bin| self.weights[bin])
    }
}
