//! Calibration tables
//!
//! All calibration resources are JSON files below a common root directory.
//! They are loaded once before the event loop starts and only read afterwards,
//! so a single `Calibration` is shared by reference between all shards.

pub mod axis;
pub mod efficiency;
pub mod pileup;
pub mod rochester;

use crate::{config::Configuration, numeric::Float, Result};

use self::{
    axis::Axis,
    efficiency::EfficiencyTables,
    pileup::PileupTable,
    rochester::{MomentumScaleCorrection, RochesterTables},
};

use eyre::{ensure, eyre, WrapErr};
use serde::{de::DeserializeOwned, Deserialize};

use std::{collections::HashMap, fs::File, io::BufReader, path::Path};

/// One-dimensional histogram as stored in calibration files
///
/// `contents` holds one value per regular bin, without under/overflow.
#[derive(Clone, Debug, Deserialize)]
pub struct StoredHist1d {
    pub edges: Vec<Float>,
    pub contents: Vec<Float>,
}
//
impl StoredHist1d {
    /// Validate the stored shape and extract the binning
    pub fn into_parts(self) -> Result<(Axis, Vec<Float>)> {
        let axis = Axis::new(self.edges)?;
        ensure!(
            self.contents.len() == axis.num_bins(),
            "Histogram has {} bins but {} values",
            axis.num_bins(),
            self.contents.len()
        );
        Ok((axis, self.contents))
    }
}

/// Two-dimensional histogram as stored in calibration files
///
/// `contents[x][y]` holds the value of bin (x, y), without under/overflow.
#[derive(Clone, Debug, Deserialize)]
pub struct StoredHist2d {
    pub x_edges: Vec<Float>,
    pub y_edges: Vec<Float>,
    pub contents: Vec<Vec<Float>>,
}

/// Decode a JSON calibration file
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path)
        .wrap_err_with(|| format!("Failed to open calibration file {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .wrap_err_with(|| format!("Failed to decode calibration file {}", path.display()))
}

/// Pick a named histogram from a calibration file holding several of them
pub fn read_named<T: DeserializeOwned>(path: &Path, name: &str) -> Result<T> {
    let mut histograms = read_json::<HashMap<String, T>>(path)?;
    histograms
        .remove(name)
        .ok_or_else(|| eyre!("No histogram {name:?} in {}", path.display()))
}

/// Every calibration table needed by the configured corrections
///
/// Tables of disabled corrections are not loaded.
pub struct Calibration {
    /// Pileup reweighting
    pub pileup: Option<PileupTable>,

    /// Muon efficiency scale factors
    pub efficiency: Option<EfficiencyTables>,

    /// Muon momentum scale correction
    pub momentum_scale: Option<Box<dyn MomentumScaleCorrection>>,
}
//
impl Calibration {
    /// Load the tables that the configuration calls for
    pub fn load(cfg: &Configuration) -> Result<Self> {
        let root = cfg.calibration_dir.as_path();
        let toggles = &cfg.corrections;
        let pileup = if cfg.is_mc && toggles.pileup {
            Some(PileupTable::load(root, cfg.era)?)
        } else {
            None
        };
        let efficiency = if cfg.is_mc && toggles.any_efficiency_sf() {
            Some(EfficiencyTables::load(root, cfg.era, &cfg.sf_names, cfg.channel)?)
        } else {
            None
        };
        let momentum_scale = if toggles.momentum_scale {
            let tables = RochesterTables::load(root, cfg.era)?;
            Some(Box::new(tables) as Box<dyn MomentumScaleCorrection>)
        } else {
            None
        };
        Ok(Self {
            pileup,
            efficiency,
            momentum_scale,
        })
    }

    /// Calibration with no table at all, for runs without corrections
    pub fn none() -> Self {
        Self {
            pileup: None,
            efficiency: None,
            momentum_scale: None,
        }
    }
}
