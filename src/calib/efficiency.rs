//! Muon efficiency scale factors
//!
//! Surfaces are binned in |eta| along X and pT along Y. Queries outside the
//! tabulated range are clamped onto the closest bin, except that the trigger
//! efficiency vanishes below the trigger surface's pT range.

use super::{axis::Axis, read_named, StoredHist2d};
use crate::{
    config::{Channel, Era, ScaleFactorNames},
    muon::EfficiencyFactors,
    numeric::Float,
    Result,
};

use eyre::{ensure, WrapErr};

use std::path::Path;

/// A 2D efficiency (or efficiency ratio) surface
#[derive(Clone, Debug)]
pub struct EfficiencySurface {
    /// |eta| binning
    abs_eta: Axis,

    /// pT binning
    pt: Axis,

    /// Values, indexed as [eta bin][pt bin]
    values: Vec<Vec<Float>>,
}
//
impl EfficiencySurface {
    /// Validate a stored surface
    pub fn new(stored: StoredHist2d) -> Result<Self> {
        let abs_eta = Axis::new(stored.x_edges).wrap_err("Bad |eta| binning")?;
        let pt = Axis::new(stored.y_edges).wrap_err("Bad pT binning")?;
        ensure!(
            stored.contents.len() == abs_eta.num_bins()
                && stored.contents.iter().all(|row| row.len() == pt.num_bins()),
            "Surface contents do not match a {}x{} binning",
            abs_eta.num_bins(),
            pt.num_bins()
        );
        Ok(Self {
            abs_eta,
            pt,
            values: stored.contents,
        })
    }

    /// Load a named surface from a calibration file
    fn load(path: &Path, name: &str) -> Result<Self> {
        Self::new(read_named(path, name)?)
            .wrap_err_with(|| format!("Bad surface {name:?} in {}", path.display()))
    }

    /// Value at (pT, eta), clamped into the tabulated range
    pub fn value(&self, pt: Float, eta: Float) -> Float {
        let eta_bin = self.abs_eta.clamped_bin(eta.abs());
        let pt_bin = self.pt.clamped_bin(pt);
        self.values[eta_bin][pt_bin]
    }

    /// Lowest tabulated pT
    pub fn min_pt(&self) -> Float {
        self.pt.min()
    }
}

/// Trigger efficiency information
#[derive(Clone, Debug)]
enum TriggerSurfaces {
    /// Data/simulation ratio, for single-muon events
    Ratio(EfficiencySurface),

    /// Separate efficiencies, combined per event in the dimuon channel
    DataAndMc {
        data: EfficiencySurface,
        mc: EfficiencySurface,
    },
}

/// Identification, isolation and trigger scale factor surfaces
#[derive(Clone, Debug)]
pub struct EfficiencyTables {
    id: EfficiencySurface,
    iso: EfficiencySurface,
    trig: TriggerSurfaces,
}
//
impl EfficiencyTables {
    /// Load the surfaces of an era
    ///
    /// The dimuon channel needs the separate trigger efficiencies, the
    /// single-muon channel the combined ratio.
    ///
    pub fn load(
        calibration_dir: &Path,
        era: Era,
        names: &ScaleFactorNames,
        channel: Channel,
    ) -> Result<Self> {
        let dir = calibration_dir.join("muon_sf");
        let file = |kind: &str| dir.join(format!("{}_{kind}.json", era.as_str()));
        let (id_path, iso_path, trig_path) = (file("ID"), file("Iso"), file("Trig"));

        let trig = match channel {
            Channel::SingleMuon => {
                TriggerSurfaces::Ratio(EfficiencySurface::load(&trig_path, &names.trig)?)
            }
            Channel::Dimuon => TriggerSurfaces::DataAndMc {
                data: EfficiencySurface::load(&trig_path, &names.trig_data())?,
                mc: EfficiencySurface::load(&trig_path, &names.trig_mc())?,
            },
        };
        let tables = Self {
            id: EfficiencySurface::load(&id_path, &names.id)?,
            iso: EfficiencySurface::load(&iso_path, &names.iso)?,
            trig,
        };
        tracing::info!("Loaded efficiency scale factors from {}", dir.display());
        tracing::info!("ID  : {} (pT from {})", names.id, tables.id.min_pt());
        tracing::info!("Iso : {} (pT from {})", names.iso, tables.iso.min_pt());
        tracing::info!("Trig: {} (pT from {})", names.trig, tables.trigger_min_pt());
        Ok(tables)
    }

    /// Assemble tables from already validated surfaces (single-muon flavour)
    pub fn from_surfaces(
        id: EfficiencySurface,
        iso: EfficiencySurface,
        trig: EfficiencySurface,
    ) -> Self {
        Self {
            id,
            iso,
            trig: TriggerSurfaces::Ratio(trig),
        }
    }

    /// Assemble tables from already validated surfaces (dimuon flavour)
    pub fn from_surfaces_dimuon(
        id: EfficiencySurface,
        iso: EfficiencySurface,
        trig_data: EfficiencySurface,
        trig_mc: EfficiencySurface,
    ) -> Self {
        Self {
            id,
            iso,
            trig: TriggerSurfaces::DataAndMc {
                data: trig_data,
                mc: trig_mc,
            },
        }
    }

    /// Lowest pT at which the trigger is efficient
    fn trigger_min_pt(&self) -> Float {
        match &self.trig {
            TriggerSurfaces::Ratio(surface) => surface.min_pt(),
            TriggerSurfaces::DataAndMc { data, .. } => data.min_pt(),
        }
    }

    /// Scale factors for a muon of given pT and eta
    ///
    /// In the dimuon flavour, `trig` holds the data efficiency and `trig_mc`
    /// the simulated one.
    pub fn factors(&self, pt: Float, eta: Float) -> EfficiencyFactors {
        let below_turn_on = pt < self.trigger_min_pt();
        let trigger = |surface: &EfficiencySurface| {
            if below_turn_on {
                0.
            } else {
                surface.value(pt, eta)
            }
        };
        let (trig, trig_mc) = match &self.trig {
            TriggerSurfaces::Ratio(surface) => (trigger(surface), None),
            TriggerSurfaces::DataAndMc { data, mc } => (trigger(data), Some(trigger(mc))),
        };
        EfficiencyFactors {
            id: self.id.value(pt, eta),
            iso: self.iso.value(pt, eta),
            trig,
            trig_mc,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;

    /// Surface on |eta| edges [0, 1.2, 2.4] and pT edges [low, 50, 120]
    pub(crate) fn surface(min_pt: Float, values: [[Float; 2]; 2]) -> EfficiencySurface {
        EfficiencySurface::new(StoredHist2d {
            x_edges: vec![0., 1.2, 2.4],
            y_edges: vec![min_pt, 50., 120.],
            contents: values.iter().map(|row| row.to_vec()).collect(),
        })
        .unwrap()
    }

    pub(crate) fn single_muon_tables() -> EfficiencyTables {
        EfficiencyTables::from_surfaces(
            surface(15., [[0.99, 0.98], [0.97, 0.96]]),
            surface(15., [[0.995, 0.994], [0.993, 0.992]]),
            surface(26., [[0.95, 0.94], [0.93, 0.92]]),
        )
    }

    #[test]
    fn clamped_lookup() {
        let tables = single_muon_tables();
        let inside = tables.factors(40., -0.5);
        assert_eq!((inside.id, inside.iso, inside.trig), (0.99, 0.995, 0.95));
        assert_eq!(inside.trig_mc, None);

        // Upper edges land in the last bin, not in the overflow
        let edge = tables.factors(120., 2.4);
        assert_eq!((edge.id, edge.iso, edge.trig), (0.96, 0.992, 0.92));
        let beyond = tables.factors(1000., -3.);
        assert_eq!((beyond.id, beyond.trig), (0.96, 0.92));
    }

    #[test]
    fn trigger_vanishes_below_turn_on() {
        let tables = single_muon_tables();
        let low = tables.factors(20., 0.3);
        assert_eq!(low.trig, 0.);
        assert_eq!(low.id, 0.99);

        let very_low = tables.factors(5., 0.3);
        assert_eq!((very_low.id, very_low.trig), (0.99, 0.));
        assert_eq!(tables.factors(26., 0.3).trig, 0.95);
    }

    #[test]
    fn dimuon_trigger_efficiencies() {
        let tables = EfficiencyTables::from_surfaces_dimuon(
            surface(15., [[1., 1.], [1., 1.]]),
            surface(15., [[1., 1.], [1., 1.]]),
            surface(26., [[0.9, 0.8], [0.7, 0.6]]),
            surface(26., [[0.92, 0.82], [0.72, 0.62]]),
        );
        let factors = tables.factors(60., 1.5);
        assert_eq!((factors.trig, factors.trig_mc), (0.6, Some(0.62)));
        let low = tables.factors(20., 1.5);
        assert_eq!((low.trig, low.trig_mc), (0., Some(0.)));
    }

    #[test]
    fn load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sf_dir = dir.path().join("muon_sf");
        fs::create_dir(&sf_dir).unwrap();
        let names = ScaleFactorNames::for_era(Era::Y2018);
        let hist = r#"{"x_edges": [0, 2.4], "y_edges": [15, 120], "contents": [[0.97]]}"#;
        for (kind, name) in [("ID", &names.id), ("Iso", &names.iso), ("Trig", &names.trig)] {
            fs::write(
                sf_dir.join(format!("2018_{kind}.json")),
                format!(r#"{{"{name}": {hist}}}"#),
            )
            .unwrap();
        }
        let tables =
            EfficiencyTables::load(dir.path(), Era::Y2018, &names, Channel::SingleMuon).unwrap();
        assert_eq!(tables.factors(30., 1.).iso, 0.97);
        assert!(
            EfficiencyTables::load(dir.path(), Era::Y2018, &names, Channel::Dimuon).is_err()
        );
    }

    #[test]
    fn malformed_surface_is_rejected() {
        let stored = StoredHist2d {
            x_edges: vec![0., 1.2, 2.4],
            y_edges: vec![15., 120.],
            contents: vec![vec![1.]],
        };
        assert!(EfficiencySurface::new(stored).is_err());
    }
}
