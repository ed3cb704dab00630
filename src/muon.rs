//! Reconstructed muons

use crate::{
    momentum::{from_pt_eta_phi_m, Kinematics, Momentum},
    numeric::Float,
    record::EventRecord,
    selection::{SelectionProfile, SelectionTier},
    Result,
};

/// Isolation variables
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Isolation {
    /// Particle-flow relative isolation, cone 0.3, all components
    pub pf_rel_iso03_all: Float,

    /// Particle-flow relative isolation, cone 0.3, charged component
    pub pf_rel_iso03_chg: Float,

    /// Particle-flow relative isolation, cone 0.4, all components
    pub pf_rel_iso04_all: Float,

    /// Tracker relative isolation
    pub tk_rel_iso: Float,
}

/// Identification working points
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MuonId {
    pub loose: bool,
    pub medium: bool,
    pub medium_prompt: bool,
    pub soft: bool,
    pub tight: bool,
    /// High-pT ID, tracker flavour
    pub trk_high_pt: bool,
    /// High-pT ID, global flavour
    pub glb_high_pt: bool,
}

/// Reconstruction algorithms which produced the muon
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MuonType {
    pub global: bool,
    pub pf_cand: bool,
    pub standalone: bool,
    pub tracker: bool,
}

/// Efficiency scale factors attached to a muon
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EfficiencyFactors {
    /// Identification
    pub id: Float,

    /// Isolation
    pub iso: Float,

    /// Trigger. For dimuon events this is the data efficiency.
    pub trig: Float,

    /// Trigger efficiency in simulation, only known in the dimuon channel
    pub trig_mc: Option<Float>,
}
//
impl EfficiencyFactors {
    /// Factors that leave the event weight unchanged
    pub const NEUTRAL: Self = Self {
        id: 1.,
        iso: 1.,
        trig: 1.,
        trig_mc: None,
    };
}

/// A reconstructed muon
#[derive(Clone, Debug)]
pub struct Muon {
    /// Four-momentum as reconstructed (tune-P corrected in the high-pT regime)
    raw: Momentum,

    /// Position in the record arrays
    pub index: usize,

    /// Electric charge, ±1
    pub charge: i32,

    /// Number of muon stations with hits
    pub n_stations: i32,

    /// Number of tracker layers with hits
    pub tracker_layers: i32,

    /// Isolation variables
    pub isolation: Isolation,

    /// Tune-P pT over standard pT
    pub tune_p_rel_pt: Float,

    /// Identification bits
    pub id: MuonId,

    /// Reconstruction type flags
    pub kind: MuonType,

    /// Momentum scale factor, `None` until the correction has run
    scale_factor: Option<Float>,

    /// Efficiency scale factors, only set on the muons that get scored
    efficiency: Option<EfficiencyFactors>,

    /// Selection outcome, `None` until selection has run
    tier: Option<SelectionTier>,
}
//
impl Muon {
    /// Build a muon with default provenance, mostly useful for tests
    pub fn new(raw: Momentum, index: usize, charge: i32) -> Self {
        Self {
            raw,
            index,
            charge,
            n_stations: 0,
            tracker_layers: 0,
            isolation: Isolation::default(),
            tune_p_rel_pt: 1.,
            id: MuonId::default(),
            kind: MuonType::default(),
            scale_factor: None,
            efficiency: None,
            tier: None,
        }
    }

    /// Read muon `idx` from the record
    fn from_record(record: &EventRecord, idx: usize, profile: SelectionProfile) -> Result<Self> {
        let tune_p_rel_pt = record.array_at("Muon_tunepRelPt", idx)?;
        let mut pt = record.array_at("Muon_pt", idx)?;
        if profile.uses_tune_p() {
            pt *= tune_p_rel_pt;
        }
        let raw = from_pt_eta_phi_m(
            pt,
            record.array_at("Muon_eta", idx)?,
            record.array_at("Muon_phi", idx)?,
            record.array_at("Muon_mass", idx)?,
        );
        let high_pt_id = record.array_int("Muon_highPtId", idx)?;
        Ok(Self {
            n_stations: record.array_int("Muon_nStations", idx)?,
            tracker_layers: record.array_int("Muon_nTrackerLayers", idx)?,
            isolation: Isolation {
                pf_rel_iso03_all: record.array_at("Muon_pfRelIso03_all", idx)?,
                pf_rel_iso03_chg: record.array_at("Muon_pfRelIso03_chg", idx)?,
                pf_rel_iso04_all: record.array_at("Muon_pfRelIso04_all", idx)?,
                tk_rel_iso: record.array_at("Muon_tkRelIso", idx)?,
            },
            tune_p_rel_pt,
            id: MuonId {
                loose: record.array_flag("Muon_looseId", idx)?,
                medium: record.array_flag("Muon_mediumId", idx)?,
                medium_prompt: record.array_flag_or("Muon_mediumPromptId", idx, false)?,
                soft: record.array_flag_or("Muon_softId", idx, false)?,
                tight: record.array_flag("Muon_tightId", idx)?,
                trk_high_pt: high_pt_id == 1,
                glb_high_pt: high_pt_id == 2,
            },
            kind: MuonType {
                global: record.array_flag("Muon_isGlobal", idx)?,
                pf_cand: record.array_flag("Muon_isPFcand", idx)?,
                standalone: record.array_flag("Muon_isStandalone", idx)?,
                tracker: record.array_flag("Muon_isTracker", idx)?,
            },
            ..Self::new(raw, idx, record.array_int("Muon_charge", idx)?)
        })
    }

    // ### KINEMATICS ###

    /// Four-momentum before momentum scale correction
    pub fn raw(&self) -> &Momentum {
        &self.raw
    }

    /// Four-momentum after momentum scale correction, if it was applied
    pub fn p4(&self) -> Momentum {
        match self.scale_factor {
            Some(k) => self.raw * k,
            None => self.raw,
        }
    }

    /// Transverse momentum of the effective four-momentum
    pub fn pt(&self) -> Float {
        self.p4().pt()
    }

    // ### CORRECTIONS ###

    /// Momentum scale factor, if set
    pub fn scale_factor(&self) -> Option<Float> {
        self.scale_factor
    }

    /// Record the momentum scale factor
    pub fn set_scale_factor(&mut self, k: Float) {
        self.scale_factor = Some(k);
    }

    /// Efficiency scale factors, if this muon was scored
    pub fn efficiency(&self) -> Option<&EfficiencyFactors> {
        self.efficiency.as_ref()
    }

    /// Record the efficiency scale factors
    pub fn set_efficiency(&mut self, factors: EfficiencyFactors) {
        self.efficiency = Some(factors);
    }

    // ### SELECTION ###

    /// Selection outcome, if selection has run
    pub fn tier(&self) -> Option<SelectionTier> {
        self.tier
    }

    /// Record the selection outcome
    pub fn set_tier(&mut self, tier: SelectionTier) {
        self.tier = Some(tier);
    }
}

/// Read all muons of an event, in record order
pub fn build_muons(record: &EventRecord, profile: SelectionProfile) -> Result<Vec<Muon>> {
    let n_muon = record.count("nMuon")?;
    (0..n_muon)
        .map(|idx| Muon::from_record(record, idx, profile))
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Record holding the given muons as (pt, eta, phi, tune-P factor)
    pub(crate) fn muon_record(muons: &[(Float, Float, Float, Float)]) -> EventRecord {
        let column = |f: fn(&(Float, Float, Float, Float)) -> Float| {
            muons.iter().map(f).collect::<Vec<_>>()
        };
        let n = muons.len();
        EventRecord::new()
            .with_scalar("nMuon", n as Float)
            .with_array("Muon_pt", column(|m| m.0))
            .with_array("Muon_eta", column(|m| m.1))
            .with_array("Muon_phi", column(|m| m.2))
            .with_array("Muon_tunepRelPt", column(|m| m.3))
            .with_array("Muon_mass", vec![0.10566; n])
            .with_array("Muon_charge", vec![-1.; n])
            .with_array("Muon_nStations", vec![3.; n])
            .with_array("Muon_nTrackerLayers", vec![12.; n])
            .with_array("Muon_pfRelIso03_all", vec![0.05; n])
            .with_array("Muon_pfRelIso03_chg", vec![0.02; n])
            .with_array("Muon_pfRelIso04_all", vec![0.05; n])
            .with_array("Muon_tkRelIso", vec![0.03; n])
            .with_array("Muon_looseId", vec![1.; n])
            .with_array("Muon_mediumId", vec![1.; n])
            .with_array("Muon_tightId", vec![1.; n])
            .with_array("Muon_highPtId", vec![2.; n])
            .with_array("Muon_isGlobal", vec![1.; n])
            .with_array("Muon_isPFcand", vec![1.; n])
            .with_array("Muon_isStandalone", vec![0.; n])
            .with_array("Muon_isTracker", vec![1.; n])
    }

    #[test]
    fn tune_p_only_in_high_pt_profile() {
        let record = muon_record(&[(50., 0.3, 1.0, 1.1)]);
        let standard = build_muons(&record, SelectionProfile::Standard).unwrap();
        let high_pt = build_muons(&record, SelectionProfile::HighPt).unwrap();
        assert_relative_eq!(standard[0].pt(), 50., max_relative = 1e-12);
        assert_relative_eq!(high_pt[0].pt(), 55., max_relative = 1e-12);
        assert!(high_pt[0].id.glb_high_pt && !high_pt[0].id.trk_high_pt);
        assert!(!high_pt[0].id.soft);
        assert_eq!(high_pt[0].tracker_layers, 12);
    }

    #[test]
    fn effective_vector_follows_scale_factor() {
        let record = muon_record(&[(40., -0.5, 0.2, 1.)]);
        let mut muons = build_muons(&record, SelectionProfile::Standard).unwrap();
        let muon = &mut muons[0];
        assert_eq!(muon.scale_factor(), None);
        assert_eq!(muon.p4(), *muon.raw());
        muon.set_scale_factor(0.99);
        assert_relative_eq!(muon.pt(), 39.6, max_relative = 1e-12);
        assert_relative_eq!(muon.raw().pt(), 40., max_relative = 1e-12);
    }

    #[test]
    fn truncated_arrays_are_an_error() {
        let record = muon_record(&[(40., -0.5, 0.2, 1.)]).with_scalar("nMuon", 2.);
        assert!(build_muons(&record, SelectionProfile::Standard).is_err());
    }
}
