//! Per-event corrections: event weight, muon momentum scale and efficiency
//! scale factors
//!
//! The steps run in a fixed order, because each one relies on what the
//! previous ones left behind: efficiency scale factors are looked up for the
//! muons that pass the selection, which itself uses the corrected momenta.

use crate::{
    calib::{
        efficiency::EfficiencyTables,
        pileup::PileupTable,
        rochester::{MomentumScaleCorrection, FIXED_VARIATION},
        Calibration,
    },
    config::{Channel, Configuration, CorrectionToggles},
    diagnostics::{Diagnostic, Diagnostics},
    event::EventObjects,
    momentum::{Kinematics, Momentum},
    muon::{EfficiencyFactors, Muon},
    numeric::Float,
    random::RandomGenerator,
    record::EventRecord,
    selection::{select_objects, SelectionProfile},
    Result,
};

use eyre::ensure;

/// Largest angular distance at which a generator muon matches a reconstructed one
const GEN_MATCH_MAX_DR: Float = 0.1;

/// Generator weight of simulated events
const GENERATOR_WEIGHT: &str = "Generator_weight";

/// Mean number of interactions per bunch crossing, simulation only
const TRUE_INTERACTIONS: &str = "Pileup_nTrueInt";

/// Nominal L1 prefiring weight
const PREFIRING_WEIGHT: &str = "L1PreFiringWeight_Nom";

/// Correction steps applied to every event of a run
pub struct CorrectionPipeline<'a> {
    /// The run is on simulation
    is_mc: bool,

    /// Corrections to apply
    toggles: CorrectionToggles,

    /// Muon selection applied between momentum and efficiency corrections
    profile: SelectionProfile,

    /// Which muons get efficiency scale factors
    channel: Channel,

    /// Pileup weights, if enabled
    pileup: Option<&'a PileupTable>,

    /// Efficiency scale factors, if any is enabled
    efficiency: Option<&'a EfficiencyTables>,

    /// Momentum scale correction, if enabled
    momentum_scale: Option<&'a dyn MomentumScaleCorrection>,
}
//
impl<'a> CorrectionPipeline<'a> {
    /// Set up the pipeline of a run, checking that every table it needs is there
    pub fn new(cfg: &Configuration, calibration: &'a Calibration) -> Result<Self> {
        let toggles = cfg.corrections;
        let pileup = calibration.pileup.as_ref().filter(|_| cfg.is_mc && toggles.pileup);
        let efficiency = calibration
            .efficiency
            .as_ref()
            .filter(|_| cfg.is_mc && toggles.any_efficiency_sf());
        let momentum_scale = calibration
            .momentum_scale
            .as_deref()
            .filter(|_| toggles.momentum_scale);

        ensure!(
            pileup.is_some() || !(cfg.is_mc && toggles.pileup),
            "Pileup correction is enabled but no pileup table was loaded"
        );
        ensure!(
            efficiency.is_some() || !(cfg.is_mc && toggles.any_efficiency_sf()),
            "Efficiency scale factors are enabled but no table was loaded"
        );
        ensure!(
            momentum_scale.is_some() || !toggles.momentum_scale,
            "Momentum scale correction is enabled but no table was loaded"
        );

        Ok(Self {
            is_mc: cfg.is_mc,
            toggles,
            profile: cfg.selection_profile,
            channel: cfg.channel,
            pileup,
            efficiency,
            momentum_scale,
        })
    }

    /// Correct an event whose objects were just built, returning its weight
    ///
    /// On return, the objects have been selected.
    pub fn apply(
        &self,
        objects: &mut EventObjects,
        record: &EventRecord,
        rng: &mut RandomGenerator,
        diagnostics: &mut Diagnostics,
    ) -> Result<Float> {
        let mut weight = self.initial_weight(record)?;

        if let Some(table) = self.pileup {
            let true_interactions = record.scalar(TRUE_INTERACTIONS)?;
            weight *= table.weight(true_interactions).unwrap_or_else(|| {
                tracing::error!(
                    "True interaction count {true_interactions} is outside of the pileup \
                     profile, event weight set to 0"
                );
                diagnostics.record(Diagnostic::PileupOutOfRange);
                0.
            });
        }

        if self.is_mc && self.toggles.prefiring {
            weight *= record.scalar(PREFIRING_WEIGHT)?;
        }

        if let Some(correction) = self.momentum_scale {
            self.correct_momenta(objects, correction, rng);
        }

        let missing_scale = select_objects(objects, self.profile, self.momentum_scale.is_some());
        diagnostics.record_many(Diagnostic::MissingMomentumScale, missing_scale as u64);

        if let Some(tables) = self.efficiency {
            weight *= match self.channel {
                Channel::SingleMuon => self.single_muon_efficiency(objects, tables),
                Channel::Dimuon => self.dimuon_efficiency(objects, tables),
            };
        }
        Ok(weight)
    }

    /// Sign of the generator weight for simulation, 1 for data
    fn initial_weight(&self, record: &EventRecord) -> Result<Float> {
        if !self.is_mc {
            return Ok(1.);
        }
        let generator_weight = record.scalar(GENERATOR_WEIGHT)?;
        Ok(if generator_weight < 0. { -1. } else { 1. })
    }

    // ### MOMENTUM SCALE ###

    /// Attach a momentum scale factor to every muon
    ///
    /// Random numbers are drawn in muon order, one per simulated muon that has
    /// no generator match.
    fn correct_momenta(
        &self,
        objects: &mut EventObjects,
        correction: &dyn MomentumScaleCorrection,
        rng: &mut RandomGenerator,
    ) {
        let (set, member) = FIXED_VARIATION;
        let gen_muon_pts = objects
            .gen_muons()
            .map(|p| (*p.p4(), p.pt()))
            .collect::<Vec<_>>();
        for muon in objects.muons.iter_mut() {
            let raw = *muon.raw();
            let (pt, eta, phi) = (raw.pt(), raw.eta(), raw.phi());
            let k = if !self.is_mc {
                correction.k_scale_dt(muon.charge, pt, eta, phi, set, member)
            } else if let Some(gen_pt) = matched_gen_pt(muon, &gen_muon_pts) {
                correction.k_spread_mc(muon.charge, pt, eta, phi, gen_pt, set, member)
            } else {
                let u = rng.random();
                correction.k_smear_mc(
                    muon.charge,
                    pt,
                    eta,
                    phi,
                    muon.tracker_layers,
                    u,
                    set,
                    member,
                )
            };
            muon.set_scale_factor(k);
        }
    }

    // ### EFFICIENCY SCALE FACTORS ###

    /// Weight factor of the leading tight muon's scale factors
    fn single_muon_efficiency(&self, objects: &mut EventObjects, tables: &EfficiencyTables) -> Float {
        let factors = match objects.leading_tight_muon() {
            Some(idx) => score_muon(&mut objects.muons[idx], tables),
            None => EfficiencyFactors::NEUTRAL,
        };
        let toggles = &self.toggles;
        let mut weight = 1.;
        if toggles.id_sf {
            weight *= factors.id;
        }
        if toggles.iso_sf {
            weight *= factors.iso;
        }
        if toggles.trig_sf {
            weight *= factors.trig;
        }
        weight
    }

    /// Weight factor of the two leading tight muons' scale factors
    ///
    /// Either muon may have fired the trigger, so the trigger factor is the
    /// ratio of the data and simulated efficiencies of "at least one fired".
    fn dimuon_efficiency(&self, objects: &mut EventObjects, tables: &EfficiencyTables) -> Float {
        let candidates = objects.tight_muons_by_pt();
        let (first, second) = match candidates[..] {
            [first, second, ..] => (
                score_muon(&mut objects.muons[first], tables),
                score_muon(&mut objects.muons[second], tables),
            ),
            _ => (EfficiencyFactors::NEUTRAL, EfficiencyFactors::NEUTRAL),
        };
        let toggles = &self.toggles;
        let mut weight = 1.;
        if toggles.id_sf {
            weight *= first.id * second.id;
        }
        if toggles.iso_sf {
            weight *= first.iso * second.iso;
        }
        if toggles.trig_sf {
            weight *= dimuon_trigger_factor(&first, &second);
        }
        weight
    }
}

/// pT of the closest generator muon within the matching cone, if any
///
/// A later generator muon only replaces the current best if strictly closer.
fn matched_gen_pt(muon: &Muon, gen_muons: &[(Momentum, Float)]) -> Option<Float> {
    let mut best: Option<(Float, Float)> = None;
    for (p4, pt) in gen_muons {
        let d_r = p4.delta_r(muon.raw());
        let closer = best.map_or(true, |(best_dr, _)| d_r < best_dr);
        if d_r < GEN_MATCH_MAX_DR && closer {
            best = Some((d_r, *pt));
        }
    }
    best.map(|(_, pt)| pt)
}

/// Look up the scale factors of a muon at its uncorrected kinematics
fn score_muon(muon: &mut Muon, tables: &EfficiencyTables) -> EfficiencyFactors {
    let factors = tables.factors(muon.raw().pt(), muon.raw().eta());
    muon.set_efficiency(factors);
    factors
}

/// Trigger scale factor of a muon pair, 0 when the simulated efficiency is 0
fn dimuon_trigger_factor(first: &EfficiencyFactors, second: &EfficiencyFactors) -> Float {
    let either = |a: Float, b: Float| 1. - (1. - a) * (1. - b);
    let data = either(first.trig, second.trig);
    let mc = either(first.trig_mc.unwrap_or(1.), second.trig_mc.unwrap_or(1.));
    if mc == 0. {
        0.
    } else {
        data / mc
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        calib::{
            efficiency::tests::{single_muon_tables, surface},
            rochester::tests::tables,
        },
        config::tests::configuration,
        genpart::tests::{particle, HARD},
        momentum::from_pt_eta_phi_m,
        muon::tests::muon_record,
    };
    use approx::assert_relative_eq;

    /// Record with the given muons, no electron, and every weight field
    pub(crate) fn event_record(muons: &[(Float, Float, Float, Float)]) -> EventRecord {
        muon_record(muons)
            .with_scalar("nElectron", 0.)
            .with_array("Electron_pt", vec![])
            .with_array("Electron_eta", vec![])
            .with_array("Electron_phi", vec![])
            .with_array("Electron_mass", vec![])
            .with_array("Electron_charge", vec![])
            .with_array("Electron_cutBased", vec![])
            .with_array("Electron_deltaEtaSC", vec![])
            .with_scalar("MET_pt", 45.)
            .with_scalar("MET_phi", 1.67)
            .with_scalar("MET_sumEt", 500.)
            .with_scalar("PuppiMET_pt", 45.)
            .with_scalar("PuppiMET_phi", 1.67)
            .with_scalar("PuppiMET_sumEt", 400.)
            .with_scalar("Generator_weight", -1234.5)
            .with_scalar("Pileup_nTrueInt", 30.)
            .with_scalar("L1PreFiringWeight_Nom", 0.97)
    }

    fn built(record: &EventRecord, is_mc: bool) -> EventObjects {
        let mut objects = EventObjects::new();
        objects.build(record, is_mc, SelectionProfile::Standard).unwrap();
        objects
    }

    #[test]
    fn data_weight_is_one_and_muons_get_scaled() {
        let cfg = configuration(false, CorrectionToggles {
            momentum_scale: true,
            ..CorrectionToggles::default()
        });
        let calibration = Calibration {
            momentum_scale: Some(Box::new(tables())),
            ..Calibration::none()
        };
        let pipeline = CorrectionPipeline::new(&cfg, &calibration).unwrap();

        let record = event_record(&[(60., 0.5, 0.1, 1.)]);
        let mut objects = built(&record, false);
        let mut rng = RandomGenerator::new(1);
        let mut diagnostics = Diagnostics::new();
        let weight = pipeline
            .apply(&mut objects, &record, &mut rng, &mut diagnostics)
            .unwrap();
        assert_eq!(weight, 1.);
        assert!(objects.is_selected());
        let muon = &objects.muons[0];
        let expected = tables().k_scale_dt(-1, 60., 0.5, 0.1, 5, 0);
        assert_relative_eq!(muon.scale_factor().unwrap(), expected, max_relative = 1e-9);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn simulation_weights() {
        let toggles = CorrectionToggles {
            prefiring: true,
            id_sf: true,
            trig_sf: true,
            ..CorrectionToggles::default()
        };
        let cfg = configuration(true, toggles);
        let calibration = Calibration {
            efficiency: Some(single_muon_tables()),
            ..Calibration::none()
        };
        let pipeline = CorrectionPipeline::new(&cfg, &calibration).unwrap();

        // Leading tight muon is the second one; lookups use eta bin 1, pT bin 0
        let record = with_empty_gen(event_record(&[(35., 0.2, 0.1, 1.), (45., 1.5, 2., 1.)]));
        let mut objects = built(&record, true);
        let weight = pipeline
            .apply(&mut objects, &record, &mut RandomGenerator::new(1), &mut Diagnostics::new())
            .unwrap();
        assert_relative_eq!(weight, -1. * 0.97 * 0.97 * 0.93, max_relative = 1e-12);
        assert!(objects.muons[0].efficiency().is_none());
        assert_eq!(objects.muons[1].efficiency().unwrap().id, 0.97);
    }

    /// Add an empty generator record
    pub(crate) fn with_empty_gen(record: EventRecord) -> EventRecord {
        record
            .with_scalar("nGenPart", 0.)
            .with_array("GenPart_pt", vec![])
            .with_array("GenPart_eta", vec![])
            .with_array("GenPart_phi", vec![])
            .with_array("GenPart_mass", vec![])
            .with_array("GenPart_pdgId", vec![])
            .with_array("GenPart_status", vec![])
            .with_array("GenPart_statusFlags", vec![])
            .with_array("GenPart_genPartIdxMother", vec![])
            .with_scalar("GenMET_pt", 20.)
            .with_scalar("GenMET_phi", 0.3)
    }

    #[test]
    fn no_tight_muon_means_neutral_factors() {
        let cfg = configuration(true, CorrectionToggles {
            id_sf: true,
            iso_sf: true,
            trig_sf: true,
            ..CorrectionToggles::default()
        });
        let calibration = Calibration {
            efficiency: Some(single_muon_tables()),
            ..Calibration::none()
        };
        let pipeline = CorrectionPipeline::new(&cfg, &calibration).unwrap();
        let record = with_empty_gen(event_record(&[(20., 0.2, 0.1, 1.)]));
        let mut objects = built(&record, true);
        let weight = pipeline
            .apply(&mut objects, &record, &mut RandomGenerator::new(1), &mut Diagnostics::new())
            .unwrap();
        assert_eq!(weight, -1.);
    }

    #[test]
    fn missing_tables_are_reported() {
        let cfg = configuration(true, CorrectionToggles {
            pileup: true,
            ..CorrectionToggles::default()
        });
        assert!(CorrectionPipeline::new(&cfg, &Calibration::none()).is_err());
    }

    #[test]
    fn generator_matching() {
        let muon = Muon::new(from_pt_eta_phi_m(50., 0.5, 1.0, 0.10566), 0, -1);
        let gen = |pt: Float, eta: Float, phi: Float| {
            let p = particle(0, 13, (pt, eta, phi, 0.10566), HARD);
            (*p.p4(), p.pt())
        };
        // Outside of the cone
        assert_eq!(matched_gen_pt(&muon, &[gen(50., 0.7, 1.0)]), None);
        // Closest wins, whatever the order
        let near = gen(49., 0.52, 1.0);
        let nearer = gen(51., 0.5, 1.01);
        assert_relative_eq!(matched_gen_pt(&muon, &[near, nearer]).unwrap(), 51., max_relative = 1e-12);
        assert_relative_eq!(matched_gen_pt(&muon, &[nearer, near]).unwrap(), 51., max_relative = 1e-12);
        // Ties keep the first candidate
        let twin = (nearer.0, 52.);
        assert_relative_eq!(matched_gen_pt(&muon, &[nearer, twin]).unwrap(), 51., max_relative = 1e-12);
    }

    #[test]
    fn unmatched_simulated_muons_draw_random_numbers() {
        let cfg = configuration(true, CorrectionToggles {
            momentum_scale: true,
            ..CorrectionToggles::default()
        });
        let calibration = Calibration {
            momentum_scale: Some(Box::new(tables())),
            ..Calibration::none()
        };
        let pipeline = CorrectionPipeline::new(&cfg, &calibration).unwrap();
        let record = with_empty_gen(event_record(&[(40., 0.3, 0.2, 1.), (35., -1.5, -2., 1.)]));
        let mut objects = built(&record, true);
        let mut rng = RandomGenerator::new(99);
        pipeline
            .apply(&mut objects, &record, &mut rng, &mut Diagnostics::new())
            .unwrap();

        // Both muons are unmatched: two draws, in muon order
        let mut replay = RandomGenerator::new(99);
        let (u1, u2) = (replay.random(), replay.random());
        let k1 = tables().k_smear_mc(-1, 40., 0.3, 0.2, 12, u1, 5, 0);
        let k2 = tables().k_smear_mc(-1, 35., -1.5, -2., 12, u2, 5, 0);
        assert_relative_eq!(objects.muons[0].scale_factor().unwrap(), k1, max_relative = 1e-9);
        assert_relative_eq!(objects.muons[1].scale_factor().unwrap(), k2, max_relative = 1e-9);
        assert_eq!(rng.random(), replay.random());
    }

    #[test]
    fn dimuon_trigger_combination() {
        let factors = |trig, trig_mc| EfficiencyFactors {
            id: 1.,
            iso: 1.,
            trig,
            trig_mc: Some(trig_mc),
        };
        let sf = dimuon_trigger_factor(&factors(0.9, 0.92), &factors(0.6, 0.62));
        assert_relative_eq!(sf, (1. - 0.1 * 0.4) / (1. - 0.08 * 0.38), max_relative = 1e-12);
        assert_eq!(dimuon_trigger_factor(&factors(0., 0.), &factors(0., 0.)), 0.);
        assert_eq!(
            dimuon_trigger_factor(&EfficiencyFactors::NEUTRAL, &EfficiencyFactors::NEUTRAL),
            1.
        );
    }

    #[test]
    fn dimuon_scale_factors() {
        let mut cfg = configuration(true, CorrectionToggles {
            id_sf: true,
            trig_sf: true,
            ..CorrectionToggles::default()
        });
        cfg.channel = Channel::Dimuon;
        let calibration = Calibration {
            efficiency: Some(EfficiencyTables::from_surfaces_dimuon(
                surface(15., [[0.99, 0.98], [0.97, 0.96]]),
                surface(15., [[1., 1.], [1., 1.]]),
                surface(26., [[0.9, 0.8], [0.7, 0.6]]),
                surface(26., [[0.92, 0.82], [0.72, 0.62]]),
            )),
            ..Calibration::none()
        };
        let pipeline = CorrectionPipeline::new(&cfg, &calibration).unwrap();
        let record = with_empty_gen(event_record(&[(35., 0.2, 0.1, 1.), (45., 1.5, 2., 1.)]));
        let mut objects = built(&record, true);
        let weight = pipeline
            .apply(&mut objects, &record, &mut RandomGenerator::new(1), &mut Diagnostics::new())
            .unwrap();
        let trig = (1. - 0.1 * 0.3) / (1. - 0.08 * 0.28);
        assert_relative_eq!(weight, -1. * 0.99 * 0.97 * trig, max_relative = 1e-12);
    }
}
