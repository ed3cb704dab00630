//! Event loop of one input shard
//!
//! Every record goes through the same sequence: objects are built, corrected
//! and weighted, simulated W samples are patched against their generator
//! window, and the channel's selection decides whether the event makes it to
//! the final histograms. The outcome of each step is counted in a cut flow.

use crate::{
    calib::Calibration,
    config::{Channel, Configuration},
    correction::CorrectionPipeline,
    diagnostics::{Diagnostic, Diagnostics},
    event::EventObjects,
    genpart::{self, GenParticle},
    genpatch::GenBosonScan,
    histograms::{DimuonMasses, EventView, GenView, HistogramSet, PileupCounts, Stage},
    metcorr::correct_pf_met,
    momentum::{delta_phi, transverse_mass, Kinematics},
    numeric::Float,
    random::RandomGenerator,
    record::{EventRecord, RecordSource},
    sample::{infer_patching, PatchWindow, SampleCategory},
    triggers::EventFlags,
    Result,
};

use eyre::WrapErr;
use serde::Serialize;

/// Number of reconstructed primary vertices
const PRIMARY_VERTICES: &str = "PV_npvs";

/// Number of pileup interactions, simulation only
const PILEUP_INTERACTIONS: &str = "Pileup_nPU";

/// Mean number of interactions of the bunch crossing, simulation only
const TRUE_INTERACTIONS: &str = "Pileup_nTrueInt";

/// Scalar sum of parton pT
const LHE_HT: &str = "LHE_HT";

/// Transverse mass that single-muon events must exceed
const MIN_TRANSVERSE_MASS: Float = 40.;

/// Smallest accepted dimuon mass
const MIN_DIMUON_MASS: Float = 10.;

/// Number of events processed and rejected at each step
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CutFlow {
    pub processed: u64,
    pub failed_gen_patching: u64,
    pub failed_muon_filtering: u64,
    pub failed_trigger: u64,
    pub failed_noise_filter: u64,
    pub failed_tight_muon: u64,
    pub failed_loose_muon_veto: u64,
    pub failed_loose_electron_veto: u64,
    pub failed_transverse_mass: u64,
    pub failed_dimuon_candidates: u64,
    pub failed_dimuon_mass: u64,
    pub selected: u64,
}
//
impl CutFlow {
    /// Add the counts of another shard
    pub fn merge(&mut self, other: &CutFlow) {
        self.processed += other.processed;
        self.failed_gen_patching += other.failed_gen_patching;
        self.failed_muon_filtering += other.failed_muon_filtering;
        self.failed_trigger += other.failed_trigger;
        self.failed_noise_filter += other.failed_noise_filter;
        self.failed_tight_muon += other.failed_tight_muon;
        self.failed_loose_muon_veto += other.failed_loose_muon_veto;
        self.failed_loose_electron_veto += other.failed_loose_electron_veto;
        self.failed_transverse_mass += other.failed_transverse_mass;
        self.failed_dimuon_candidates += other.failed_dimuon_candidates;
        self.failed_dimuon_mass += other.failed_dimuon_mass;
        self.selected += other.selected;
    }

    /// Rows of the cut flow relevant to a channel, in event loop order
    pub fn rows(&self, channel: Channel) -> Vec<(&'static str, u64)> {
        let mut rows = vec![
            ("processed", self.processed),
            ("failed generator patching", self.failed_gen_patching),
            ("failed generator muon filter", self.failed_muon_filtering),
            ("failed trigger", self.failed_trigger),
            ("failed noise filters", self.failed_noise_filter),
        ];
        match channel {
            Channel::SingleMuon => rows.extend([
                ("not exactly one tight muon", self.failed_tight_muon),
                ("extra loose muon", self.failed_loose_muon_veto),
                ("extra loose electron", self.failed_loose_electron_veto),
                ("transverse mass too low", self.failed_transverse_mass),
            ]),
            Channel::Dimuon => rows.extend([
                ("fewer than two tight muons", self.failed_dimuon_candidates),
                ("dimuon mass too low", self.failed_dimuon_mass),
            ]),
        }
        rows.push(("selected", self.selected));
        rows
    }
}

/// Everything an event loop produces
#[derive(Clone, Debug)]
pub struct AnalysisResults {
    /// Sum of the weights of all processed events
    pub sum_of_weights: Float,

    /// Event counts at each step
    pub cutflow: CutFlow,

    /// Non-fatal conditions met along the way
    pub diagnostics: Diagnostics,

    /// Histograms of the channel
    pub histograms: HistogramSet,
}
//
impl AnalysisResults {
    /// Start from nothing
    pub fn new(channel: Channel) -> Self {
        Self {
            sum_of_weights: 0.,
            cutflow: CutFlow::default(),
            diagnostics: Diagnostics::new(),
            histograms: HistogramSet::for_channel(channel),
        }
    }

    /// Integrate the results of another shard
    pub fn merge(&mut self, other: AnalysisResults) -> Result<()> {
        self.sum_of_weights += other.sum_of_weights;
        self.cutflow.merge(&other.cutflow);
        self.diagnostics.merge(other.diagnostics);
        self.histograms.merge(&other.histograms)
    }
}

/// Per-run state of the event loop
pub struct Analyzer<'a> {
    /// Run configuration
    cfg: &'a Configuration,

    /// Weights and corrections
    pipeline: CorrectionPipeline<'a>,

    /// Trigger paths and noise filters
    flags: EventFlags,

    /// Generator window of the sample, if it needs patching
    window: Option<PatchWindow>,
}
//
impl<'a> Analyzer<'a> {
    /// Prepare the event loop of a run
    ///
    /// `no_tk_mu50` tells whether the input files lack the `HLT_TkMu50` path.
    pub fn new(cfg: &'a Configuration, calibration: &'a Calibration, no_tk_mu50: bool) -> Result<Self> {
        let pipeline = CorrectionPipeline::new(cfg, calibration)?;
        let flags = EventFlags::new(cfg.era, cfg.selection_profile, &cfg.process_name, no_tk_mu50);
        let window = if cfg.is_mc {
            infer_patching(&cfg.process_name)
        } else {
            None
        };
        if let Some(window) = &window {
            tracing::info!("Patching {} as {:?}", cfg.process_name, window.category);
        }
        Ok(Self {
            cfg,
            pipeline,
            flags,
            window,
        })
    }

    /// Run over all records of a source
    pub fn run(&self, records: impl RecordSource, rng: &mut RandomGenerator) -> Result<AnalysisResults> {
        let mut results = AnalysisResults::new(self.cfg.channel);
        let mut objects = EventObjects::new();
        for (event_index, record) in records.enumerate() {
            let event_index = event_index as u64;
            let record = record?;
            self.process_event(event_index, &record, &mut objects, rng, &mut results)
                .wrap_err_with(|| format!("Failed to process event {event_index}"))?;
        }
        tracing::debug!(
            "Processed {} events, {} selected",
            results.cutflow.processed,
            results.cutflow.selected
        );
        Ok(results)
    }

    fn process_event(
        &self,
        event_index: u64,
        record: &EventRecord,
        objects: &mut EventObjects,
        rng: &mut RandomGenerator,
        results: &mut AnalysisResults,
    ) -> Result<()> {
        // ### OBJECTS AND WEIGHT ###

        objects.reset();
        let invalid_pdg = objects.build(record, self.cfg.is_mc, self.cfg.selection_profile)?;
        results
            .diagnostics
            .record_many(Diagnostic::InvalidPdgId, invalid_pdg as u64);

        let scan = self
            .cfg
            .is_mc
            .then(|| GenBosonScan::scan(&objects.gen_particles, self.window.as_ref()));
        if let (Some(scan), Some(_)) = (&scan, &self.window) {
            let anomalies = scan.check_multiplicities(event_index);
            if anomalies.boson_daughters {
                results.diagnostics.record(Diagnostic::GenBosonMultiplicity);
            }
            if anomalies.tau_daughters {
                results.diagnostics.record(Diagnostic::GenTauChainMultiplicity);
            }
        }

        let npv = record.count(PRIMARY_VERTICES)?;
        let pf_met_corr = correct_pf_met(
            &objects.met.pf,
            &self.cfg.process_name,
            self.cfg.era,
            self.cfg.is_mc,
            npv,
        );

        let weight = self
            .pipeline
            .apply(objects, record, rng, &mut results.diagnostics)?;
        results.sum_of_weights += weight;
        results.cutflow.processed += 1;

        let mut view = EventView {
            npv: npv as Float,
            puppi_met: objects.met.puppi,
            pf_met: objects.met.pf,
            pf_met_corr,
            ..EventView::default()
        };
        if self.cfg.is_mc {
            view.pileup = Some(PileupCounts {
                n_pu: record.scalar(PILEUP_INTERACTIONS)?,
                n_true_int: record.scalar(TRUE_INTERACTIONS)?,
            });
        }
        results.histograms.fill_stage(Stage::Pileup, &view, weight);

        // ### GENERATOR PATCHING ###

        if let Some(scan) = &scan {
            view.gen = Some(self.gen_view(scan, objects));
        }
        if let (Some(window), Some(scan)) = (&self.window, &scan) {
            let ht = if window.needs_ht() { record.scalar(LHE_HT)? } else { 0. };
            if !scan.passes_window(window, ht) {
                results.cutflow.failed_gen_patching += 1;
                return Ok(());
            }
            results.histograms.fill_stage(Stage::Patched, &view, weight);

            if !scan.passes_muon_filter() {
                results.cutflow.failed_muon_filtering += 1;
                return Ok(());
            }
            if matches!(window.category, SampleCategory::InclusiveW | SampleCategory::BoostedW) {
                view.lhe_ht = Some(record.scalar(LHE_HT)?);
            }
        }

        // ### SELECTION ###

        let selected = match self.cfg.channel {
            Channel::SingleMuon => self.select_single_muon(record, objects, &mut view, weight, results)?,
            Channel::Dimuon => self.select_dimuon(record, objects, &mut view, results)?,
        };
        if selected {
            results.cutflow.selected += 1;
            results.histograms.fill_stage(Stage::AfterSelection, &view, weight);
        }
        Ok(())
    }

    /// Generator-level summary of a simulated event
    fn gen_view(&self, scan: &GenBosonScan, objects: &EventObjects) -> GenView {
        let leading = |pred: fn(&GenParticle) -> bool| {
            genpart::leading(&objects.gen_particles, pred).map(|p| *p.p4())
        };
        GenView {
            boson: scan.boson().copied(),
            inclusive_w: self
                .window
                .map_or(false, |w| w.category == SampleCategory::InclusiveW),
            boson_to_muon: scan.passes_muon_filter(),
            leading_muon: leading(GenParticle::is_muon),
            leading_neutrino: leading(GenParticle::is_neutrino),
            met: objects.met.gen,
        }
    }

    /// Trigger and noise filters, common to both channels
    fn passes_event_flags(&self, record: &EventRecord, results: &mut AnalysisResults) -> Result<bool> {
        if !self.flags.passes_trigger(record)? {
            results.cutflow.failed_trigger += 1;
            return Ok(false);
        }
        if !self.flags.passes_filters(record)? {
            results.cutflow.failed_noise_filter += 1;
            return Ok(false);
        }
        Ok(true)
    }

    /// W → μν selection, filling the pre-selection histograms on the way
    fn select_single_muon(
        &self,
        record: &EventRecord,
        objects: &EventObjects,
        view: &mut EventView,
        weight: Float,
        results: &mut AnalysisResults,
    ) -> Result<bool> {
        view.leading_muon = objects
            .leading_tight_muon()
            .map(|idx| objects.muons[idx].p4());
        results.histograms.fill_stage(Stage::BeforeSelection, view, weight);

        if !self.passes_event_flags(record, results)? {
            return Ok(false);
        }
        let tight = objects.tight_muons();
        if tight.len() != 1 {
            results.cutflow.failed_tight_muon += 1;
            return Ok(false);
        }
        if !objects.loose_muons().is_empty() {
            results.cutflow.failed_loose_muon_veto += 1;
            return Ok(false);
        }
        if !objects.loose_electrons().is_empty() {
            results.cutflow.failed_loose_electron_veto += 1;
            return Ok(false);
        }

        // The transverse mass uses PUPPI MET, not particle-flow MET
        let muon = tight[0].p4();
        let met = &objects.met.puppi;
        let mt = transverse_mass(muon.pt(), met.pt, delta_phi(met.phi, muon.phi()));
        if mt <= MIN_TRANSVERSE_MASS {
            results.cutflow.failed_transverse_mass += 1;
            return Ok(false);
        }
        Ok(true)
    }

    /// Z → μμ selection on the two leading tight muons
    fn select_dimuon(
        &self,
        record: &EventRecord,
        objects: &EventObjects,
        view: &mut EventView,
        results: &mut AnalysisResults,
    ) -> Result<bool> {
        if !self.passes_event_flags(record, results)? {
            return Ok(false);
        }
        let leading = objects.tight_muons_by_pt();
        if leading.len() < 2 {
            results.cutflow.failed_dimuon_candidates += 1;
            return Ok(false);
        }

        let (first, second) = (&objects.muons[leading[0]], &objects.muons[leading[1]]);
        let corrected = (first.p4() + second.p4()).m();
        if corrected < MIN_DIMUON_MASS {
            results.cutflow.failed_dimuon_mass += 1;
            return Ok(false);
        }
        let raw = (*first.raw() + *second.raw()).m();
        view.dimuon = Some(DimuonMasses { raw, corrected });
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{tests::configuration, CorrectionToggles},
        correction::tests::{event_record, with_empty_gen},
        numeric::reals::consts::PI,
        triggers::tests::all_filters,
    };
    use approx::assert_relative_eq;

    /// Data record of the 2018 single-muon trigger, passing every filter
    fn data_record(muons: &[(Float, Float, Float, Float)], trigger: bool) -> EventRecord {
        all_filters(event_record(muons), true)
            .with_scalar("MET_phi", 0.1 + PI / 2.)
            .with_scalar("PuppiMET_phi", 0.1 + PI / 2.)
            .with_scalar(PRIMARY_VERTICES, 20.)
            .with_flag("HLT_IsoMu24", trigger)
    }

    fn run(cfg: &Configuration, records: Vec<EventRecord>) -> AnalysisResults {
        let calibration = Calibration::none();
        let analyzer = Analyzer::new(cfg, &calibration, false).unwrap();
        analyzer
            .run(records.into_iter().map(Ok), &mut RandomGenerator::new(cfg.rng_seed))
            .unwrap()
    }

    #[test]
    fn single_muon_event_is_selected() {
        let cfg = configuration(false, CorrectionToggles::default());
        let results = run(&cfg, vec![data_record(&[(60., 0.5, 0.1, 1.)], true)]);
        assert_eq!(results.cutflow.processed, 1);
        assert_eq!(results.cutflow.selected, 1);
        assert_eq!(results.sum_of_weights, 1.);

        // MT = sqrt(2·60·45) ≈ 73.5 for perpendicular muon and MET
        let mt = results.histograms.get("hW_MT_after").unwrap();
        assert_eq!(mt.bin_content(73), 1.);
        let npv = results.histograms.get("hNPV").unwrap();
        assert_eq!(npv.bin_content(20), 1.);
        assert_eq!(results.histograms.get("hNPV_after").unwrap().total(), 1.);
    }

    #[test]
    fn transverse_mass_uses_puppi_met() {
        let cfg = configuration(false, CorrectionToggles::default());
        let muon = [(60., 0.5, 0.1, 1.)];
        let records = vec![
            // PF MET perpendicular to the muon, PUPPI MET parallel to it
            data_record(&muon, true).with_scalar("PuppiMET_phi", 0.1),
            // PF MET parallel to the muon, PUPPI MET perpendicular to it
            data_record(&muon, true).with_scalar("MET_phi", 0.1),
        ];
        let results = run(&cfg, records);
        assert_eq!(results.cutflow.failed_transverse_mass, 1);
        assert_eq!(results.cutflow.selected, 1);
        let mt = results.histograms.get("hW_MT_after").unwrap();
        assert_eq!(mt.bin_content(73), 1.);
    }

    #[test]
    fn transverse_mass_must_exceed_threshold() {
        let cfg = configuration(false, CorrectionToggles::default());
        // Back-to-back muon and MET: MT = 2·sqrt(pT·MET)
        let at_threshold = data_record(&[(40., 0.5, 0., 1.)], true)
            .with_scalar("PuppiMET_pt", 10.)
            .with_scalar("PuppiMET_phi", PI);
        let above_threshold = at_threshold.clone().with_scalar("PuppiMET_pt", 10.5);
        let results = run(&cfg, vec![at_threshold, above_threshold]);
        assert_eq!(results.cutflow.failed_transverse_mass, 1);
        assert_eq!(results.cutflow.selected, 1);
        let mt = results.histograms.get("hW_MT").unwrap();
        assert_eq!(mt.bin_content(40), 2.);
    }

    #[test]
    fn rejections_are_counted() {
        let cfg = configuration(false, CorrectionToggles::default());
        let records = vec![
            data_record(&[(60., 0.5, 0.1, 1.)], false),
            data_record(&[(60., 0.5, 0.1, 1.), (50., -1., 2., 1.)], true),
            // Parallel muon and MET give MT = 0
            data_record(&[(60., 0.5, 0.1, 1.)], true).with_scalar("PuppiMET_phi", 0.1),
            data_record(&[(60., 0.5, 0.1, 1.)], true).with_flag("Flag_goodVertices", false),
        ];
        let results = run(&cfg, records);
        let cutflow = &results.cutflow;
        assert_eq!(cutflow.processed, 4);
        assert_eq!(cutflow.failed_trigger, 1);
        assert_eq!(cutflow.failed_tight_muon, 1);
        assert_eq!(cutflow.failed_transverse_mass, 1);
        assert_eq!(cutflow.failed_noise_filter, 1);
        assert_eq!(cutflow.selected, 0);

        // Pre-selection histograms see every event
        assert_eq!(results.histograms.get("hW_MT").unwrap().entries(), 4);
        assert_eq!(results.histograms.get("hW_MT_after").unwrap().entries(), 0);
    }

    #[test]
    fn inclusive_w_outside_of_its_window() {
        let mut cfg = configuration(true, CorrectionToggles::default());
        cfg.process_name = "WJetsToLNu".to_owned();
        let record = with_empty_gen(data_record(&[(60., 0.5, 0.1, 1.)], true))
            .with_scalar(PILEUP_INTERACTIONS, 28.)
            .with_scalar(LHE_HT, 150.);
        let results = run(&cfg, vec![record]);

        assert_eq!(results.cutflow.failed_gen_patching, 1);
        assert_eq!(results.cutflow.selected, 0);
        assert_eq!(results.sum_of_weights, -1.);
        assert_eq!(results.histograms.get("hNPU").unwrap().bin_content(28), -1.);
        assert_eq!(results.histograms.get("hGen_W_pT").unwrap().entries(), 0);
        assert_eq!(results.diagnostics.count(Diagnostic::GenBosonMultiplicity), 1);
    }

    #[test]
    fn simulation_without_patching_keeps_going() {
        let cfg = configuration(true, CorrectionToggles::default());
        let record = with_empty_gen(data_record(&[(60., 0.5, 0.1, 1.)], true))
            .with_scalar(PILEUP_INTERACTIONS, 28.);
        let results = run(&cfg, vec![record]);
        assert_eq!(results.cutflow.selected, 1);
        assert_eq!(results.sum_of_weights, -1.);
        assert!(results.diagnostics.is_empty());
        assert_eq!(results.histograms.get("hW_MT_after").unwrap().bin_content(73), -1.);
    }

    #[test]
    fn dimuon_selection() {
        let mut cfg = configuration(false, CorrectionToggles::default());
        cfg.channel = Channel::Dimuon;
        let pair = [(45., 0.5, 0.1, 1.), (40., -0.3, 0.1 + PI, 1.)];
        let collinear = [(45., 0.5, 0.1, 1.), (40., 0.5, 0.1, 1.)];
        let records = vec![
            data_record(&pair, true),
            data_record(&pair[..1], true),
            data_record(&collinear, true),
        ];
        let results = run(&cfg, records);
        assert_eq!(results.cutflow.selected, 1);
        assert_eq!(results.cutflow.failed_dimuon_candidates, 1);
        assert_eq!(results.cutflow.failed_dimuon_mass, 1);

        let raw = results.histograms.get("hDilepton_org_mass_after").unwrap();
        let corrected = results.histograms.get("hDilepton_rocco_mass_after").unwrap();
        assert_eq!(raw.entries(), 1);
        assert_relative_eq!(raw.total(), corrected.total());
    }

    #[test]
    fn merging_shards() {
        let cfg = configuration(false, CorrectionToggles::default());
        let mut first = run(&cfg, vec![data_record(&[(60., 0.5, 0.1, 1.)], true)]);
        let second = run(&cfg, vec![data_record(&[(60., 0.5, 0.1, 1.)], false)]);
        first.merge(second).unwrap();
        assert_eq!(first.cutflow.processed, 2);
        assert_eq!(first.cutflow.selected, 1);
        assert_eq!(first.cutflow.failed_trigger, 1);
        assert_eq!(first.sum_of_weights, 2.);
        assert_eq!(first.histograms.get("hNPV").unwrap().entries(), 2);
        let rows = first.cutflow.rows(Channel::SingleMuon);
        assert_eq!(rows.first(), Some(&("processed", 2)));
        assert_eq!(rows.last(), Some(&("selected", 1)));
    }
}
