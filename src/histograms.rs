//! Weighted histograms and the declarative table of analysis histograms
//!
//! Every histogram of the analysis is described by a name, a binning, the
//! stage of the event loop at which it is filled, and a function extracting
//! the filled value from a per-event summary (`EventView`). The event loop
//! only ever asks for "fill everything belonging to this stage".

use crate::{
    calib::axis::{Axis, BinPosition},
    config::Channel,
    met::MetValues,
    momentum::{delta_phi, transverse_mass, Kinematics, Momentum},
    numeric::{reals::consts::PI, Float},
    Result,
};

use eyre::ensure;
use serde::Serialize;

use std::sync::Arc;

/// Weighted 1D histogram with underflow and overflow bins
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Histogram {
    /// Bin edges
    #[serde(flatten)]
    axis: Axis,

    /// Sum of weights, index 0 is the underflow and N+1 the overflow
    sumw: Vec<Float>,

    /// Sum of squared weights, same layout
    sumw2: Vec<Float>,

    /// Number of fill calls
    entries: u64,
}
//
impl Histogram {
    /// Empty histogram on a given axis
    pub fn new(axis: Axis) -> Self {
        let num_slots = axis.num_bins() + 2;
        Self {
            axis,
            sumw: vec![0.; num_slots],
            sumw2: vec![0.; num_slots],
            entries: 0,
        }
    }

    /// Add a weighted value
    pub fn fill(&mut self, x: Float, weight: Float) {
        let slot = match self.axis.locate(x) {
            BinPosition::Underflow => 0,
            BinPosition::Bin(bin) => bin + 1,
            BinPosition::Overflow => self.axis.num_bins() + 1,
        };
        self.sumw[slot] += weight;
        self.sumw2[slot] += weight * weight;
        self.entries += 1;
    }

    /// Binning of this histogram
    pub fn axis(&self) -> &Axis {
        &self.axis
    }

    /// Sum of weights of regular bin `bin`
    pub fn bin_content(&self, bin: usize) -> Float {
        self.sumw[bin + 1]
    }

    /// Sum of weights below the axis
    pub fn underflow(&self) -> Float {
        self.sumw[0]
    }

    /// Sum of weights above the axis
    pub fn overflow(&self) -> Float {
        self.sumw[self.sumw.len() - 1]
    }

    /// Sum of weights over all bins, under/overflow included
    pub fn total(&self) -> Float {
        self.sumw.iter().sum()
    }

    /// Sum of squared weights over all bins, under/overflow included
    pub fn total_sumw2(&self) -> Float {
        self.sumw2.iter().sum()
    }

    /// Number of fill calls
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Add the contents of a histogram with the same binning
    pub fn merge(&mut self, other: &Histogram) -> Result<()> {
        ensure!(
            self.axis == other.axis,
            "Cannot merge histograms with different binnings"
        );
        for (acc, x) in self.sumw.iter_mut().zip(&other.sumw) {
            *acc += x;
        }
        for (acc, x) in self.sumw2.iter_mut().zip(&other.sumw2) {
            *acc += x;
        }
        self.entries += other.entries;
        Ok(())
    }
}

/// Binnings used by the analysis histograms
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Binning {
    /// Momenta, energies and masses: 3000 bins on [0, 3000)
    Momentum,

    /// Azimuth: 72 bins on [-π, π)
    Phi,

    /// Pseudorapidity: 50 bins on [-2.5, 2.5)
    Eta,

    /// Muon mass: 1000 bins on [0, 1)
    MuonMass,

    /// Vertex and interaction counts: 100 bins on [0, 100)
    Count,
}
//
impl Binning {
    /// Axis of this binning
    pub fn axis(self) -> Axis {
        match self {
            Binning::Momentum => Axis::uniform(3000, 0., 3000.),
            Binning::Phi => Axis::uniform(72, -PI, PI),
            Binning::Eta => Axis::uniform(50, -2.5, 2.5),
            Binning::MuonMass => Axis::uniform(1000, 0., 1.),
            Binning::Count => Axis::uniform(100, 0., 100.),
        }
    }
}

/// Point of the event loop where a histogram is filled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Right after the corrections, before generator patching
    Pileup,

    /// After generator patching, before generator muon filtering
    Patched,

    /// After muon filtering, before the event selection
    BeforeSelection,

    /// Selected events only
    AfterSelection,
}
//
impl Stage {
    /// Truth that histograms of this stage have a selected-events twin
    fn has_twin(self) -> bool {
        matches!(self, Stage::Pileup | Stage::BeforeSelection)
    }
}

// ### PER-EVENT SUMMARY ###

/// Pileup counters of simulated events
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PileupCounts {
    /// Number of pileup interactions
    pub n_pu: Float,

    /// Mean number of interactions of the bunch crossing
    pub n_true_int: Float,
}

/// Generator-level content of a simulated event
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GenView {
    /// Reconstructed W boson, if both of its daughters were found
    pub boson: Option<Momentum>,

    /// Sample is the inclusive W sample
    pub inclusive_w: bool,

    /// The boson decayed to a muon, directly or through a tau
    pub boson_to_muon: bool,

    /// Highest-pT generator muon
    pub leading_muon: Option<Momentum>,

    /// Highest-pT generator neutrino
    pub leading_neutrino: Option<Momentum>,

    /// Generator MET as (pt, phi)
    pub met: Option<(Float, Float)>,
}

/// Dimuon mass before and after the momentum scale correction
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DimuonMasses {
    pub raw: Float,
    pub corrected: Float,
}

/// Everything the histograms need to know about an event
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventView {
    /// Number of reconstructed primary vertices
    pub npv: Float,

    /// Pileup counters, simulation only
    pub pileup: Option<PileupCounts>,

    /// Generator-level content, simulation only
    pub gen: Option<GenView>,

    /// Scalar sum of parton pT, inclusive and HT-binned W samples only
    pub lhe_ht: Option<Float>,

    /// Effective four-momentum of the leading tight muon
    pub leading_muon: Option<Momentum>,

    /// PUPPI MET
    pub puppi_met: MetValues,

    /// Particle-flow MET
    pub pf_met: MetValues,

    /// XY-corrected particle-flow MET as (pt, phi)
    pub pf_met_corr: (Float, Float),

    /// Leading dimuon pair, dimuon channel only
    pub dimuon: Option<DimuonMasses>,
}
//
impl EventView {
    /// Azimuthal difference and transverse mass of the leading muon and a MET
    fn muon_met(&self, (met_pt, met_phi): (Float, Float)) -> Option<(Float, Float)> {
        self.leading_muon.map(|muon| {
            let d_phi = delta_phi(met_phi, muon.phi());
            (d_phi, transverse_mass(muon.pt(), met_pt, d_phi))
        })
    }
}

// ### HISTOGRAM TABLE ###

/// Value extracted from an event, `None` meaning "do not fill"
type Extractor = Arc<dyn Fn(&EventView) -> Option<Float> + Send + Sync>;

/// Description of one analysis histogram
#[derive(Clone)]
pub struct HistogramSpec {
    /// Output name
    pub name: String,

    /// Bins
    pub binning: Binning,

    /// When it is filled
    pub stage: Stage,

    /// What it is filled with
    value: Extractor,
}
//
impl HistogramSpec {
    fn new(
        name: impl Into<String>,
        binning: Binning,
        stage: Stage,
        value: impl Fn(&EventView) -> Option<Float> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            binning,
            stage,
            value: Arc::new(value),
        }
    }

    /// Same histogram, filled for selected events only
    fn twin(&self) -> Self {
        Self {
            name: format!("{}_after", self.name),
            stage: Stage::AfterSelection,
            ..self.clone()
        }
    }
}

/// Four-momentum coordinates that get histogrammed
#[derive(Clone, Copy, Debug)]
enum Component {
    Pt,
    Eta,
    Phi,
    Mass,
}
//
impl Component {
    fn suffix(self) -> &'static str {
        match self {
            Component::Pt => "pT",
            Component::Eta => "eta",
            Component::Phi => "phi",
            Component::Mass => "mass",
        }
    }

    fn of(self, p: &Momentum) -> Float {
        match self {
            Component::Pt => p.pt(),
            Component::Eta => p.eta(),
            Component::Phi => p.phi(),
            Component::Mass => p.m(),
        }
    }

    fn binning(self, mass_binning: Binning) -> Binning {
        match self {
            Component::Pt => Binning::Momentum,
            Component::Eta => Binning::Eta,
            Component::Phi => Binning::Phi,
            Component::Mass => mass_binning,
        }
    }
}

/// Histograms of some coordinates of a four-momentum
fn momentum_specs(
    prefix: &str,
    stage: Stage,
    components: &[Component],
    mass_binning: Binning,
    source: fn(&EventView) -> Option<Momentum>,
) -> Vec<HistogramSpec> {
    components
        .iter()
        .map(|&c| {
            HistogramSpec::new(
                format!("{prefix}_{}", c.suffix()),
                c.binning(mass_binning),
                stage,
                move |v: &EventView| source(v).map(|p| c.of(&p)),
            )
        })
        .collect()
}

/// Histograms of (pt, phi[, sumEt]) of a MET
fn met_specs(
    prefix: &str,
    stage: Stage,
    with_sum_et: bool,
    source: fn(&EventView) -> Option<MetValues>,
) -> Vec<HistogramSpec> {
    let mut specs = vec![
        HistogramSpec::new(format!("{prefix}_pT"), Binning::Momentum, stage, move |v| {
            source(v).map(|met| met.pt)
        }),
        HistogramSpec::new(format!("{prefix}_phi"), Binning::Phi, stage, move |v| {
            source(v).map(|met| met.phi)
        }),
    ];
    if with_sum_et {
        specs.push(HistogramSpec::new(
            format!("{prefix}_sumET"),
            Binning::Momentum,
            stage,
            move |v| source(v).map(|met| met.sum_et),
        ));
    }
    specs
}

/// Azimuthal difference and transverse mass of the leading muon with a MET
fn muon_met_specs(
    delta_phi_name: &str,
    mt_name: &str,
    stage: Stage,
    source: fn(&EventView) -> (Float, Float),
) -> Vec<HistogramSpec> {
    vec![
        HistogramSpec::new(delta_phi_name, Binning::Phi, stage, move |v| {
            v.muon_met(source(v)).map(|(d_phi, _)| d_phi)
        }),
        HistogramSpec::new(mt_name, Binning::Momentum, stage, move |v| {
            v.muon_met(source(v)).map(|(_, mt)| mt)
        }),
    ]
}

/// Histograms filled before generator patching
fn pileup_specs() -> Vec<HistogramSpec> {
    use Stage::Pileup;
    vec![
        HistogramSpec::new("hNPV", Binning::Count, Pileup, |v| Some(v.npv)),
        HistogramSpec::new("hNPU", Binning::Count, Pileup, |v| v.pileup.map(|p| p.n_pu)),
        HistogramSpec::new("hNTrueInt", Binning::Count, Pileup, |v| {
            v.pileup.map(|p| p.n_true_int)
        }),
    ]
}

/// Table of the single-muon channel
fn single_muon_specs() -> Vec<HistogramSpec> {
    use Component::*;
    use Stage::*;
    const FOUR: [Component; 4] = [Pt, Eta, Phi, Mass];
    const THREE: [Component; 3] = [Pt, Phi, Eta];

    let mut first = pileup_specs();
    first.extend(momentum_specs("hGen_W", Patched, &FOUR, Binning::Momentum, |v| {
        v.gen.as_ref().filter(|g| g.inclusive_w).and_then(|g| g.boson)
    }));
    first.extend(momentum_specs("hGen_WToMuNu", BeforeSelection, &FOUR, Binning::Momentum, |v| {
        v.gen.as_ref().filter(|g| g.boson_to_muon).and_then(|g| g.boson)
    }));
    first.extend(momentum_specs("hGen_Muon", BeforeSelection, &THREE, Binning::Momentum, |v| {
        v.gen.as_ref().and_then(|g| g.leading_muon)
    }));
    first.extend(momentum_specs("hGen_Nu", BeforeSelection, &THREE, Binning::Momentum, |v| {
        v.gen.as_ref().and_then(|g| g.leading_neutrino)
    }));
    first.extend(met_specs("hGen_MET", BeforeSelection, false, |v| {
        let (pt, phi) = v.gen.as_ref()?.met?;
        Some(MetValues { pt, phi, sum_et: 0. })
    }));
    first.push(HistogramSpec::new("hLHE_HT", Binning::Momentum, BeforeSelection, |v| v.lhe_ht));
    first.extend(momentum_specs("hMuon", BeforeSelection, &[Pt, Phi, Eta, Mass], Binning::MuonMass, |v| {
        v.leading_muon
    }));
    first.extend(met_specs("hMET", BeforeSelection, true, |v| Some(v.puppi_met)));
    first.extend(met_specs("hPFMET", BeforeSelection, true, |v| Some(v.pf_met)));
    first.extend(met_specs("hPFMET_corr", BeforeSelection, false, |v| {
        let (pt, phi) = v.pf_met_corr;
        Some(MetValues { pt, phi, sum_et: 0. })
    }));
    first.extend(muon_met_specs("hDeltaPhi_Mu_MET", "hW_MT", BeforeSelection, |v| {
        (v.puppi_met.pt, v.puppi_met.phi)
    }));
    first.extend(muon_met_specs("hDeltaPhi_Mu_PFMET", "hW_MT_PFMET", BeforeSelection, |v| {
        (v.pf_met.pt, v.pf_met.phi)
    }));
    first.extend(muon_met_specs("hDeltaPhi_Mu_PFMET_corr", "hW_MT_PFMET_corr", BeforeSelection, |v| {
        v.pf_met_corr
    }));

    let twins = first
        .iter()
        .filter(|spec| spec.stage.has_twin())
        .map(HistogramSpec::twin)
        .collect::<Vec<_>>();
    first.extend(twins);

    // After selection, the generator boson is shown for every W sample
    first.extend(momentum_specs("hGen_W", AfterSelection, &FOUR, Binning::Momentum, |v| {
        v.gen.as_ref().and_then(|g| g.boson)
    }).into_iter().map(|spec| HistogramSpec {
        name: format!("{}_after", spec.name),
        ..spec
    }));
    first
}

/// Table of the dimuon channel
fn dimuon_specs() -> Vec<HistogramSpec> {
    use Component::*;
    let mut specs = pileup_specs();
    specs.extend(momentum_specs("hGen_W", Stage::Patched, &[Pt, Eta, Phi, Mass], Binning::Momentum, |v| {
        v.gen.as_ref().filter(|g| g.inclusive_w).and_then(|g| g.boson)
    }));
    specs.push(HistogramSpec::new(
        "hDilepton_org_mass_after",
        Binning::Momentum,
        Stage::AfterSelection,
        |v| v.dimuon.map(|m| m.raw),
    ));
    specs.push(HistogramSpec::new(
        "hDilepton_rocco_mass_after",
        Binning::Momentum,
        Stage::AfterSelection,
        |v| v.dimuon.map(|m| m.corrected),
    ));
    specs
}

/// Every histogram of an event loop
#[derive(Clone)]
pub struct HistogramSet {
    /// Histogram descriptions
    specs: Vec<HistogramSpec>,

    /// Histograms, in the order of `specs`
    histograms: Vec<Histogram>,
}
//
impl std::fmt::Debug for HistogramSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.iter().map(|(name, histogram)| (name, histogram.entries())))
            .finish()
    }
}
//
impl HistogramSet {
    /// Empty histograms of a channel
    pub fn for_channel(channel: Channel) -> Self {
        let specs = match channel {
            Channel::SingleMuon => single_muon_specs(),
            Channel::Dimuon => dimuon_specs(),
        };
        let histograms = specs
            .iter()
            .map(|spec| Histogram::new(spec.binning.axis()))
            .collect();
        Self { specs, histograms }
    }

    /// Fill every histogram of a stage
    pub fn fill_stage(&mut self, stage: Stage, view: &EventView, weight: Float) {
        for (spec, histogram) in self.specs.iter().zip(self.histograms.iter_mut()) {
            if spec.stage != stage {
                continue;
            }
            if let Some(x) = (spec.value)(view) {
                histogram.fill(x, weight);
            }
        }
    }

    /// Look up a histogram by name
    pub fn get(&self, name: &str) -> Option<&Histogram> {
        self.specs
            .iter()
            .position(|spec| spec.name == name)
            .map(|idx| &self.histograms[idx])
    }

    /// Histograms with their names, in table order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Histogram)> + '_ {
        self.specs
            .iter()
            .map(|spec| spec.name.as_str())
            .zip(self.histograms.iter())
    }

    /// Number of histograms
    pub fn len(&self) -> usize {
        self.histograms.len()
    }

    /// Add the histograms of another shard of the same channel
    pub fn merge(&mut self, other: &HistogramSet) -> Result<()> {
        ensure!(
            self.specs.len() == other.specs.len(),
            "Cannot merge histogram sets of different channels"
        );
        for ((spec, histogram), (other_spec, other_histogram)) in self
            .specs
            .iter()
            .zip(self.histograms.iter_mut())
            .zip(other.specs.iter().zip(&other.histograms))
        {
            ensure!(
                spec.name == other_spec.name,
                "Histogram {} does not match {}",
                spec.name,
                other_spec.name
            );
            histogram.merge(other_histogram)?;
        }
        Ok(())
    }
}
