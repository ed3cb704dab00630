//! This module defines the per-event storage of physics objects
//!
//! Objects are rebuilt from scratch for every record. Building and selection
//! are one-shot operations between two resets: repeating them is refused with
//! a warning, and asking for selected objects before selection has run is an
//! error that yields nothing.

use crate::{
    electron::{build_electrons, Electron},
    genpart::{build_gen_particles, GenParticle},
    met::MetSnapshot,
    muon::{build_muons, Muon},
    record::EventRecord,
    selection::{SelectionProfile, SelectionTier},
    Result,
};

/// Physics objects of the event being processed
#[derive(Debug, Default)]
pub struct EventObjects {
    /// Objects were built from a record
    built: bool,

    /// Object selection has run
    selected: bool,

    /// Muons, in record order
    pub muons: Vec<Muon>,

    /// Electrons, in record order
    pub electrons: Vec<Electron>,

    /// Generator particles (simulation only), in record order
    pub gen_particles: Vec<GenParticle>,

    /// Missing transverse energy
    pub met: MetSnapshot,
}
//
impl EventObjects {
    /// Set up empty storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything about the previous event
    pub fn reset(&mut self) {
        self.built = false;
        self.selected = false;
        self.muons.clear();
        self.electrons.clear();
        self.gen_particles.clear();
        self.met = MetSnapshot::default();
    }

    /// Build all objects from a record
    ///
    /// Returns the number of generator particles with an invalid PDG id.
    ///
    pub fn build(
        &mut self,
        record: &EventRecord,
        is_mc: bool,
        profile: SelectionProfile,
    ) -> Result<usize> {
        if self.built {
            tracing::warn!("Event objects are already built, ignoring rebuild request");
            return Ok(0);
        }
        self.muons = build_muons(record, profile)?;
        self.electrons = build_electrons(record)?;
        self.met = MetSnapshot::from_record(record, is_mc)?;
        let mut invalid_pdg = 0;
        if is_mc {
            let (particles, invalid) = build_gen_particles(record)?;
            self.gen_particles = particles;
            invalid_pdg = invalid;
        }
        self.built = true;
        Ok(invalid_pdg)
    }

    /// Truth that objects were built since the last reset
    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Truth that object selection has run since the last reset
    pub fn is_selected(&self) -> bool {
        self.selected
    }

    /// Flag the selection as done, returning false if it already was
    pub(crate) fn mark_selected(&mut self) -> bool {
        !std::mem::replace(&mut self.selected, true)
    }

    // ### SELECTED OBJECTS ###

    /// Check that selection has run before handing out selected objects
    fn selection_ready(&self, what: &str) -> bool {
        if !self.selected {
            tracing::error!("Requested {what} before object selection, returning none");
        }
        self.selected
    }

    /// Indices of the muons in a given tier
    fn muon_indices(&self, tier: SelectionTier, what: &str) -> Vec<usize> {
        if !self.selection_ready(what) {
            return Vec::new();
        }
        self.muons
            .iter()
            .enumerate()
            .filter(|(_, m)| m.tier() == Some(tier))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Tight muons, in record order
    pub fn tight_muons(&self) -> Vec<&Muon> {
        self.muon_indices(SelectionTier::Tight, "tight muons")
            .into_iter()
            .map(|idx| &self.muons[idx])
            .collect()
    }

    /// Loose (and not tight) muons, in record order
    pub fn loose_muons(&self) -> Vec<&Muon> {
        self.muon_indices(SelectionTier::Loose, "loose muons")
            .into_iter()
            .map(|idx| &self.muons[idx])
            .collect()
    }

    /// Indices of the tight muons, by decreasing effective pT
    pub fn tight_muons_by_pt(&self) -> Vec<usize> {
        let mut indices = self.muon_indices(SelectionTier::Tight, "tight muons");
        indices.sort_by(|&a, &b| self.muons[b].pt().total_cmp(&self.muons[a].pt()));
        indices
    }

    /// Index of the highest-pT tight muon
    pub fn leading_tight_muon(&self) -> Option<usize> {
        self.tight_muons_by_pt().first().copied()
    }

    /// Loose electrons, in record order
    pub fn loose_electrons(&self) -> Vec<&Electron> {
        if !self.selection_ready("loose electrons") {
            return Vec::new();
        }
        self.electrons
            .iter()
            .filter(|e| e.is_loose() == Some(true))
            .collect()
    }

    /// Generator-level muons of either charge
    pub fn gen_muons(&self) -> impl Iterator<Item = &GenParticle> {
        self.gen_particles.iter().filter(|p| p.is_muon())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{momentum::Kinematics, muon::tests::muon_record, selection::select_objects};

    fn record() -> EventRecord {
        muon_record(&[(60., 0.5, 0.1, 1.), (12., 1.0, 2.0, 1.)])
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
    }

    #[test]
    fn rebuild_without_reset_is_refused() {
        let mut objects = EventObjects::new();
        objects.build(&record(), false, SelectionProfile::Standard).unwrap();
        assert_eq!(objects.muons.len(), 2);

        let other = muon_record(&[(5., 0., 0., 1.)]);
        objects.build(&other, false, SelectionProfile::Standard).unwrap();
        assert_eq!(objects.muons.len(), 2);
        assert_eq!(objects.muons[0].pt(), objects.muons[0].raw().pt());

        objects.reset();
        assert!(!objects.is_built());
        assert!(objects.muons.is_empty());
    }

    #[test]
    fn selected_objects_need_selection() {
        let mut objects = EventObjects::new();
        objects.build(&record(), false, SelectionProfile::Standard).unwrap();
        assert!(objects.tight_muons().is_empty());
        assert!(objects.leading_tight_muon().is_none());

        select_objects(&mut objects, SelectionProfile::Standard, false);
        assert_eq!(objects.tight_muons().len(), 1);
        assert_eq!(objects.loose_muons().len(), 1);
        assert_eq!(objects.leading_tight_muon(), Some(0));
        assert!(objects.loose_electrons().is_empty());
    }
}
