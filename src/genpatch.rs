//! Generator-level reconstruction of the W boson and sample patching
//!
//! A single pass over the generator particles finds the charged lepton and
//! the neutrino produced by the hard process, rebuilds the boson from them,
//! and looks for the muon and muon neutrino of a W → τν → μννν chain. The
//! outcome decides whether the event belongs to the sample being processed
//! (mass and HT window) and whether it contains a W decaying to a muon
//! (directly or through a tau).

use crate::{
    genpart::GenParticle,
    momentum::{zero, Kinematics, Momentum},
    numeric::Float,
    sample::{PatchWindow, SampleCategory},
};

/// Counters and four-momenta collected while scanning generator particles
#[derive(Clone, Debug, PartialEq)]
pub struct GenBosonScan {
    /// Last hard-process charged lepton seen
    lepton: Momentum,

    /// Last hard-process neutrino seen
    neutrino: Momentum,

    /// Sum of the above, once both have been seen
    boson: Momentum,

    /// Sample is an off-shell W → τν sample
    offshell_tau: bool,

    pub found_lepton: u32,
    pub found_neutrino: u32,
    pub found_muon: u32,
    pub found_tau: u32,
    pub found_muon_neutrino: u32,
    pub found_tau_neutrino: u32,
    pub found_boson: u32,
    pub boson_to_muon: u32,
    pub muon_from_tau: u32,
    pub muon_neutrino_from_tau: u32,
    pub tau_chain_to_muon: u32,
}

/// Departures from the expected generator-level multiplicities
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MultiplicityAnomalies {
    /// Not exactly one lepton and one neutrino from the boson
    pub boson_daughters: bool,

    /// More than one muon or muon neutrino from the tau decay
    pub tau_daughters: bool,
}

impl GenBosonScan {
    fn new(offshell_tau: bool) -> Self {
        Self {
            lepton: zero(),
            neutrino: zero(),
            boson: zero(),
            offshell_tau,
            found_lepton: 0,
            found_neutrino: 0,
            found_muon: 0,
            found_tau: 0,
            found_muon_neutrino: 0,
            found_tau_neutrino: 0,
            found_boson: 0,
            boson_to_muon: 0,
            muon_from_tau: 0,
            muon_neutrino_from_tau: 0,
            tau_chain_to_muon: 0,
        }
    }

    /// Scan the generator particles of an event, in record order
    ///
    /// `window` is the patching window of the sample, if it has one.
    pub fn scan(particles: &[GenParticle], window: Option<&PatchWindow>) -> Self {
        let offshell_tau = window.map_or(false, |w| w.category == SampleCategory::OffshellTau);
        let mut scan = Self::new(offshell_tau);
        for particle in particles {
            scan.visit(particle);
        }
        scan
    }

    fn visit(&mut self, particle: &GenParticle) {
        let hard = particle.is_prompt_hard_process();
        let qualifies = if particle.is_lepton() && hard {
            self.lepton = *particle.p4();
            self.found_lepton += 1;
            self.found_muon += u32::from(particle.is_muon());
            self.found_tau += u32::from(particle.is_tau());
            true
        } else if particle.is_neutrino() && hard {
            self.neutrino = *particle.p4();
            self.found_neutrino += 1;
            self.found_muon_neutrino += u32::from(particle.is_muon_neutrino());
            self.found_tau_neutrino += u32::from(particle.is_tau_neutrino());
            true
        } else {
            false
        };

        // Only the last lepton/neutrino pair survives
        if qualifies && self.found_lepton > 0 && self.found_neutrino > 0 {
            self.boson = self.lepton + self.neutrino;
            self.found_boson += 1;
            if self.found_muon > 0 && self.found_muon_neutrino > 0 {
                self.boson_to_muon += 1;
            }
        }

        if self.tau_candidate() && particle.flags.is_direct_prompt_tau_decay_product() {
            self.muon_from_tau += u32::from(particle.is_muon());
            self.muon_neutrino_from_tau += u32::from(particle.is_muon_neutrino());
        }
        if self.muon_from_tau > 0 && self.muon_neutrino_from_tau > 0 {
            self.tau_chain_to_muon += 1;
        }
    }

    /// Truth that the boson may have decayed to a tau
    fn tau_candidate(&self) -> bool {
        self.found_tau > 0 || self.found_tau_neutrino > 0 || self.offshell_tau
    }

    /// Reconstructed boson, if both of its daughters were found
    pub fn boson(&self) -> Option<&Momentum> {
        (self.found_boson > 0).then_some(&self.boson)
    }

    /// Boson mass, 0 if no boson was found
    pub fn boson_mass(&self) -> Float {
        self.boson.m()
    }

    /// Truth that the event lies inside the sample's window
    pub fn passes_window(&self, window: &PatchWindow, ht: Float) -> bool {
        window.accepts(self.boson_mass(), ht)
    }

    /// Truth that the boson decayed to a muon, directly or through a tau
    pub fn passes_muon_filter(&self) -> bool {
        self.boson_to_muon > 0 || self.tau_chain_to_muon > 0
    }

    /// Check the daughter multiplicities, logging what looks wrong
    pub fn check_multiplicities(&self, event_index: u64) -> MultiplicityAnomalies {
        let mut anomalies = MultiplicityAnomalies::default();
        if self.found_lepton != 1 || self.found_neutrino != 1 {
            tracing::error!(
                "Event {event_index}: expected one lepton and one neutrino from the W, \
                 found {} and {}",
                self.found_lepton,
                self.found_neutrino
            );
            anomalies.boson_daughters = true;
        }
        if self.tau_candidate() && (self.muon_from_tau > 1 || self.muon_neutrino_from_tau > 1) {
            tracing::error!(
                "Event {event_index}: found {} muons and {} muon neutrinos from the tau decay",
                self.muon_from_tau,
                self.muon_neutrino_from_tau
            );
            anomalies.tau_daughters = true;
        }
        anomalies
    }
}
