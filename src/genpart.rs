//! Generator-level particles
//!
//! Simulated events carry the full generator history as a flat particle list in
//! which each particle points to its mother by index.

use crate::{
    momentum::{from_pt_eta_phi_m, Kinematics, Momentum},
    numeric::Float,
    record::EventRecord,
    Result,
};

/// Generator bookkeeping bits
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatusFlags(pub u16);
//
impl StatusFlags {
    pub const PROMPT: u16 = 1 << 0;
    pub const DIRECT_PROMPT_TAU_DECAY_PRODUCT: u16 = 1 << 5;
    pub const HARD_PROCESS: u16 = 1 << 7;
    pub const FROM_HARD_PROCESS: u16 = 1 << 8;

    fn has(self, bit: u16) -> bool {
        self.0 & bit != 0
    }

    pub fn is_prompt(self) -> bool {
        self.has(Self::PROMPT)
    }

    pub fn is_direct_prompt_tau_decay_product(self) -> bool {
        self.has(Self::DIRECT_PROMPT_TAU_DECAY_PRODUCT)
    }

    pub fn is_hard_process(self) -> bool {
        self.has(Self::HARD_PROCESS)
    }

    pub fn is_from_hard_process(self) -> bool {
        self.has(Self::FROM_HARD_PROCESS)
    }
}

/// Snapshot of a particle's mother, resolved once at construction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MotherRef {
    /// Position of the mother in the same collection
    pub index: usize,

    /// Mother PDG id
    pub pdg_id: i32,

    /// Mother generator status
    pub status: i32,
}

/// A generator-level particle
#[derive(Clone, Debug)]
pub struct GenParticle {
    /// Four-momentum
    p4: Momentum,

    /// Position in the record arrays
    pub index: usize,

    /// Electric charge inferred from the PDG id sign (leptons only)
    pub charge: i32,

    /// PDG particle id
    pub pdg_id: i32,

    /// Generator status code
    pub status: i32,

    /// Bookkeeping bits
    pub flags: StatusFlags,

    /// Mother particle, `None` for the initial state
    pub mother: Option<MotherRef>,
}
//
impl GenParticle {
    /// Build a particle without mother information
    pub fn new(p4: Momentum, index: usize, pdg_id: i32, status: i32, flags: StatusFlags) -> Self {
        Self {
            p4,
            index,
            charge: lepton_charge(pdg_id),
            pdg_id,
            status,
            flags,
            mother: None,
        }
    }

    /// Four-momentum
    pub fn p4(&self) -> &Momentum {
        &self.p4
    }

    /// Transverse momentum
    pub fn pt(&self) -> Float {
        self.p4.pt()
    }

    fn abs_pdg(&self) -> i32 {
        self.pdg_id.abs()
    }

    /// Charged lepton (e, μ, τ)
    pub fn is_lepton(&self) -> bool {
        matches!(self.abs_pdg(), 11 | 13 | 15)
    }

    /// Neutrino of any flavour
    pub fn is_neutrino(&self) -> bool {
        matches!(self.abs_pdg(), 12 | 14 | 16)
    }

    pub fn is_muon(&self) -> bool {
        self.abs_pdg() == 13
    }

    pub fn is_tau(&self) -> bool {
        self.abs_pdg() == 15
    }

    pub fn is_muon_neutrino(&self) -> bool {
        self.abs_pdg() == 14
    }

    pub fn is_tau_neutrino(&self) -> bool {
        self.abs_pdg() == 16
    }

    /// Prompt particle from the hard scattering itself
    pub fn is_prompt_hard_process(&self) -> bool {
        self.flags.is_prompt() && self.flags.is_from_hard_process() && self.flags.is_hard_process()
    }
}

/// Charge convention for leptons: particles (positive PDG id) are negative
///
/// PDG id 0 is not a particle; it gets charge 0 instead of a division by zero.
fn lepton_charge(pdg_id: i32) -> i32 {
    -pdg_id.signum()
}

/// Read all generator particles of an event, in record order
///
/// Returns the particles along with the number of PDG id 0 entries found.
pub fn build_gen_particles(record: &EventRecord) -> Result<(Vec<GenParticle>, usize)> {
    let n_part = record.count("nGenPart")?;
    let pdg_ids = (0..n_part)
        .map(|idx| record.array_int("GenPart_pdgId", idx))
        .collect::<Result<Vec<_>>>()?;
    let statuses = (0..n_part)
        .map(|idx| record.array_int("GenPart_status", idx))
        .collect::<Result<Vec<_>>>()?;

    let mut invalid_pdg = 0;
    let mut particles = Vec::with_capacity(n_part);
    for idx in 0..n_part {
        let p4 = from_pt_eta_phi_m(
            record.array_at("GenPart_pt", idx)?,
            record.array_at("GenPart_eta", idx)?,
            record.array_at("GenPart_phi", idx)?,
            record.array_at("GenPart_mass", idx)?,
        );
        let flags = StatusFlags(record.array_at("GenPart_statusFlags", idx)? as u16);
        if pdg_ids[idx] == 0 {
            tracing::warn!("Generator particle {idx} has PDG id 0, its charge is set to 0");
            invalid_pdg += 1;
        }
        let mut particle = GenParticle::new(p4, idx, pdg_ids[idx], statuses[idx], flags);

        // Negative or dangling mother indices mean "no mother"
        let mother_idx = record.array_int("GenPart_genPartIdxMother", idx)?;
        particle.mother = usize::try_from(mother_idx)
            .ok()
            .filter(|&m| m < n_part)
            .map(|m| MotherRef {
                index: m,
                pdg_id: pdg_ids[m],
                status: statuses[m],
            });
        particles.push(particle);
    }
    Ok((particles, invalid_pdg))
}

/// Highest-pT particle among those matching a predicate
pub fn leading<'a>(
    particles: &'a [GenParticle],
    pred: impl Fn(&GenParticle) -> bool,
) -> Option<&'a GenParticle> {
    particles
        .iter()
        .filter(|p| pred(p))
        .max_by(|a, b| a.pt().total_cmp(&b.pt()))
}
