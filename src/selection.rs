//! Object selection
//!
//! Muons are sorted into tiers by a set of cuts whose values depend on the
//! selection profile chosen at startup. Electrons only have a loose tier, used
//! as a veto.

use crate::{
    electron::{CutBasedId, Electron},
    event::EventObjects,
    momentum::Kinematics,
    muon::Muon,
    numeric::Float,
    Result,
};

use eyre::bail;

use std::{fmt, str::FromStr};

/// Which of the two muon selection regimes is active
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionProfile {
    /// Isolated muons around the W peak: tight ID, PF isolation
    Standard,

    /// High-pT muons: tune-P momentum, global high-pT ID, tracker isolation
    HighPt,
}
//
impl SelectionProfile {
    /// Truth that muon momenta are built from the tune-P estimate
    pub fn uses_tune_p(self) -> bool {
        self == SelectionProfile::HighPt
    }

    /// Cut values of the tight tier
    pub fn tight_cuts(self) -> MuonCuts {
        match self {
            SelectionProfile::Standard => MuonCuts {
                min_pt: 30.,
                max_abs_eta: 2.4,
                requirement: MuonRequirement::TightIdPfIso { max_iso: 0.1 },
            },
            SelectionProfile::HighPt => MuonCuts {
                min_pt: 53.,
                max_abs_eta: 2.4,
                requirement: MuonRequirement::HighPtIdTkIso { max_iso: 0.1 },
            },
        }
    }

    /// Cut values of the loose tier
    pub fn loose_cuts(self) -> MuonCuts {
        match self {
            SelectionProfile::Standard => MuonCuts {
                min_pt: 10.,
                max_abs_eta: 2.4,
                requirement: MuonRequirement::GlobalOrTrackerPf,
            },
            SelectionProfile::HighPt => MuonCuts {
                min_pt: 25.,
                max_abs_eta: 2.4,
                requirement: MuonRequirement::LooseId,
            },
        }
    }
}
//
impl FromStr for SelectionProfile {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "standard" => Ok(SelectionProfile::Standard),
            "highpt" => Ok(SelectionProfile::HighPt),
            other => bail!("Unknown selection profile {other:?} (expected standard or highpt)"),
        }
    }
}
//
impl fmt::Display for SelectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SelectionProfile::Standard => "standard",
            SelectionProfile::HighPt => "highpt",
        })
    }
}

/// Outcome of muon selection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionTier {
    Tight,
    /// Passes the loose cuts but not the tight ones
    Loose,
    Rejected,
}

/// Identification and isolation part of a muon tier
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MuonRequirement {
    /// Tight ID bit and PF relative isolation (cone 0.4, all components)
    TightIdPfIso { max_iso: Float },

    /// Global high-pT ID and tracker relative isolation
    HighPtIdTkIso { max_iso: Float },

    /// Global or tracker muon, reconstructed as a PF candidate
    GlobalOrTrackerPf,

    /// Loose ID bit
    LooseId,
}

/// Cuts defining one muon tier
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MuonCuts {
    /// Strict lower bound on the effective transverse momentum
    pub min_pt: Float,

    /// Strict upper bound on |eta|
    pub max_abs_eta: Float,

    /// Identification and isolation
    pub requirement: MuonRequirement,
}
//
impl MuonCuts {
    /// Truth that a muon passes these cuts, using its effective four-momentum
    pub fn accepts(&self, muon: &Muon) -> bool {
        let p4 = muon.p4();
        if p4.pt() <= self.min_pt || p4.eta().abs() >= self.max_abs_eta {
            return false;
        }
        match self.requirement {
            MuonRequirement::TightIdPfIso { max_iso } => {
                muon.id.tight && muon.isolation.pf_rel_iso04_all < max_iso
            }
            MuonRequirement::HighPtIdTkIso { max_iso } => {
                muon.id.glb_high_pt && muon.isolation.tk_rel_iso < max_iso
            }
            MuonRequirement::GlobalOrTrackerPf => {
                (muon.kind.global || muon.kind.tracker) && muon.kind.pf_cand
            }
            MuonRequirement::LooseId => muon.id.loose,
        }
    }
}

/// Sort a muon into its tier
pub fn classify_muon(muon: &Muon, profile: SelectionProfile) -> SelectionTier {
    if profile.tight_cuts().accepts(muon) {
        SelectionTier::Tight
    } else if profile.loose_cuts().accepts(muon) {
        SelectionTier::Loose
    } else {
        SelectionTier::Rejected
    }
}

/// Loose electron predicate, evaluated on the super-cluster pseudorapidity
pub fn is_loose_electron(electron: &Electron) -> bool {
    let abs_eta = electron.sc_eta().abs();
    let in_gap = (1.444..=1.566).contains(&abs_eta);
    electron.pt() > 25. && abs_eta < 2.5 && !in_gap && electron.cut_based >= CutBasedId::Loose
}

/// Run object selection over all muons and electrons of an event
///
/// When the momentum scale correction is enabled, every muon must already
/// carry its scale factor. Muons that do not are still classified using their
/// uncorrected momentum, and their number is returned so that the caller can
/// report it.
///
pub fn select_objects(
    objects: &mut EventObjects,
    profile: SelectionProfile,
    momentum_scale_enabled: bool,
) -> usize {
    if !objects.is_built() {
        tracing::error!("Object selection requested before objects were built");
        return 0;
    }
    if !objects.mark_selected() {
        tracing::warn!("Object selection already ran for this event, ignoring");
        return 0;
    }

    let mut missing_scale = 0;
    for muon in objects.muons.iter_mut() {
        if momentum_scale_enabled && muon.scale_factor().is_none() {
            tracing::error!(
                "Muon {} has no momentum scale factor at selection time",
                muon.index
            );
            missing_scale += 1;
        }
        let tier = classify_muon(muon, profile);
        muon.set_tier(tier);
    }
    for electron in objects.electrons.iter_mut() {
        let loose = is_loose_electron(electron);
        electron.set_loose(loose);
    }
    missing_scale
}
