//! Counting of non-fatal data conditions
//!
//! Some conditions do not stop the event loop but may bias the results if
//! they happen often, such as a calibration query outside of its tabulated
//! range. Each occurrence is logged where it happens and counted here, so that
//! the totals can be reviewed at the end of the run.

use serde::Serialize;

use std::{collections::BTreeMap, fmt};

/// Kind of non-fatal condition
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Diagnostic {
    /// True interaction count outside of the pileup profile, weight set to 0
    PileupOutOfRange,

    /// Not exactly one lepton and one neutrino from the generator W
    GenBosonMultiplicity,

    /// More than one muon or muon neutrino from the generator tau decay
    GenTauChainMultiplicity,

    /// Generator particle with PDG id 0
    InvalidPdgId,

    /// Muon selected without its momentum scale factor
    MissingMomentumScale,
}
//
impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Diagnostic::PileupOutOfRange => "pileup weight out of range",
            Diagnostic::GenBosonMultiplicity => "unexpected W daughter multiplicity",
            Diagnostic::GenTauChainMultiplicity => "unexpected tau daughter multiplicity",
            Diagnostic::InvalidPdgId => "generator particle with PDG id 0",
            Diagnostic::MissingMomentumScale => "muon without momentum scale factor",
        })
    }
}

/// Occurrence counts of each diagnostic
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    counts: BTreeMap<Diagnostic, u64>,
}
//
impl Diagnostics {
    /// Start with no occurrence
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence
    pub fn record(&mut self, what: Diagnostic) {
        self.record_many(what, 1);
    }

    /// Record several occurrences at once
    pub fn record_many(&mut self, what: Diagnostic, count: u64) {
        if count > 0 {
            *self.counts.entry(what).or_insert(0) += count;
        }
    }

    /// Number of occurrences of a diagnostic
    pub fn count(&self, what: Diagnostic) -> u64 {
        self.counts.get(&what).copied().unwrap_or(0)
    }

    /// Truth that nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Recorded diagnostics with their counts
    pub fn iter(&self) -> impl Iterator<Item = (Diagnostic, u64)> + '_ {
        self.counts.iter().map(|(&what, &count)| (what, count))
    }

    /// Add the counts of another shard
    pub fn merge(&mut self, other: Diagnostics) {
        for (what, count) in other.counts {
            self.record_many(what, count);
        }
    }
}
