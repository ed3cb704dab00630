//! Sample identification from the process name
//!
//! Simulated W samples overlap in phase space: the inclusive sample also
//! contains high-HT and high-mass events, which are better described by
//! dedicated samples. The process name tells which sample is being read, and
//! thus which generator-level window its events must fall in to be kept.

use crate::numeric::Float;

/// Simulated W sample families which need generator-level patching
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleCategory {
    /// `WJetsToLNu`: restricted to low boson mass and low HT
    InclusiveW,

    /// `WJetsToLNu_HT-*`: restricted to low boson mass
    BoostedW,

    /// `WToMuNu_M-*`: off-shell W decaying to a muon
    OffshellMuon,

    /// `WToTauNu_M-*`: off-shell W decaying to a tau
    OffshellTau,
}

/// Generator-level window that events of a sample must fall in
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PatchWindow {
    /// Sample family
    pub category: SampleCategory,

    /// Lowest allowed boson mass
    pub mass_low: Float,

    /// Upper boson mass bound
    pub mass_high: Float,

    /// Upper bound on the event HT, inclusive sample only
    pub ht_high: Float,
}
//
impl PatchWindow {
    /// Window of the inclusive sample
    fn inclusive() -> Self {
        Self {
            category: SampleCategory::InclusiveW,
            mass_low: 0.,
            mass_high: 100.,
            ht_high: 100.,
        }
    }

    /// Window of the HT-binned samples
    fn boosted() -> Self {
        Self {
            category: SampleCategory::BoostedW,
            mass_low: 0.,
            mass_high: 100.,
            ht_high: Float::INFINITY,
        }
    }

    /// Window of an off-shell sample generated above `mass_low`
    fn offshell(category: SampleCategory, mass_low: Float) -> Self {
        Self {
            category,
            mass_low,
            mass_high: next_mass_boundary(mass_low),
            ht_high: Float::INFINITY,
        }
    }

    /// Truth that the event HT is needed to evaluate this window
    pub fn needs_ht(&self) -> bool {
        self.category == SampleCategory::InclusiveW
    }

    /// Truth that an event with this boson mass and HT belongs to the sample
    ///
    /// The inclusive and HT-binned samples keep their upper boundary, while the
    /// off-shell samples hand it over to the next sample of the ladder.
    pub fn accepts(&self, boson_mass: Float, ht: Float) -> bool {
        if boson_mass < self.mass_low {
            return false;
        }
        match self.category {
            SampleCategory::InclusiveW => boson_mass <= self.mass_high && ht <= self.ht_high,
            SampleCategory::BoostedW => boson_mass <= self.mass_high,
            SampleCategory::OffshellMuon | SampleCategory::OffshellTau => {
                boson_mass < self.mass_high
            }
        }
    }
}

/// Upper mass boundary of the off-shell sample starting at `low`
fn next_mass_boundary(low: Float) -> Float {
    const LADDER: [(Float, Float); 4] = [(100., 200.), (200., 500.), (500., 1000.), (1000., 2000.)];
    LADDER
        .iter()
        .find(|(start, _)| *start == low)
        .map_or(Float::INFINITY, |(_, end)| *end)
}

/// Parse `<prefix><mass>` optionally followed by `_<anything>`
fn offshell_mass(process_name: &str, prefix: &str) -> Option<Float> {
    let rest = process_name.strip_prefix(prefix)?;
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let (digits, tail) = rest.split_at(digits_end);
    if digits.is_empty() || !(tail.is_empty() || tail.starts_with('_')) {
        return None;
    }
    digits.parse::<Float>().ok()
}

/// Patching window of a sample, `None` if its events need no patching
pub fn infer_patching(process_name: &str) -> Option<PatchWindow> {
    if process_name == "WJetsToLNu" {
        Some(PatchWindow::inclusive())
    } else if process_name.contains("WJetsToLNu_HT") {
        Some(PatchWindow::boosted())
    } else if let Some(low) = offshell_mass(process_name, "WToMuNu_M-") {
        Some(PatchWindow::offshell(SampleCategory::OffshellMuon, low))
    } else {
        offshell_mass(process_name, "WToTauNu_M-")
            .map(|low| PatchWindow::offshell(SampleCategory::OffshellTau, low))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_families() {
        let inclusive = infer_patching("WJetsToLNu").unwrap();
        assert_eq!(inclusive.category, SampleCategory::InclusiveW);
        assert!(inclusive.needs_ht());

        let boosted = infer_patching("WJetsToLNu_HT-400To600").unwrap();
        assert_eq!(boosted.category, SampleCategory::BoostedW);
        assert_eq!(boosted.ht_high, Float::INFINITY);

        let muon = infer_patching("WToMuNu_M-500_ext-v1").unwrap();
        assert_eq!(muon.category, SampleCategory::OffshellMuon);
        assert_eq!((muon.mass_low, muon.mass_high), (500., 1000.));

        let tau = infer_patching("WToTauNu_M-3000").unwrap();
        assert_eq!(tau.category, SampleCategory::OffshellTau);
        assert_eq!((tau.mass_low, tau.mass_high), (3000., Float::INFINITY));

        assert_eq!(infer_patching("WJetsToLNu_ext"), None);
        assert_eq!(infer_patching("WToMuNu_M-"), None);
        assert_eq!(infer_patching("WToMuNu_M-100v2"), None);
        assert_eq!(infer_patching("SingleMuon_Run2018A"), None);
        assert_eq!(infer_patching("TTTo2L2Nu"), None);
    }

    #[test]
    fn offshell_window_excludes_upper_edge() {
        let window = infer_patching("WToMuNu_M-100").unwrap();
        assert!(window.accepts(150., 0.));
        assert!(window.accepts(100., 0.));
        assert!(!window.accepts(200., 0.));
        assert!(!window.accepts(99., 0.));
    }

    #[test]
    fn inclusive_window_includes_upper_edge() {
        let window = infer_patching("WJetsToLNu").unwrap();
        assert!(window.accepts(80.4, 50.));
        assert!(window.accepts(100., 100.));
        assert!(!window.accepts(100.1, 50.));
        assert!(!window.accepts(80.4, 150.));

        let boosted = infer_patching("WJetsToLNu_HT-70To100").unwrap();
        assert!(boosted.accepts(80.4, 1500.));
        assert!(!boosted.accepts(120., 0.));
    }
}
