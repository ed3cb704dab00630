//! Trigger paths and noise filters
//!
//! Which trigger paths an event must have fired, and which noise filters it
//! must have passed, is fixed by the data-taking era and the selection
//! profile. A couple of data-taking periods lack some of the paths and get a
//! reduced list.

use crate::{config::Era, record::EventRecord, selection::SelectionProfile, Result};

/// Filters shared by every era
const COMMON_FILTERS: [&str; 9] = [
    "Flag_goodVertices",
    "Flag_globalSuperTightHalo2016Filter",
    "Flag_HBHENoiseFilter",
    "Flag_HBHENoiseIsoFilter",
    "Flag_EcalDeadCellTriggerPrimitiveFilter",
    "Flag_BadPFMuonFilter",
    "Flag_BadPFMuonDzFilter",
    "Flag_hfNoisyHitsFilter",
    "Flag_eeBadScFilter",
];

/// Trigger paths and noise filters of a run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventFlags {
    /// Trigger paths, any of which must have fired
    triggers: Vec<&'static str>,

    /// Noise filters, all of which must have passed
    filters: Vec<&'static str>,
}
//
impl EventFlags {
    /// Pick the flags of a run
    ///
    /// `no_tk_mu50` marks input files which lack the `HLT_TkMu50` path.
    pub fn new(
        era: Era,
        profile: SelectionProfile,
        process_name: &str,
        no_tk_mu50: bool,
    ) -> Self {
        let triggers = match (profile, era) {
            (SelectionProfile::Standard, Era::Y2016Apv | Era::Y2016) => {
                vec!["HLT_IsoMu24", "HLT_IsoTkMu24"]
            }
            (SelectionProfile::Standard, Era::Y2017) => vec!["HLT_IsoMu27"],
            (SelectionProfile::Standard, Era::Y2018) => vec!["HLT_IsoMu24"],
            (SelectionProfile::HighPt, Era::Y2016Apv) if no_tk_mu50 => vec!["HLT_Mu50"],
            (SelectionProfile::HighPt, Era::Y2016Apv | Era::Y2016) => {
                vec!["HLT_Mu50", "HLT_TkMu50"]
            }
            (SelectionProfile::HighPt, Era::Y2017) if process_name == "SingleMuon_Run2017B" => {
                vec!["HLT_Mu50"]
            }
            (SelectionProfile::HighPt, Era::Y2017 | Era::Y2018) => {
                vec!["HLT_Mu50", "HLT_TkMu100", "HLT_OldMu100"]
            }
        };

        let mut filters = COMMON_FILTERS.to_vec();
        if matches!(era, Era::Y2017 | Era::Y2018) {
            filters.push("Flag_ecalBadCalibFilter");
        }

        Self { triggers, filters }
    }

    /// Trigger paths, any of which must have fired
    pub fn triggers(&self) -> &[&'static str] {
        &self.triggers[..]
    }

    /// Truth that the event fired one of the trigger paths
    pub fn passes_trigger(&self, record: &EventRecord) -> Result<bool> {
        for path in &self.triggers {
            if record.flag(path)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Truth that the event passed all noise filters
    pub fn passes_filters(&self, record: &EventRecord) -> Result<bool> {
        for filter in &self.filters {
            if !record.flag(filter)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Set every noise filter of any era to the same value
    pub(crate) fn all_filters(record: EventRecord, value: bool) -> EventRecord {
        COMMON_FILTERS
            .iter()
            .chain(["Flag_ecalBadCalibFilter"].iter())
            .fold(record, |record, name| record.with_flag(name, value))
    }

    #[test]
    fn trigger_tables() {
        let flags = |era, profile, process, no_tk| {
            EventFlags::new(era, profile, process, no_tk).triggers().to_vec()
        };
        use SelectionProfile::*;
        assert_eq!(flags(Era::Y2018, Standard, "x", false), ["HLT_IsoMu24"]);
        assert_eq!(flags(Era::Y2017, Standard, "x", false), ["HLT_IsoMu27"]);
        assert_eq!(
            flags(Era::Y2016Apv, HighPt, "x", false),
            ["HLT_Mu50", "HLT_TkMu50"]
        );
        assert_eq!(flags(Era::Y2016Apv, HighPt, "x", true), ["HLT_Mu50"]);
        assert_eq!(flags(Era::Y2016, HighPt, "x", true), ["HLT_Mu50", "HLT_TkMu50"]);
        assert_eq!(
            flags(Era::Y2017, HighPt, "SingleMuon_Run2017B", false),
            ["HLT_Mu50"]
        );
        assert_eq!(
            flags(Era::Y2017, HighPt, "SingleMuon_Run2017C", false),
            ["HLT_Mu50", "HLT_TkMu100", "HLT_OldMu100"]
        );
    }

    #[test]
    fn trigger_is_an_or() {
        let flags = EventFlags::new(Era::Y2016, SelectionProfile::Standard, "x", false);
        let record = EventRecord::new()
            .with_flag("HLT_IsoMu24", false)
            .with_flag("HLT_IsoTkMu24", true);
        assert!(flags.passes_trigger(&record).unwrap());
        let record = EventRecord::new().with_flag("HLT_IsoMu24", false);
        assert!(flags.passes_trigger(&record).is_err());
    }

    #[test]
    fn filters_depend_on_era() {
        let record = all_filters(EventRecord::new(), true).with_flag("Flag_ecalBadCalibFilter", false);
        let flags_2016 = EventFlags::new(Era::Y2016, SelectionProfile::Standard, "x", false);
        let flags_2018 = EventFlags::new(Era::Y2018, SelectionProfile::Standard, "x", false);
        assert!(flags_2016.passes_filters(&record).unwrap());
        assert!(!flags_2018.passes_filters(&record).unwrap());

        let record = all_filters(EventRecord::new(), true).with_flag("Flag_goodVertices", false);
        assert!(!flags_2016.passes_filters(&record).unwrap());
    }
}
