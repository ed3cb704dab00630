//! Mechanism for loading and sharing the analysis configuration

use crate::{selection::SelectionProfile, Result};

use eyre::{bail, ensure, eyre, WrapErr};

use std::{
    fmt::{self, Display},
    fs,
    path::PathBuf,
    str::FromStr,
};

/// Data-taking period, which selects triggers, filters and calibrations
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Era {
    /// 2016, runs affected by the APV readout issue
    Y2016Apv,
    /// 2016, remaining runs
    Y2016,
    /// 2017
    Y2017,
    /// 2018
    Y2018,
}
//
impl Era {
    /// Tag used in configuration, file names and sample tables
    pub fn as_str(self) -> &'static str {
        match self {
            Era::Y2016Apv => "2016APV",
            Era::Y2016 => "2016",
            Era::Y2017 => "2017",
            Era::Y2018 => "2018",
        }
    }

    /// Both halves of 2016 share one pileup scenario
    pub fn pileup_tag(self) -> &'static str {
        match self {
            Era::Y2016Apv | Era::Y2016 => "2016",
            other => other.as_str(),
        }
    }

    /// Momentum-scale correction table tag
    pub fn rochester_tag(self) -> &'static str {
        match self {
            Era::Y2016Apv => "2016aUL",
            Era::Y2016 => "2016bUL",
            Era::Y2017 => "2017UL",
            Era::Y2018 => "2018UL",
        }
    }
}
//
impl FromStr for Era {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "2016APV" => Ok(Era::Y2016Apv),
            "2016" => Ok(Era::Y2016),
            "2017" => Ok(Era::Y2017),
            "2018" => Ok(Era::Y2018),
            _ => bail!("Unknown era {s}, expected one of 2016APV, 2016, 2017, 2018"),
        }
    }
}
//
impl Display for Era {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which event loop to run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    /// W → μν signal selection
    SingleMuon,
    /// Z → μμ control selection
    Dimuon,
}
//
impl FromStr for Channel {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "single-muon" => Ok(Channel::SingleMuon),
            "dimuon" => Ok(Channel::Dimuon),
            _ => bail!("Unknown channel {s}, expected single-muon or dimuon"),
        }
    }
}

/// Which corrections to apply
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CorrectionToggles {
    /// Pileup reweighting
    pub pileup: bool,

    /// L1 prefiring weight
    pub prefiring: bool,

    /// Muon momentum scale and resolution correction
    pub momentum_scale: bool,

    /// Muon identification scale factor
    pub id_sf: bool,

    /// Muon isolation scale factor
    pub iso_sf: bool,

    /// Muon trigger scale factor
    pub trig_sf: bool,
}
//
impl CorrectionToggles {
    /// Truth that any efficiency scale factor is requested
    pub fn any_efficiency_sf(&self) -> bool {
        self.id_sf || self.iso_sf || self.trig_sf
    }
}

/// Names of the efficiency scale factor histograms in the calibration files
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScaleFactorNames {
    /// Identification
    pub id: String,

    /// Isolation
    pub iso: String,

    /// Trigger, combined data/MC ratio
    pub trig: String,
}
//
impl ScaleFactorNames {
    /// Standard histogram names for an era
    pub fn for_era(era: Era) -> Self {
        let trig = match era {
            Era::Y2016Apv | Era::Y2016 => {
                "NUM_IsoMu24_or_IsoTkMu24_DEN_CutBasedIdTight_and_PFIsoTight_abseta_pt"
            }
            Era::Y2017 => "NUM_IsoMu27_DEN_CutBasedIdTight_and_PFIsoTight_abseta_pt",
            Era::Y2018 => "NUM_IsoMu24_DEN_CutBasedIdTight_and_PFIsoTight_abseta_pt",
        };
        Self {
            id: "NUM_TightID_DEN_TrackerMuons_abseta_pt".to_owned(),
            iso: "NUM_TightRelIso_DEN_TightIDandIPCut_abseta_pt".to_owned(),
            trig: trig.to_owned(),
        }
    }

    /// Trigger efficiency in data, used by the dimuon channel
    pub fn trig_data(&self) -> String {
        format!("{}_efficiencyData", self.trig)
    }

    /// Trigger efficiency in simulation, used by the dimuon channel
    pub fn trig_mc(&self) -> String {
        format!("{}_efficiencyMC", self.trig)
    }
}

/// Analysis configuration
#[derive(Clone, Debug)]
pub struct Configuration {
    /// Text file listing the record files to process
    pub input_file_list: PathBuf,

    /// Data-taking period
    pub era: Era,

    /// Sample name, drives generator patching and MET corrections
    pub process_name: String,

    /// Simulated sample (as opposed to collision data)
    pub is_mc: bool,

    /// Corrections to apply
    pub corrections: CorrectionToggles,

    /// Muon selection cut set
    pub selection_profile: SelectionProfile,

    /// Event loop variant
    pub channel: Channel,

    /// Root directory of calibration files
    pub calibration_dir: PathBuf,

    /// Seed of the random stream used for momentum smearing
    pub rng_seed: u64,

    /// Where the results are written
    pub output_file: PathBuf,

    /// Efficiency scale factor histogram names
    pub sf_names: ScaleFactorNames,
}
//
impl Configuration {
    /// Load the configuration from a file, check it, and print it out
    pub fn load(file_name: &str) -> Result<Self> {
        let config_str = fs::read_to_string(file_name)
            .wrap_err_with(|| format!("Failed to read configuration file {file_name}"))?;
        let config = Self::parse(&config_str)?;
        config.print();
        Ok(config)
    }

    /// Decode and check configuration text
    pub fn parse(config_str: &str) -> Result<Self> {
        // Configuration items are the first non-whitespace chunk of text on
        // each line. Blank lines and comment lines are ignored.
        let mut config_iter = config_str
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .filter(|item| !item.starts_with('#'));

        // Fetch the next item, tagged with the field it is supposed to fill
        let mut next_item = |name: &'static str| -> Result<ConfigItem> {
            config_iter
                .next()
                .map(|data| ConfigItem::new(name, data))
                .ok_or_else(|| eyre!("Missing configuration of {}", name))
        };

        let input_file_list = PathBuf::from(next_item("input_file_list")?.data);
        let era = next_item("era")?.parse::<Era>()?;
        let process_name = next_item("process_name")?.data.to_owned();
        let is_mc = next_item("is_mc")?.parse_bool()?;
        let corrections = CorrectionToggles {
            pileup: next_item("do_pileup")?.parse_bool()?,
            prefiring: next_item("do_prefiring")?.parse_bool()?,
            momentum_scale: next_item("do_rocco")?.parse_bool()?,
            id_sf: next_item("do_id_sf")?.parse_bool()?,
            iso_sf: next_item("do_iso_sf")?.parse_bool()?,
            trig_sf: next_item("do_trig_sf")?.parse_bool()?,
        };
        let config = Configuration {
            input_file_list,
            era,
            process_name,
            is_mc,
            corrections,
            selection_profile: next_item("selection_profile")?.parse::<SelectionProfile>()?,
            channel: next_item("channel")?.parse::<Channel>()?,
            calibration_dir: PathBuf::from(next_item("calibration_dir")?.data),
            rng_seed: next_item("rng_seed")?.parse::<u64>()?,
            output_file: PathBuf::from(next_item("output_file")?.data),
            sf_names: ScaleFactorNames::for_era(era),
        };

        // Weights derived from simulation make no sense on collision data
        let toggles = &config.corrections;
        ensure!(
            config.is_mc || !(toggles.pileup || toggles.prefiring || toggles.any_efficiency_sf()),
            "Pileup, prefiring and efficiency corrections only apply to simulated samples"
        );

        Ok(config)
    }

    /// Display the configuration
    pub fn print(&self) {
        let toggles = &self.corrections;
        tracing::info!("Input file list     : {}", self.input_file_list.display());
        tracing::info!("Era                 : {}", self.era);
        tracing::info!("Process name        : {}", self.process_name);
        tracing::info!("Is MC               : {}", self.is_mc);
        tracing::info!("Pileup correction   : {}", toggles.pileup);
        tracing::info!("Prefiring weight    : {}", toggles.prefiring);
        tracing::info!("Momentum scale      : {}", toggles.momentum_scale);
        tracing::info!("ID scale factor     : {}", toggles.id_sf);
        tracing::info!("Iso scale factor    : {}", toggles.iso_sf);
        tracing::info!("Trigger scale factor: {}", toggles.trig_sf);
        tracing::info!("Selection profile   : {}", self.selection_profile);
        tracing::info!("Channel             : {:?}", self.channel);
        tracing::info!("Calibration dir     : {}", self.calibration_dir.display());
        tracing::info!("Random seed         : {}", self.rng_seed);
        tracing::info!("Output file         : {}", self.output_file.display());
    }
}

/// A value from the configuration file, tagged with the struct field which it
/// is supposed to map for error reporting purposes.
struct ConfigItem<'data> {
    name: &'static str,
    data: &'data str,
}
//
impl<'data> ConfigItem<'data> {
    /// Build a config item from a struct field tag and raw iterator data
    fn new(name: &'static str, data: &'data str) -> Self {
        Self { name, data }
    }

    /// Parse this data using Rust's standard parsing logic
    fn parse<T: FromStr>(self) -> Result<T>
    where
        <T as FromStr>::Err: Display,
    {
        self.data
            .parse::<T>()
            .map_err(|e| eyre!("Could not parse configuration of {}: {}", self.name, e))
    }

    /// Parse a boolean, also accepting the 0/1 spelling of job scripts
    fn parse_bool(self) -> Result<bool> {
        match self.data.to_lowercase().as_str() {
            "1" => Ok(true),
            "0" => Ok(false),
            lower => lower.parse::<bool>().map_err(|e| {
                eyre!("Could not parse configuration of {}: {}", self.name, e)
            }),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 2018 single-muon configuration with the standard selection
    pub(crate) fn configuration(is_mc: bool, corrections: CorrectionToggles) -> Configuration {
        let process_name = if is_mc { "DYJetsToLL_M-50" } else { "SingleMuon_Run2018A" };
        Configuration {
            input_file_list: PathBuf::from("files.txt"),
            era: Era::Y2018,
            process_name: process_name.to_owned(),
            is_mc,
            corrections,
            selection_profile: SelectionProfile::Standard,
            channel: Channel::SingleMuon,
            calibration_dir: PathBuf::from("calibration"),
            rng_seed: 1,
            output_file: PathBuf::from("out.json"),
            sf_names: ScaleFactorNames::for_era(Era::Y2018),
        }
    }

    const SAMPLE: &str = "\
# W -> mu nu, 2018 simulation
filelists/WToMuNu_M-200.txt    input_file_list
2018                           era
WToMuNu_M-200                  process_name
1                              is_mc
true                           do_pileup
1                              do_prefiring
1                              do_rocco
1                              do_id_sf
1                              do_iso_sf
0                              do_trig_sf
highpt                         selection_profile
single-muon                    channel
calibration                    calibration_dir
12345                          rng_seed
out/WToMuNu_M-200.json         output_file
";

    #[test]
    fn parse_sample_configuration() {
        let cfg = Configuration::parse(SAMPLE).unwrap();
        assert_eq!(cfg.era, Era::Y2018);
        assert_eq!(cfg.process_name, "WToMuNu_M-200");
        assert!(cfg.is_mc);
        assert!(cfg.corrections.pileup && cfg.corrections.momentum_scale);
        assert!(!cfg.corrections.trig_sf);
        assert!(cfg.corrections.any_efficiency_sf());
        assert_eq!(cfg.selection_profile, SelectionProfile::HighPt);
        assert_eq!(cfg.channel, Channel::SingleMuon);
        assert_eq!(cfg.rng_seed, 12345);
        assert_eq!(
            cfg.sf_names.trig,
            "NUM_IsoMu24_DEN_CutBasedIdTight_and_PFIsoTight_abseta_pt"
        );
    }

    #[test]
    fn missing_items_are_named() {
        let truncated = SAMPLE.lines().take(6).collect::<Vec<_>>().join("\n");
        let err = Configuration::parse(&truncated).unwrap_err();
        assert!(err.to_string().contains("do_prefiring"), "{err}");
    }

    #[test]
    fn bad_values_are_rejected() {
        let bad_era = SAMPLE.replacen("\n2018 ", "\n2019 ", 1);
        assert!(Configuration::parse(&bad_era).is_err());
        let bad_bool = SAMPLE.replace("true ", "yes ");
        assert!(Configuration::parse(&bad_bool).is_err());
    }

    #[test]
    fn simulation_weights_rejected_on_data() {
        let data = SAMPLE.replacen("\n1 ", "\n0 ", 1);
        assert!(Configuration::parse(&data).is_err());
    }

    #[test]
    fn era_tags() {
        assert_eq!(Era::Y2016Apv.pileup_tag(), "2016");
        assert_eq!(Era::Y2017.rochester_tag(), "2017UL");
        assert_eq!("2016APV".parse::<Era>().unwrap(), Era::Y2016Apv);
        let names = ScaleFactorNames::for_era(Era::Y2016);
        assert_eq!(
            names.trig_mc(),
            "NUM_IsoMu24_or_IsoTkMu24_DEN_CutBasedIdTight_and_PFIsoTight_abseta_pt_efficiencyMC"
        );
    }
}
