//! W → μν: event selection and histogramming for collision data and simulation
//!
//!
//! # Introduction (for the physicist)
//!
//! This program reads reconstructed collision events, either real data or
//! simulation, and selects those compatible with a W boson decaying to a muon
//! and a neutrino: one well-identified isolated muon, no other lepton, and
//! enough missing transverse energy for the transverse mass of the pair to
//! exceed 40 GeV. A Z → μμ control selection is available as well.
//!
//! Simulated events are corrected to look like data (pileup profile, L1
//! prefiring, muon momentum scale and efficiencies), and overlapping W samples
//! are patched so that each region of phase space is described by exactly one
//! of them.
//!
//!
//! # Introduction (for the computer guy)
//!
//! The event loop goes as follows:
//!
//! * read in the configuration and the calibration tables
//! * loop over event records, and for each of them
//!     * build the physics objects,
//!     * correct them and compute the event weight,
//!     * decide whether the event belongs to the sample,
//!     * run the selection, filling histograms along the way
//! * then display / store the result.
//!
//! Input files are independent shards of the dataset, which makes the event
//! loop easy to run on multiple threads.

#![warn(missing_docs)]

mod analyzer;
mod calib;
mod config;
mod correction;
mod diagnostics;
mod electron;
mod event;
mod genpart;
mod genpatch;
mod histograms;
mod met;
mod metcorr;
mod momentum;
mod muon;
mod numeric;
mod output;
mod random;
mod record;
mod sample;
mod scheduling;
mod selection;
mod triggers;

use eyre::WrapErr;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::{
    analyzer::Analyzer, calib::Calibration, config::Configuration, record::InputFileList,
    record::JsonLinesReader,
};

use std::time::Instant;

/// We'll use eyre's type-erased result type throughout the application
type Result<T> = eyre::Result<T>;

/// Configuration file used when none is given on the command line
const DEFAULT_CONFIG_FILE: &str = "analysis.cfg";

/// This will act as our main function, with suitable error handling
fn main() -> Result<()> {
    // Log to stderr, at the level set by RUST_LOG (info by default)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    // ### CONFIGURATION READOUT ###

    let config_file = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_owned());
    let cfg = Configuration::load(&config_file).wrap_err("Failed to load the configuration")?;

    // ### ANALYSIS INITIALIZATION ###

    let input = InputFileList::load(&cfg.input_file_list)?;
    let calibration = Calibration::load(&cfg).wrap_err("Failed to load the calibration tables")?;
    let analyzer = Analyzer::new(&cfg, &calibration, input.no_tk_mu50)?;

    // The clock starts after the calibration I/O
    let start_time = Instant::now();

    // ### ANALYSIS EXECUTION ###

    let results = scheduling::run_analysis(&input.files, cfg.rng_seed, |file, rng| {
        let records = JsonLinesReader::open(file)?;
        analyzer
            .run(records, rng)
            .wrap_err_with(|| format!("Failed to analyze {}", file.display()))
    })?;

    // ### RESULTS DISPLAY AND STORAGE ###

    let elapsed_time = start_time.elapsed();
    output::dump_results(&cfg, &results, input.files.len(), elapsed_time)
        .wrap_err("Failed to output the results")?;

    // ...and we're done
    Ok(())
}
