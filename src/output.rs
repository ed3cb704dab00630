//! This module is in charge of outputting the final analysis results to the
//! standard output and to the JSON result file

use crate::{
    analyzer::{AnalysisResults, CutFlow},
    config::{Channel, Configuration},
    diagnostics::Diagnostics,
    histograms::Histogram,
    numeric::Float,
    Result,
};

use eyre::WrapErr;
use serde::Serialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use std::{
    fs::File,
    io::{BufWriter, Write},
    time::Duration,
};

/// Number of significant digits of the console summary
const SIG_DIGITS: usize = 6;

/// Description of the run that produced a result file
#[derive(Serialize)]
struct RunMetadata<'a> {
    finished_at: String,
    era: &'static str,
    process_name: &'a str,
    is_mc: bool,
    channel: &'static str,
    selection_profile: String,
    rng_seed: u64,
    input_files: usize,
    elapsed_seconds: Float,
}

/// Histogram tagged with its name
#[derive(Serialize)]
struct NamedHistogram<'a> {
    name: &'a str,
    #[serde(flatten)]
    histogram: &'a Histogram,
}

/// Layout of the JSON result file
#[derive(Serialize)]
struct ResultFile<'a> {
    metadata: RunMetadata<'a>,
    sum_of_weights: Float,
    cutflow: &'a CutFlow,
    diagnostics: &'a Diagnostics,
    histograms: Vec<NamedHistogram<'a>>,
}

/// Output the analysis results to the console and to disk
pub fn dump_results(
    cfg: &Configuration,
    results: &AnalysisResults,
    input_files: usize,
    elapsed_time: Duration,
) -> Result<()> {
    let stdout = std::io::stdout();
    print_summary(&mut stdout.lock(), cfg.channel, results, elapsed_time)
        .wrap_err("Failed to print the run summary")?;

    let file = File::create(&cfg.output_file)
        .wrap_err_with(|| format!("Failed to create {}", cfg.output_file.display()))?;
    let mut writer = BufWriter::new(file);
    write_results(&mut writer, cfg, results, input_files, elapsed_time)?;
    writer.flush()?;
    tracing::info!("Results written to {}", cfg.output_file.display());
    Ok(())
}

/// Serialize the results as a JSON document
fn write_results(
    writer: impl Write,
    cfg: &Configuration,
    results: &AnalysisResults,
    input_files: usize,
    elapsed_time: Duration,
) -> Result<()> {
    let finished_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .wrap_err("Failed to format the end of run timestamp")?;
    let document = ResultFile {
        metadata: RunMetadata {
            finished_at,
            era: cfg.era.as_str(),
            process_name: &cfg.process_name,
            is_mc: cfg.is_mc,
            channel: channel_name(cfg.channel),
            selection_profile: cfg.selection_profile.to_string(),
            rng_seed: cfg.rng_seed,
            input_files,
            elapsed_seconds: elapsed_time.as_secs_f64(),
        },
        sum_of_weights: results.sum_of_weights,
        cutflow: &results.cutflow,
        diagnostics: &results.diagnostics,
        histograms: results
            .histograms
            .iter()
            .map(|(name, histogram)| NamedHistogram { name, histogram })
            .collect(),
    };
    serde_json::to_writer_pretty(writer, &document).wrap_err("Failed to write the result file")
}

fn channel_name(channel: Channel) -> &'static str {
    match channel {
        Channel::SingleMuon => "single-muon",
        Channel::Dimuon => "dimuon",
    }
}

/// Print the cut flow, the diagnostics and the sum of weights
fn print_summary(
    out: &mut impl Write,
    channel: Channel,
    results: &AnalysisResults,
    elapsed_time: Duration,
) -> std::io::Result<()> {
    writeln!(out, "---------------------------------------------")?;
    for (step, count) in results.cutflow.rows(channel) {
        writeln!(out, " {step:<31}: {count}")?;
    }
    writeln!(out, "---------------------------------------------")?;
    let sum_of_weights = format_general(results.sum_of_weights, SIG_DIGITS);
    writeln!(out, " {:<31}: {sum_of_weights}", "sum of weights")?;
    for (diagnostic, count) in results.diagnostics.iter() {
        writeln!(out, " {:<31}: {count}", diagnostic.to_string())?;
    }
    let elapsed = format_general(elapsed_time.as_secs_f64(), SIG_DIGITS);
    writeln!(out, " {:<31}: {elapsed}", "elapsed time (s)")
}

/// Format a floating-point number like the %g format of C's printf
///
/// Naive notation is used for moderate orders of magnitude, without trailing
/// zeros, and scientific notation otherwise.
///
fn format_general(x: Float, sig_digits: usize) -> String {
    if x == 0. {
        return "0".to_owned();
    }
    let log_x = x.abs().log10();
    if log_x >= -3. && log_x < sig_digits as Float {
        // Rust's precision counts digits after the decimal point, and the
        // leading zero of numbers below 1 is not significant
        let mut precision = (sig_digits as isize - 1 - log_x.trunc() as isize).max(0) as usize;
        if log_x < 0. {
            precision += 1;
        }
        let with_zeros = format!("{x:.precision$}");
        if with_zeros.contains('.') {
            with_zeros.trim_end_matches('0').trim_end_matches('.').to_owned()
        } else {
            with_zeros
        }
    } else {
        format!("{:.1$e}", x, sig_digits - 1)
    }
}
