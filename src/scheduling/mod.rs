//! This module takes care of scheduling the analysis work, encapsulating use
//! of multiple threads
//!
//! Each input file is a shard with its own random number stream, derived from
//! the configured seed and the shard's position in the file list. Shard
//! results are always merged in file list order, so that sequential and
//! parallel runs give the same output.

#[cfg(not(feature = "multi-threading"))] mod sequential;
#[cfg(feature = "multi-threading")] mod multi_threading;

use crate::{analyzer::AnalysisResults, random::RandomGenerator, Result};

use eyre::ensure;

use std::path::{Path, PathBuf};


/// Run the analysis in the manner that was configured at build time.
///
/// Takes as parameters the input files, the random seed of the run, and an
/// analysis kernel that processes one file given its random number generator.
///
/// Returns the merged results of all files
///
pub fn run_analysis(
    files: &[PathBuf],
    seed: u64,
    analyze_file: impl Send + Sync + Fn(&Path, &mut RandomGenerator) -> Result<AnalysisResults>,
) -> Result<AnalysisResults> {
    ensure!(!files.is_empty(), "There should be at least one input file");

    // Process the shards...
    let shard_results = {
        // ...in sequential mode
        #[cfg(not(feature = "multi-threading"))]
        { sequential::run_shards(files, seed, &analyze_file)? }

        // ...in multi-threaded mode
        #[cfg(feature = "multi-threading")]
        { multi_threading::run_shards(files, seed, &analyze_file)? }
    };

    merge_in_order(shard_results)
}

/// Analyze one shard, tagging its log output with the file name
fn run_shard(
    shard: usize,
    file: &Path,
    seed: u64,
    analyze_file: &(impl Fn(&Path, &mut RandomGenerator) -> Result<AnalysisResults> + ?Sized),
) -> Result<AnalysisResults> {
    let span = tracing::info_span!("shard", file = %file.display());
    let _entered = span.enter();
    tracing::info!("Processing input file {}", shard + 1);
    let mut rng = RandomGenerator::for_shard(seed, shard);
    analyze_file(file, &mut rng)
}

/// Merge shard results in file list order
fn merge_in_order(shard_results: Vec<AnalysisResults>) -> Result<AnalysisResults> {
    let mut results_iter = shard_results.into_iter();
    let Some(mut merged) = results_iter.next() else {
        eyre::bail!("There should be at least one shard result");
    };
    for result in results_iter {
        merged.merge(result)?;
    }
    Ok(merged)
}
