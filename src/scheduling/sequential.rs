//! Sequential back-end of the analysis

use super::run_shard;
use crate::{analyzer::AnalysisResults, random::RandomGenerator, Result};

use std::path::{Path, PathBuf};

/// Analyze the input files one after the other
///
/// Every file still gets its own random number stream, so that the output
/// does not depend on which back-end was used.
///
pub fn run_shards(
    files: &[PathBuf],
    seed: u64,
    analyze_file: &(impl Fn(&Path, &mut RandomGenerator) -> Result<AnalysisResults> + ?Sized),
) -> Result<Vec<AnalysisResults>> {
    files
        .iter()
        .enumerate()
        .map(|(shard, file)| run_shard(shard, file, seed, analyze_file))
        .collect()
}
