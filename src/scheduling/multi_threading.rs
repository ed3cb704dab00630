//! Multi-threaded back-end of the analysis

use super::run_shard;
use crate::{analyzer::AnalysisResults, random::RandomGenerator, Result};

use rayon::prelude::*;

use std::path::{Path, PathBuf};

/// Analyze the input files in parallel, one task per file
///
/// Results come back in file list order whatever order the tasks finish in,
/// which keeps the merged output reproducible.
///
pub fn run_shards(
    files: &[PathBuf],
    seed: u64,
    analyze_file: &(impl Sync + Fn(&Path, &mut RandomGenerator) -> Result<AnalysisResults> + ?Sized),
) -> Result<Vec<AnalysisResults>> {
    files
        .par_iter()
        .enumerate()
        .map(|(shard, file)| run_shard(shard, file, seed, analyze_file))
        .collect()
}
