//! Result types returned by the top-level `optimize*` functions.

use crate::config::Mode;
use serde::Serialize;
use std::path::PathBuf;

/// What a run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Outcome {
    /// `test` mode: one sampled page before and after filtering.
    Test { raw: PathBuf, processed: PathBuf },
    /// `output` mode: the reassembled PDF.
    Output { pdf: PathBuf, pages: usize },
}

impl Outcome {
    pub fn mode(&self) -> Mode {
        match self {
            Outcome::Test { .. } => Mode::Test,
            Outcome::Output { .. } => Mode::Output,
        }
    }

    /// Paths to report to the operator, in display order.
    pub fn paths(&self) -> Vec<&PathBuf> {
        match self {
            Outcome::Test { raw, processed } => vec![raw, processed],
            Outcome::Output { pdf, .. } => vec![pdf],
        }
    }
}

/// Timings and counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Pages in `raw/` after rasterisation (or found there on resume).
    pub total_pages: usize,
    /// Pages filtered during this run.
    pub filtered_pages: usize,
    /// Rasterisation was skipped because a previous run finished it.
    pub rasterize_skipped: bool,
    /// Filtering was skipped (only with `track_all_stages`).
    pub optimize_skipped: bool,
    /// Reassembly was skipped (only with `track_all_stages`).
    pub assemble_skipped: bool,
    pub rasterize_duration_ms: u64,
    pub optimize_duration_ms: u64,
    pub assemble_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything a run returns.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizeOutput {
    /// `<workdir>/<stem>`.
    pub job_dir: PathBuf,
    pub outcome: Outcome,
    pub stats: RunStats,
}
