//! Job working directories and the persisted stage marker.
//!
//! A job is keyed by the input PDF's file stem and lives under
//! `<workdir>/<stem>/`:
//!
//! ```text
//! <workdir>/<stem>/
//! ├── raw/         page_<n>.png as rasterised
//! ├── processed/   page_<n>.png after the filter chain
//! ├── output/      <input file name>
//! └── state.txt    {"version": 1, "state": "RAW_IMAGES"}
//! ```

use crate::atomic::write_atomic;
use crate::error::OptimizerError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the stage marker inside a job directory.
pub const STATE_FILE: &str = "state.txt";

/// Version written by this build. Newer files are ignored on load.
pub const STATE_VERSION: u32 = 1;

/// Coarse pipeline progress, in the order stages complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStage {
    #[default]
    Start,
    RawImages,
    ProcessedImages,
    ProcessedPdf,
}

/// On-disk form of `state.txt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
    /// Absent in legacy files, which are read as version 1.
    #[serde(default = "legacy_version")]
    pub version: u32,
    pub state: JobStage,
}

fn legacy_version() -> u32 {
    1
}

impl JobState {
    pub fn new(state: JobStage) -> Self {
        Self {
            version: STATE_VERSION,
            state,
        }
    }
}

/// Reads and writes one job's `state.txt`.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(job_dir: impl AsRef<Path>) -> Self {
        Self {
            path: job_dir.as_ref().join(STATE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current stage. Anything short of a valid, supported file means
    /// [`JobStage::Start`].
    pub fn load(&self) -> JobStage {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No state file at {}, starting fresh", self.path.display());
                return JobStage::Start;
            }
            Err(e) => {
                warn!("Unreadable state file {}: {}; starting fresh", self.path.display(), e);
                return JobStage::Start;
            }
        };

        match serde_json::from_str::<JobState>(&text) {
            Ok(s) if s.version <= STATE_VERSION => s.state,
            Ok(s) => {
                warn!(
                    "State file {} has unsupported version {}; starting fresh",
                    self.path.display(),
                    s.version
                );
                JobStage::Start
            }
            Err(e) => {
                warn!("Corrupt state file {}: {}; starting fresh", self.path.display(), e);
                JobStage::Start
            }
        }
    }

    /// Persist `stage`. Written to a temp file in the job directory and
    /// renamed over `state.txt`, so readers never see a partial file.
    pub fn save(&self, stage: JobStage) -> Result<(), OptimizerError> {
        let body = serde_json::to_vec(&JobState::new(stage))
            .map_err(|e| OptimizerError::Internal(format!("serialise job state: {e}")))?;

        write_atomic(&self.path, &body)?;

        debug!("Saved state {:?} to {}", stage, self.path.display());
        Ok(())
    }
}

/// Directory layout for one input PDF.
#[derive(Debug, Clone)]
pub struct Job {
    /// Input PDF.
    pub input: PathBuf,
    /// `<workdir>/<stem>`.
    pub dir: PathBuf,
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Job {
    /// Compute the layout for `input` under `workdir`. Nothing is created.
    pub fn new(input: impl Into<PathBuf>, workdir: impl AsRef<Path>) -> Result<Self, OptimizerError> {
        let input = input.into();
        let stem = input
            .file_stem()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                OptimizerError::InvalidConfig(format!("input '{}' has no file name", input.display()))
            })?;
        let dir = workdir.as_ref().join(stem);
        Ok(Self {
            raw_dir: dir.join("raw"),
            processed_dir: dir.join("processed"),
            output_dir: dir.join("output"),
            dir,
            input,
        })
    }

    /// Create the job directories if missing.
    pub fn prepare(&self) -> Result<(), OptimizerError> {
        for d in [&self.raw_dir, &self.processed_dir, &self.output_dir] {
            std::fs::create_dir_all(d).map_err(|e| OptimizerError::io(d, e))?;
        }
        Ok(())
    }

    /// `output/<input file name>`.
    pub fn output_pdf(&self) -> PathBuf {
        match self.input.file_name() {
            Some(name) => self.output_dir.join(name),
            None => self.output_dir.join("output.pdf"),
        }
    }

    pub fn state(&self) -> StateStore {
        StateStore::new(&self.dir)
    }
}
