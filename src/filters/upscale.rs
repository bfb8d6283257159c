//! Super-resolution backends for the `super_resolve` filter.
//!
//! Upscaling is best-effort. A backend that is missing or fails never
//! aborts a run: the filter logs a warning and hands the page on unchanged.

use crate::config::OptimizerConfig;
use image::{ImageFormat, RgbImage};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Linear scale factor requested from every backend.
pub const UPSCALE_FACTOR: u32 = 4;

/// Overrides the external upscaler executable.
pub const UPSCALER_ENV: &str = "PDFOPT_UPSCALER";

/// Why a backend could not upscale a page. Never fatal to a run.
#[derive(Debug, Error)]
pub enum SuperResolveError {
    #[error("could not start '{program}': {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}: {stderr}")]
    Failed {
        program: PathBuf,
        status: String,
        stderr: String,
    },

    #[error("upscaled image unreadable: {0}")]
    Image(#[from] image::ImageError),

    #[error("scratch directory: {0}")]
    Scratch(#[from] std::io::Error),

    #[error("{0}")]
    Backend(String),
}

/// A model that enlarges a page by [`UPSCALE_FACTOR`].
///
/// Implementations must be `Send + Sync`: the optimizer pool shares one
/// instance across all of its workers.
pub trait SuperResolver: Send + Sync {
    /// Short label used in log lines.
    fn name(&self) -> &str;

    fn upscale(&self, image: &RgbImage) -> Result<RgbImage, SuperResolveError>;
}

/// Runs a Real-ESRGAN style command line tool:
/// `<program> -i <in.png> -o <out.png> -s 4`.
#[derive(Debug, Clone)]
pub struct CommandUpscaler {
    program: PathBuf,
}

impl CommandUpscaler {
    pub const DEFAULT_PROGRAM: &'static str = "realesrgan-ncnn-vulkan";

    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl SuperResolver for CommandUpscaler {
    fn name(&self) -> &str {
        self.program.to_str().unwrap_or(Self::DEFAULT_PROGRAM)
    }

    fn upscale(&self, image: &RgbImage) -> Result<RgbImage, SuperResolveError> {
        let scratch = tempfile::tempdir()?;
        let input = scratch.path().join("in.png");
        let output = scratch.path().join("out.png");
        image.save_with_format(&input, ImageFormat::Png)?;

        let mut cmd = Command::new(&self.program);
        cmd.arg("-i")
            .arg(&input)
            .arg("-o")
            .arg(&output)
            .arg("-s")
            .arg(UPSCALE_FACTOR.to_string());

        debug!("Running upscaler: {:?}", cmd);
        let result = cmd.output().map_err(|source| SuperResolveError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if !result.status.success() {
            return Err(SuperResolveError::Failed {
                program: self.program.clone(),
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        Ok(image::open(&output)?.to_rgb8())
    }
}

/// Pick the super-resolution backend for a run.
///
/// 1. a pre-built resolver on the config;
/// 2. `config.upscaler_command`;
/// 3. the `PDFOPT_UPSCALER` environment variable;
/// 4. `realesrgan-ncnn-vulkan` from `PATH`.
pub fn resolve_super_resolver(config: &OptimizerConfig) -> Arc<dyn SuperResolver> {
    if let Some(ref resolver) = config.super_resolver {
        return Arc::clone(resolver);
    }

    let program = config
        .upscaler_command
        .clone()
        .or_else(|| {
            std::env::var_os(UPSCALER_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        })
        .unwrap_or_else(|| PathBuf::from(CommandUpscaler::DEFAULT_PROGRAM));

    Arc::new(CommandUpscaler::new(program))
}
