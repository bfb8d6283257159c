//! Configuration types for a PDF optimisation run.
//!
//! Every knob lives in [`OptimizerConfig`], built via
//! [`OptimizerConfigBuilder`]. Setters clamp out-of-range numbers; `build()`
//! rejects what cannot be clamped.

use crate::error::OptimizerError;
use crate::filters::{FilterChain, SuperResolver};
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Lowest accepted render DPI.
pub const MIN_DPI: u32 = 36;
/// Highest accepted render DPI.
pub const MAX_DPI: u32 = 600;
/// Narrowest accepted target width in pixels.
pub const MIN_TARGET_WIDTH: u32 = 16;

/// Configuration for one optimisation run.
///
/// # Example
/// ```rust
/// use pdf_optimizer::OptimizerConfig;
///
/// let config = OptimizerConfig::builder()
///     .dpi(150)
///     .target_width(1200)
///     .workers(8)
///     .filters("median_filt(ksize=3), sharpen(kernel=2)")
///     .build()
///     .unwrap();
/// assert_eq!(config.workers, 8);
/// ```
#[derive(Clone)]
pub struct OptimizerConfig {
    /// Render DPI for rasterisation. Range: 36–600. Default: 96.
    pub dpi: u32,

    /// Width in pixels every rasterised page is resized to. Default: 1920.
    ///
    /// Height follows the page's aspect ratio.
    pub target_width: u32,

    /// Size of both the rasterisation and the optimisation pool. Default: 4.
    pub workers: usize,

    /// Resolution metadata (DPI) of the reassembled PDF. Default: 96.
    ///
    /// A page of `w × h` pixels becomes `w·72/resolution × h·72/resolution`
    /// points.
    pub resolution: u32,

    /// Filter specification applied to every page. Default: `"enhance_text"`.
    pub filters: String,

    /// Reject unknown filter names instead of skipping them. Default: false.
    pub strict_filters: bool,

    /// Persist `PROCESSED_IMAGES` / `PROCESSED_PDF` and skip finished stages
    /// on rerun. Default: false (only rasterisation is ever skipped).
    pub track_all_stages: bool,

    /// User password for encrypted input PDFs.
    pub password: Option<String>,

    /// Explicit path to the PDFium shared library. If None, `pdfium-auto`
    /// resolves (and if needed downloads) one.
    pub pdfium_library: Option<PathBuf>,

    /// Pre-built super-resolution backend. Takes precedence over
    /// `upscaler_command`.
    pub super_resolver: Option<Arc<dyn SuperResolver>>,

    /// External upscaler executable for `super_resolve`.
    pub upscaler_command: Option<PathBuf>,

    /// Stage and per-item progress notifications.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            dpi: 96,
            target_width: 1920,
            workers: 4,
            resolution: 96,
            filters: "enhance_text".to_string(),
            strict_filters: false,
            track_all_stages: false,
            password: None,
            pdfium_library: None,
            super_resolver: None,
            upscaler_command: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for OptimizerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimizerConfig")
            .field("dpi", &self.dpi)
            .field("target_width", &self.target_width)
            .field("workers", &self.workers)
            .field("resolution", &self.resolution)
            .field("filters", &self.filters)
            .field("strict_filters", &self.strict_filters)
            .field("track_all_stages", &self.track_all_stages)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("pdfium_library", &self.pdfium_library)
            .field(
                "super_resolver",
                &self.super_resolver.as_ref().map(|r| r.name().to_string()),
            )
            .field("upscaler_command", &self.upscaler_command)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn PipelineProgressCallback>"),
            )
            .finish()
    }
}

impl OptimizerConfig {
    /// Create a new builder for `OptimizerConfig`.
    pub fn builder() -> OptimizerConfigBuilder {
        OptimizerConfigBuilder {
            config: Self::default(),
        }
    }

    /// Parse `filters` honouring `strict_filters`.
    pub fn filter_chain(&self) -> Result<FilterChain, OptimizerError> {
        FilterChain::parse_with(&self.filters, self.strict_filters)
    }
}

/// Builder for [`OptimizerConfig`].
#[derive(Debug)]
pub struct OptimizerConfigBuilder {
    config: OptimizerConfig,
}

impl OptimizerConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(MIN_DPI, MAX_DPI);
        self
    }

    pub fn target_width(mut self, px: u32) -> Self {
        self.config.target_width = px.max(MIN_TARGET_WIDTH);
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n.max(1);
        self
    }

    pub fn resolution(mut self, dpi: u32) -> Self {
        self.config.resolution = dpi.max(1);
        self
    }

    pub fn filters(mut self, spec: impl Into<String>) -> Self {
        self.config.filters = spec.into();
        self
    }

    pub fn strict_filters(mut self, v: bool) -> Self {
        self.config.strict_filters = v;
        self
    }

    pub fn track_all_stages(mut self, v: bool) -> Self {
        self.config.track_all_stages = v;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn super_resolver(mut self, resolver: Arc<dyn SuperResolver>) -> Self {
        self.config.super_resolver = Some(resolver);
        self
    }

    pub fn upscaler_command(mut self, program: impl Into<PathBuf>) -> Self {
        self.config.upscaler_command = Some(program.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// The filter specification is parsed here so a typo fails before any
    /// page is rendered.
    pub fn build(self) -> Result<OptimizerConfig, OptimizerError> {
        let c = &self.config;
        if !(MIN_DPI..=MAX_DPI).contains(&c.dpi) {
            return Err(OptimizerError::InvalidConfig(format!(
                "DPI must be {MIN_DPI}–{MAX_DPI}, got {}",
                c.dpi
            )));
        }
        if c.workers == 0 {
            return Err(OptimizerError::InvalidConfig("Workers must be ≥ 1".into()));
        }
        if c.target_width < MIN_TARGET_WIDTH {
            return Err(OptimizerError::InvalidConfig(format!(
                "Target width must be ≥ {MIN_TARGET_WIDTH}, got {}",
                c.target_width
            )));
        }
        c.filter_chain()?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// What a run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Filter one randomly chosen page and return its raw and processed
    /// paths. (default)
    #[default]
    Test,
    /// Filter every page and reassemble the output PDF.
    Output,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Test => "test",
            Mode::Output => "output",
        }
    }
}

impl FromStr for Mode {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "test" => Ok(Mode::Test),
            "output" => Ok(Mode::Output),
            _ => Err(OptimizerError::InvalidMode(s.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
