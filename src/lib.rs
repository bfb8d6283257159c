//! # pdf-optimizer
//!
//! Clean up scanned or low-quality PDFs by rasterising every page, running
//! a configurable chain of image filters over it, and reassembling the
//! result into a new PDF.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      validate --input or pick the first PDF in input/
//!  ├─ 2. Rasterise  pdfium, fixed width, one worker per page chunk
//!  ├─ 3. Filter     e.g. "median_filt(ksize=3), sharpen(kernel=2)"
//!  ├─ 4. Assemble   processed pages → output/<name>.pdf   (output mode)
//!  └─    or sample  one random page before/after          (test mode)
//! ```
//!
//! Stage progress is recorded in `<workdir>/<stem>/state.txt`, so a rerun
//! skips rasterisation that already happened.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_optimizer::{optimize_pdf, Mode, OptimizerConfig, Outcome};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = OptimizerConfig::builder()
//!         .filters("enhance_text(factor=1.5), median_filt(ksize=3)")
//!         .build()?;
//!     let out = optimize_pdf("scan.pdf", "workdir", Mode::Output, &config).await?;
//!     if let Outcome::Output { pdf, pages } = out.outcome {
//!         println!("{} pages → {}", pages, pdf.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Filters
//!
//! | Name | Parameters (defaults) |
//! |------|------------------------|
//! | `enhance_text` | `factor=2.0` |
//! | `median_filt` | `ksize=5` |
//! | `bilateral_filt` | `d=9, sigmaColor=75, sigmaSpace=75` |
//! | `gaussian_blur` | `ksize=3, sigma=0` |
//! | `sharpen` | `kernel=1` (1–5) |
//! | `conv_filt` | none |
//! | `super_resolve` | none; needs `realesrgan-ncnn-vulkan` or `PDFOPT_UPSCALER` |
//!
//! Unknown filter names are skipped with a warning unless
//! [`OptimizerConfig::strict_filters`] is set.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfopt` binary (clap + indicatif + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

mod atomic;
pub mod config;
pub mod error;
pub mod filters;
pub mod job;
pub mod optimize;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{Mode, OptimizerConfig, OptimizerConfigBuilder};
pub use error::OptimizerError;
pub use filters::{CommandUpscaler, Filter, FilterChain, SuperResolveError, SuperResolver};
pub use job::{Job, JobStage, JobState, StateStore};
pub use optimize::{optimize, optimize_pdf, optimize_sync};
pub use output::{OptimizeOutput, Outcome, RunStats};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, PipelineStage, ProgressCallback};
