//! Progress-callback trait for pipeline stage events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::OptimizerConfigBuilder::progress_callback`] to receive
//! events as pages are rasterised, filtered and reassembled.
//!
//! # Example
//!
//! ```rust
//! use pdf_optimizer::{OptimizerConfig, PipelineProgressCallback, PipelineStage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     filtered: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_item_complete(&self, stage: PipelineStage, _item: usize, _total: usize) {
//!         if stage == PipelineStage::Optimize {
//!             self.filtered.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { filtered: AtomicUsize::new(0) });
//!
//! let config = OptimizerConfig::builder()
//!     .progress_callback(counter as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::fmt;
use std::sync::Arc;

/// The batch stages of a run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    /// Pages rendered to `raw/`.
    Rasterize,
    /// Filter chain applied into `processed/`.
    Optimize,
    /// Processed pages written to the output PDF.
    Assemble,
}

impl PipelineStage {
    pub fn label(self) -> &'static str {
        match self {
            PipelineStage::Rasterize => "Rasterising",
            PipelineStage::Optimize => "Filtering",
            PipelineStage::Assemble => "Assembling",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Called by the pipeline as it works through each stage.
///
/// Implementations must be `Send + Sync`: item events arrive concurrently
/// from pool workers. All methods have default no-op implementations so
/// callers only override what they care about.
///
/// `item` is the 1-indexed page number for every stage.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once before a stage dispatches any work.
    fn on_stage_start(&self, stage: PipelineStage, total: usize) {
        let _ = (stage, total);
    }

    /// Called when one page has finished a stage.
    fn on_item_complete(&self, stage: PipelineStage, item: usize, total: usize) {
        let _ = (stage, item, total);
    }

    /// Called when one page failed a stage.
    fn on_item_error(&self, stage: PipelineStage, item: usize, error: &str) {
        let _ = (stage, item, error);
    }

    /// Called once after every task of the stage has joined.
    fn on_stage_complete(&self, stage: PipelineStage, total: usize, success_count: usize) {
        let _ = (stage, total, success_count);
    }

    /// Called when a stage is skipped because a previous run finished it.
    fn on_stage_skipped(&self, stage: PipelineStage) {
        let _ = stage;
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::OptimizerConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
