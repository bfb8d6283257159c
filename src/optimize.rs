//! Top-level entry points: rasterise → filter → reassemble, gated by the
//! job's stage marker.
//!
//! Stages run strictly one after another; each pool has fully joined
//! before the next stage starts and before `state.txt` is written.

use crate::config::{Mode, OptimizerConfig};
use crate::error::OptimizerError;
use crate::filters::resolve_super_resolver;
use crate::job::{Job, JobStage, StateStore};
use crate::output::{OptimizeOutput, Outcome, RunStats};
use crate::pipeline::assemble::{self, AssembleJob};
use crate::pipeline::loader::PageDir;
use crate::pipeline::optimize::{self as pool, OptimizeJob};
use crate::pipeline::rasterize::{self, RasterJob};
use crate::pipeline::{input, pdfium};
use crate::progress::PipelineStage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Optimise `input` inside `workdir`.
///
/// # Arguments
/// * `input`: the PDF to optimise (validated for `%PDF` magic)
/// * `workdir`: parent of the job directory `<workdir>/<stem>/`
/// * `mode`: `Test` filters one random page; `Output` writes the full PDF
/// * `config`: rendering, filter and pool settings
///
/// # Errors
/// Any [`OptimizerError`]; an unreadable state file is not one of them.
pub async fn optimize_pdf(
    input: impl AsRef<Path>,
    workdir: impl AsRef<Path>,
    mode: Mode,
    config: &OptimizerConfig,
) -> Result<OptimizeOutput, OptimizerError> {
    let total_start = Instant::now();
    let pdf_path = input::validate_local(input.as_ref())?;
    info!("Starting {} run: {}", mode, pdf_path.display());

    // ── Step 1: Parse the filter chain ───────────────────────────────────
    let chain = Arc::new(config.filter_chain()?);
    debug!("Filter chain: [{}]", chain);

    // ── Step 2: Prepare the job directory ────────────────────────────────
    let job = Job::new(&pdf_path, workdir)?;
    job.prepare()?;
    let store = job.state();
    let stage = store.load();
    debug!("Job {} at stage {:?}", job.dir.display(), stage);

    let mut stats = RunStats::default();
    let mut library: Option<PathBuf> = None;

    // ── Step 3: Rasterise ────────────────────────────────────────────────
    let raw_pages = existing_pages(&job.raw_dir);
    if stage >= JobStage::RawImages && raw_pages > 0 {
        info!("Raw images already present ({} pages), skipping rasterisation", raw_pages);
        stats.rasterize_skipped = true;
        stats.total_pages = raw_pages;
        notify_skipped(config, PipelineStage::Rasterize);
    } else {
        if stage >= JobStage::RawImages {
            warn!("State says {:?} but {} is empty; rasterising again", stage, job.raw_dir.display());
        }
        let t = Instant::now();
        let lib = pdfium_library(config, &mut library).await?;
        stats.total_pages = rasterize::rasterize(RasterJob {
            pdf_path: pdf_path.clone(),
            out_dir: job.raw_dir.clone(),
            library: lib,
            password: config.password.clone(),
            dpi: config.dpi,
            target_width: config.target_width,
            workers: config.workers,
            progress: config.progress_callback.clone(),
        })
        .await?;
        stats.rasterize_duration_ms = t.elapsed().as_millis() as u64;
        advance(&store, stage, JobStage::RawImages)?;
    }

    // ── Step 4: Filter ───────────────────────────────────────────────────
    let upscaler = chain
        .needs_upscaler()
        .then(|| resolve_super_resolver(config));
    let optimize_job = OptimizeJob {
        raw_dir: job.raw_dir.clone(),
        processed_dir: job.processed_dir.clone(),
        chain,
        upscaler,
        workers: config.workers,
        progress: config.progress_callback.clone(),
    };

    let outcome = match mode {
        Mode::Test => {
            let t = Instant::now();
            let file = pool::choose_sample(&job.raw_dir, &mut rand::thread_rng())?;
            let pair = pool::optimize_sample(optimize_job, file).await?;
            stats.filtered_pages = 1;
            stats.optimize_duration_ms = t.elapsed().as_millis() as u64;
            Outcome::Test {
                raw: pair.raw,
                processed: pair.processed,
            }
        }
        Mode::Output => {
            let tracked = |s: JobStage| config.track_all_stages && stage >= s;

            if tracked(JobStage::ProcessedImages) && existing_pages(&job.processed_dir) > 0 {
                info!("Processed images already present, skipping filtering");
                stats.optimize_skipped = true;
                notify_skipped(config, PipelineStage::Optimize);
            } else {
                let t = Instant::now();
                stats.filtered_pages = pool::optimize_all(optimize_job).await?;
                stats.optimize_duration_ms = t.elapsed().as_millis() as u64;
                if config.track_all_stages {
                    advance(&store, stage, JobStage::ProcessedImages)?;
                }
            }

            // ── Step 5: Reassemble ───────────────────────────────────────
            let out_path = job.output_pdf();
            let pages = if tracked(JobStage::ProcessedPdf) && out_path.is_file() {
                info!("{} already written, skipping reassembly", out_path.display());
                stats.assemble_skipped = true;
                notify_skipped(config, PipelineStage::Assemble);
                existing_pages(&job.processed_dir)
            } else {
                let t = Instant::now();
                let lib = pdfium_library(config, &mut library).await?;
                let pages = assemble::assemble(AssembleJob {
                    processed_dir: job.processed_dir.clone(),
                    out_path: out_path.clone(),
                    library: lib,
                    resolution: config.resolution,
                    progress: config.progress_callback.clone(),
                })
                .await?;
                stats.assemble_duration_ms = t.elapsed().as_millis() as u64;
                if config.track_all_stages {
                    advance(&store, stage, JobStage::ProcessedPdf)?;
                }
                pages
            };

            Outcome::Output {
                pdf: out_path,
                pages,
            }
        }
    };

    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    info!(
        "Run complete: {} pages, {}ms total",
        stats.total_pages, stats.total_duration_ms
    );

    Ok(OptimizeOutput {
        job_dir: job.dir,
        outcome,
        stats,
    })
}

/// Resolve the input (explicit path, or first PDF in `input_dir`) and run
/// [`optimize_pdf`].
pub async fn optimize(
    input: Option<&Path>,
    input_dir: impl AsRef<Path>,
    workdir: impl AsRef<Path>,
    mode: Mode,
    config: &OptimizerConfig,
) -> Result<OptimizeOutput, OptimizerError> {
    let pdf_path = input::resolve_input(input, input_dir.as_ref())?;
    optimize_pdf(pdf_path, workdir, mode, config).await
}

/// Synchronous wrapper around [`optimize`].
///
/// Creates a temporary tokio runtime internally.
pub fn optimize_sync(
    input: Option<&Path>,
    input_dir: impl AsRef<Path>,
    workdir: impl AsRef<Path>,
    mode: Mode,
    config: &OptimizerConfig,
) -> Result<OptimizeOutput, OptimizerError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| OptimizerError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(optimize(input, input_dir, workdir, mode, config))
}

/// Number of `page_<n>.png` files in `dir`; 0 if it cannot be listed.
fn existing_pages(dir: &Path) -> usize {
    PageDir::scan(dir).map(|p| p.len()).unwrap_or(0)
}

/// Persist `to` unless the marker is already at or past it.
fn advance(store: &StateStore, current: JobStage, to: JobStage) -> Result<(), OptimizerError> {
    if current >= to {
        return Ok(());
    }
    store.save(to)
}

fn notify_skipped(config: &OptimizerConfig, stage: PipelineStage) {
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_skipped(stage);
    }
}

/// Resolve the PDFium library once per run, on a blocking thread.
async fn pdfium_library(
    config: &OptimizerConfig,
    cached: &mut Option<PathBuf>,
) -> Result<PathBuf, OptimizerError> {
    if let Some(ref path) = cached {
        return Ok(path.clone());
    }
    let explicit = config.pdfium_library.clone();
    let path = tokio::task::spawn_blocking(move || pdfium::resolve_library(explicit.as_deref()))
        .await
        .map_err(|e| OptimizerError::Internal(format!("PDFium resolve task panicked: {}", e)))??;
    *cached = Some(path.clone());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    /// A job whose raw pages already exist, so no PDFium is needed.
    fn rasterised_job(pages: usize) -> (tempfile::TempDir, PathBuf, Job) {
        let root = tempfile::tempdir().unwrap();
        let pdf = root.path().join("sample.pdf");
        std::fs::write(&pdf, b"%PDF-1.7\n% not rendered in these tests\n").unwrap();

        let job = Job::new(&pdf, root.path().join("workdir")).unwrap();
        job.prepare().unwrap();
        for n in 1..=pages {
            RgbImage::from_fn(12, 16, |x, _| {
                if x < 6 {
                    Rgb([80, 80, 80])
                } else {
                    Rgb([170, 170, 170])
                }
            })
            .save(job.raw_dir.join(format!("page_{n}.png")))
            .unwrap();
        }
        job.state().save(JobStage::RawImages).unwrap();
        (root, pdf, job)
    }

    fn config() -> OptimizerConfig {
        OptimizerConfig::builder()
            .pdfium_library("/definitely/not/libpdfium.so")
            .workers(2)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_mode_reuses_raw_pages_and_filters_one() {
        let (root, pdf, job) = rasterised_job(4);
        let out = optimize_pdf(&pdf, root.path().join("workdir"), Mode::Test, &config())
            .await
            .unwrap();

        assert!(out.stats.rasterize_skipped);
        assert_eq!(out.stats.total_pages, 4);
        match out.outcome {
            Outcome::Test { raw, processed } => {
                assert!(raw.starts_with(&job.raw_dir));
                assert!(processed.starts_with(&job.processed_dir));
                assert!(processed.is_file());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(existing_pages(&job.processed_dir), 1);
        assert_eq!(job.state().load(), JobStage::RawImages);
    }

    #[tokio::test]
    async fn output_mode_filters_everything_before_needing_pdfium() {
        let (root, pdf, job) = rasterised_job(3);
        let err = optimize_pdf(&pdf, root.path().join("workdir"), Mode::Output, &config())
            .await
            .unwrap_err();

        // Filtering succeeded; only the bogus library stops reassembly.
        assert!(matches!(err, OptimizerError::PdfiumBindingFailed(_)), "{err:?}");
        assert_eq!(existing_pages(&job.processed_dir), 3);
        assert_eq!(job.state().load(), JobStage::RawImages);
    }

    #[tokio::test]
    async fn tracked_stages_are_persisted_and_skipped() {
        let (root, pdf, job) = rasterised_job(2);
        let cfg = OptimizerConfig::builder()
            .pdfium_library("/definitely/not/libpdfium.so")
            .track_all_stages(true)
            .build()
            .unwrap();

        let _ = optimize_pdf(&pdf, root.path().join("workdir"), Mode::Output, &cfg).await;
        assert_eq!(job.state().load(), JobStage::ProcessedImages);

        // Pretend a previous run wrote the PDF.
        std::fs::write(job.output_pdf(), b"%PDF-1.7").unwrap();
        job.state().save(JobStage::ProcessedPdf).unwrap();

        let out = optimize_pdf(&pdf, root.path().join("workdir"), Mode::Output, &cfg)
            .await
            .unwrap();
        assert!(out.stats.optimize_skipped);
        assert!(out.stats.assemble_skipped);
        assert_eq!(
            out.outcome,
            Outcome::Output {
                pdf: job.output_pdf(),
                pages: 2
            }
        );
    }

    #[tokio::test]
    async fn corrupt_state_restarts_from_rasterisation() {
        let (root, pdf, job) = rasterised_job(2);
        std::fs::write(job.state().path(), "{{{").unwrap();

        let err = optimize_pdf(&pdf, root.path().join("workdir"), Mode::Test, &config())
            .await
            .unwrap_err();
        // Rasterisation was attempted, which needs the (missing) library.
        assert!(matches!(err, OptimizerError::PdfiumBindingFailed(_)), "{err:?}");
    }

    #[tokio::test]
    async fn malformed_filter_spec_fails_before_any_work() {
        let (root, pdf, job) = rasterised_job(1);
        let mut cfg = config();
        cfg.filters = "sharpen(kernel=".into();
        let err = optimize_pdf(&pdf, root.path().join("workdir"), Mode::Test, &cfg)
            .await
            .unwrap_err();
        assert!(matches!(err, OptimizerError::InvalidFilterSpec { .. }));
        assert_eq!(existing_pages(&job.processed_dir), 0);
    }

    #[tokio::test]
    async fn missing_input_dir_pdf_is_reported() {
        let root = tempfile::tempdir().unwrap();
        let err = optimize(
            None,
            root.path().join("input"),
            root.path().join("workdir"),
            Mode::Output,
            &config(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OptimizerError::NoInputPdf { .. }));
    }
}
