//! The image optimiser pool: run the filter chain over every raw page.
//!
//! Pages are listed in page order up front, then dispatched one per task
//! onto the blocking pool, at most `workers` at a time. Each task decodes
//! its page, filters it and writes `processed/<same name>`. Completion
//! order does not matter; only the directory contents do.

use super::loader::{PageDir, PageFile};
use crate::error::OptimizerError;
use crate::filters::{FilterChain, SuperResolver};
use crate::progress::{PipelineStage, ProgressCallback};
use futures::stream::{self, StreamExt};
use image::ImageFormat;
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Inputs for one optimisation batch.
#[derive(Clone)]
pub struct OptimizeJob {
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub chain: Arc<FilterChain>,
    /// Only consulted when the chain contains `super_resolve`.
    pub upscaler: Option<Arc<dyn SuperResolver>>,
    pub workers: usize,
    pub progress: Option<ProgressCallback>,
}

/// Raw and processed paths of the page picked in test mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplePair {
    pub raw: PathBuf,
    pub processed: PathBuf,
}

impl OptimizeJob {
    /// Filter one page file into `processed_dir`. Blocking.
    pub fn optimize_file(&self, file: &PageFile) -> Result<PathBuf, OptimizerError> {
        let image = file.decode()?;
        let filtered = self.chain.apply(&image, self.upscaler.as_deref());

        let out = self.processed_dir.join(file.file_name());
        filtered
            .save_with_format(&out, ImageFormat::Png)
            .map_err(|source| OptimizerError::ImageWrite {
                path: out.clone(),
                source,
            })?;
        debug!("Filtered {} → {}", file.path.display(), out.display());
        Ok(out)
    }
}

/// Filter every page in `raw_dir`. Returns the number of pages written.
///
/// All tasks run to completion; the first failure, if any, is returned
/// afterwards.
pub async fn optimize_all(job: OptimizeJob) -> Result<usize, OptimizerError> {
    let pages = PageDir::scan(&job.raw_dir)?;
    let total = pages.len();
    prepare_out_dir(&job.processed_dir)?;

    info!(
        "Filtering {} pages with [{}] ({} workers)",
        total, job.chain, job.workers
    );
    if let Some(ref cb) = job.progress {
        cb.on_stage_start(PipelineStage::Optimize, total);
    }

    let job = Arc::new(job);
    let results: Vec<Result<PathBuf, OptimizerError>> = stream::iter(pages.files().to_vec())
        .map(|file| {
            let job = Arc::clone(&job);
            async move {
                let page = file.page;
                let result = tokio::task::spawn_blocking({
                    let job = Arc::clone(&job);
                    move || job.optimize_file(&file)
                })
                .await
                .unwrap_or_else(|e| {
                    Err(OptimizerError::Internal(format!("Filter task panicked: {}", e)))
                });

                if let Some(ref cb) = job.progress {
                    match &result {
                        Ok(_) => cb.on_item_complete(PipelineStage::Optimize, page, total),
                        Err(e) => cb.on_item_error(PipelineStage::Optimize, page, &e.to_string()),
                    }
                }
                result
            }
        })
        .buffer_unordered(job.workers.max(1))
        .collect()
        .await;

    let success = results.iter().filter(|r| r.is_ok()).count();
    if let Some(ref cb) = job.progress {
        cb.on_stage_complete(PipelineStage::Optimize, total, success);
    }

    if let Some(err) = results.into_iter().find_map(Result::err) {
        warn!("{} of {} pages failed to filter", total - success, total);
        return Err(err);
    }

    info!("Filtered {} pages into {}", success, job.processed_dir.display());
    Ok(success)
}

/// Pick the page test mode filters, uniformly at random.
pub fn choose_sample<R: Rng + ?Sized>(raw_dir: &Path, rng: &mut R) -> Result<PageFile, OptimizerError> {
    PageDir::scan(raw_dir)?
        .files()
        .choose(rng)
        .cloned()
        .ok_or_else(|| OptimizerError::EmptyImageSequence {
            dir: raw_dir.to_path_buf(),
        })
}

/// Filter only `file`, leaving the rest of the raw set untouched.
pub async fn optimize_sample(job: OptimizeJob, file: PageFile) -> Result<SamplePair, OptimizerError> {
    prepare_out_dir(&job.processed_dir)?;

    info!("Test mode: filtering sample {} with [{}]", file.file_name(), job.chain);
    if let Some(ref cb) = job.progress {
        cb.on_stage_start(PipelineStage::Optimize, 1);
    }

    let raw = file.path.clone();
    let page = file.page;
    let job = Arc::new(job);
    let processed = tokio::task::spawn_blocking({
        let job = Arc::clone(&job);
        move || job.optimize_file(&file)
    })
    .await
    .map_err(|e| OptimizerError::Internal(format!("Filter task panicked: {}", e)))??;

    if let Some(ref cb) = job.progress {
        cb.on_item_complete(PipelineStage::Optimize, page, 1);
        cb.on_stage_complete(PipelineStage::Optimize, 1, 1);
    }
    Ok(SamplePair { raw, processed })
}

fn prepare_out_dir(dir: &Path) -> Result<(), OptimizerError> {
    std::fs::create_dir_all(dir).map_err(|e| OptimizerError::io(dir, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct Dirs {
        _root: tempfile::TempDir,
        raw: PathBuf,
        processed: PathBuf,
    }

    fn dirs_with_pages(n: usize) -> Dirs {
        let root = tempfile::tempdir().unwrap();
        let raw = root.path().join("raw");
        let processed = root.path().join("processed");
        std::fs::create_dir_all(&raw).unwrap();
        for i in 1..=n {
            let img = RgbImage::from_fn(8, 8, |x, _| {
                if x < 4 {
                    Rgb([90, 90, 90])
                } else {
                    Rgb([150 + i as u8, 150, 150])
                }
            });
            img.save(raw.join(format!("page_{i}.png"))).unwrap();
        }
        Dirs {
            _root: root,
            raw,
            processed,
        }
    }

    fn job(d: &Dirs, spec: &str) -> OptimizeJob {
        OptimizeJob {
            raw_dir: d.raw.clone(),
            processed_dir: d.processed.clone(),
            chain: Arc::new(FilterChain::parse(spec).unwrap()),
            upscaler: None,
            workers: 3,
            progress: None,
        }
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut v: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        v.sort();
        v
    }

    #[tokio::test]
    async fn every_page_is_written_under_its_own_name() {
        let d = dirs_with_pages(11);
        let n = optimize_all(job(&d, "enhance_text")).await.unwrap();
        assert_eq!(n, 11);
        assert_eq!(names(&d.processed), names(&d.raw));
    }

    #[tokio::test]
    async fn raw_pages_are_not_modified() {
        let d = dirs_with_pages(2);
        let before = std::fs::read(d.raw.join("page_1.png")).unwrap();
        optimize_all(job(&d, "sharpen(kernel=1)")).await.unwrap();
        assert_eq!(std::fs::read(d.raw.join("page_1.png")).unwrap(), before);

        let raw = image::open(d.raw.join("page_1.png")).unwrap();
        let processed = image::open(d.processed.join("page_1.png")).unwrap();
        assert_ne!(raw.to_rgb8(), processed.to_rgb8());
    }

    #[tokio::test]
    async fn undecodable_page_fails_after_others_finish() {
        let d = dirs_with_pages(3);
        std::fs::write(d.raw.join("page_2.png"), b"garbage").unwrap();
        let err = optimize_all(job(&d, "enhance_text")).await.unwrap_err();
        assert!(matches!(err, OptimizerError::ImageDecode { .. }));
        assert!(d.processed.join("page_1.png").is_file());
        assert!(d.processed.join("page_3.png").is_file());
    }

    #[tokio::test]
    async fn sample_touches_exactly_one_page() {
        let d = dirs_with_pages(5);
        let file = choose_sample(&d.raw, &mut StdRng::seed_from_u64(7)).unwrap();
        let pair = optimize_sample(job(&d, "enhance_text"), file).await.unwrap();

        assert!(pair.raw.starts_with(&d.raw));
        assert!(pair.processed.starts_with(&d.processed));
        assert_eq!(pair.raw.file_name(), pair.processed.file_name());
        assert_eq!(names(&d.processed).len(), 1);
    }

    #[test]
    fn sample_of_empty_dir_is_an_error() {
        let d = dirs_with_pages(0);
        let err = choose_sample(&d.raw, &mut StdRng::seed_from_u64(1)).unwrap_err();
        assert!(matches!(err, OptimizerError::EmptyImageSequence { .. }));
    }

    #[test]
    fn same_seed_same_sample() {
        let d = dirs_with_pages(9);
        let a = choose_sample(&d.raw, &mut StdRng::seed_from_u64(42)).unwrap();
        let b = choose_sample(&d.raw, &mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(a, b);
    }
}
