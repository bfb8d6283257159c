//! Page rasterisation: render every page of a PDF to `raw/page_<n>.png`.
//!
//! The page range is split into one contiguous chunk per worker. Each chunk
//! runs in `spawn_blocking` and opens its own document on the shared PDFium
//! binding, then renders its pages in order. A failing page aborts only its own chunk;
//! the other chunks run to completion before the first error is returned.

use super::pdfium::{bind, open_document};
use crate::error::OptimizerError;
use crate::progress::{PipelineStage, ProgressCallback};
use futures::stream::{self, StreamExt};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use pdfium_render::prelude::*;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Inputs for one rasterisation batch.
#[derive(Clone)]
pub struct RasterJob {
    pub pdf_path: PathBuf,
    pub out_dir: PathBuf,
    /// PDFium shared library, bound once for the whole process.
    pub library: PathBuf,
    pub password: Option<String>,
    pub dpi: u32,
    pub target_width: u32,
    pub workers: usize,
    pub progress: Option<ProgressCallback>,
}

/// File name of a rendered page, 1-indexed and unpadded.
pub fn page_file_name(page_num: usize) -> String {
    format!("page_{page_num}.png")
}

/// Split `0..total` into at most `workers` contiguous, balanced ranges.
/// The first `total % workers` ranges get one extra page; empty ranges are
/// dropped.
pub fn partition(total: usize, workers: usize) -> Vec<Range<usize>> {
    let workers = workers.max(1);
    let base = total / workers;
    let extra = total % workers;

    let mut ranges = Vec::with_capacity(workers);
    let mut start = 0;
    for i in 0..workers {
        let len = base + usize::from(i < extra);
        if len == 0 {
            break;
        }
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}

/// Height that keeps a `w0 × h0` page's aspect ratio at `target_width`.
pub fn target_height(w0: u32, h0: u32, target_width: u32) -> u32 {
    if w0 == 0 {
        return target_width.max(1);
    }
    let h = (f64::from(target_width) * f64::from(h0) / f64::from(w0)).round();
    (h as u32).max(1)
}

/// Render every page of `job.pdf_path`. Returns the page count.
pub async fn rasterize(job: RasterJob) -> Result<usize, OptimizerError> {
    let total = {
        let library = job.library.clone();
        let pdf_path = job.pdf_path.clone();
        let password = job.password.clone();
        tokio::task::spawn_blocking(move || {
            super::pdfium::page_count(&library, &pdf_path, password.as_deref())
        })
        .await
        .map_err(|e| OptimizerError::Internal(format!("Render task panicked: {}", e)))??
    };

    info!(
        "Rasterising {} pages of {} at {} DPI → {} px wide ({} workers)",
        total,
        job.pdf_path.display(),
        job.dpi,
        job.target_width,
        job.workers
    );
    if let Some(ref cb) = job.progress {
        cb.on_stage_start(PipelineStage::Rasterize, total);
    }

    std::fs::create_dir_all(&job.out_dir).map_err(|e| OptimizerError::io(&job.out_dir, e))?;

    let chunks = partition(total, job.workers);
    let job = Arc::new(job);

    let chunk_count = chunks.len();
    let results: Vec<Result<(), OptimizerError>> = stream::iter(chunks)
        .map(|chunk| {
            let job = Arc::clone(&job);
            async move {
                tokio::task::spawn_blocking(move || render_chunk(&job, chunk, total))
                    .await
                    .unwrap_or_else(|e| {
                        Err(OptimizerError::Internal(format!("Render task panicked: {}", e)))
                    })
            }
        })
        .buffer_unordered(job.workers.max(1))
        .collect()
        .await;

    let mut first_error = None;
    let mut failed_chunks = 0;
    for result in results {
        if let Err(e) = result {
            failed_chunks += 1;
            first_error.get_or_insert(e);
        }
    }

    let rendered = count_rendered(&job.out_dir, total);
    if let Some(ref cb) = job.progress {
        cb.on_stage_complete(PipelineStage::Rasterize, total, rendered);
    }

    match first_error {
        Some(e) => {
            warn!(
                "{} of {} rasterisation chunks failed; {} pages left in {}",
                failed_chunks,
                chunk_count,
                rendered,
                job.out_dir.display()
            );
            Err(e)
        }
        None => {
            info!("Rasterised {} pages into {}", total, job.out_dir.display());
            Ok(total)
        }
    }
}

fn count_rendered(dir: &Path, total: usize) -> usize {
    (1..=total)
        .filter(|&n| dir.join(page_file_name(n)).is_file())
        .count()
}

/// Blocking body of one worker: render `pages` in order, stop at the first
/// failure.
fn render_chunk(job: &RasterJob, pages: Range<usize>, total: usize) -> Result<(), OptimizerError> {
    debug!("Worker rendering pages {}..={}", pages.start + 1, pages.end);

    let pdfium = bind(&job.library)?;
    let document = open_document(pdfium, &job.pdf_path, job.password.as_deref())?;
    let doc_pages = document.pages();

    let render_config = PdfRenderConfig::new().scale_page_by_factor(job.dpi as f32 / 72.0);

    for idx in pages {
        let page_num = idx + 1;
        let outcome = render_page(&doc_pages, idx, &render_config, job.target_width).and_then(|image| {
            let path = job.out_dir.join(page_file_name(page_num));
            image
                .save_with_format(&path, ImageFormat::Png)
                .map_err(|source| OptimizerError::ImageWrite { path, source })
        });

        match outcome {
            Ok(()) => {
                if let Some(ref cb) = job.progress {
                    cb.on_item_complete(PipelineStage::Rasterize, page_num, total);
                }
            }
            Err(e) => {
                warn!("Page {} failed, abandoning rest of chunk: {}", page_num, e);
                if let Some(ref cb) = job.progress {
                    cb.on_item_error(PipelineStage::Rasterize, page_num, &e.to_string());
                }
                return Err(e);
            }
        }
    }
    Ok(())
}

fn render_page(
    pages: &PdfPages,
    idx: usize,
    render_config: &PdfRenderConfig,
    target_width: u32,
) -> Result<DynamicImage, OptimizerError> {
    let page_num = idx + 1;
    let page = pages
        .get(idx as u16)
        .map_err(|e| OptimizerError::RasterisationFailed {
            page: page_num,
            detail: format!("{:?}", e),
        })?;

    let bitmap = page
        .render_with_config(render_config)
        .map_err(|e| OptimizerError::RasterisationFailed {
            page: page_num,
            detail: format!("{:?}", e),
        })?;

    let rendered = bitmap.as_image();
    let height = target_height(rendered.width(), rendered.height(), target_width);
    debug!(
        "Rendered page {} → {}x{} px, resizing to {}x{}",
        page_num,
        rendered.width(),
        rendered.height(),
        target_width,
        height
    );

    let resized = rendered.resize_exact(target_width, height, FilterType::Lanczos3);
    Ok(DynamicImage::ImageRgb8(resized.to_rgb8()))
}
