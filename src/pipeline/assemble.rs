//! PDF reassembly: one page per image, in the order given.
//!
//! Each image fills its page exactly. The page size follows from the pixel
//! size and the `resolution` metadata: `points = pixels · 72 / resolution`.
//! The file is saved atomically (temp file in the target directory, then
//! rename), so a failed run never leaves a truncated PDF behind.

use super::loader::PageDir;
use super::pdfium::bind;
use crate::atomic::write_atomic;
use crate::error::OptimizerError;
use crate::progress::{PipelineStage, ProgressCallback};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Page edge in points for `pixels` at `resolution` DPI.
pub fn page_points(pixels: u32, resolution: u32) -> f32 {
    pixels as f32 * 72.0 / resolution.max(1) as f32
}

/// Writes image sequences into PDFs through the process-wide PDFium binding.
pub struct PdfAssembler {
    pdfium: &'static Pdfium,
    resolution: u32,
}

impl PdfAssembler {
    pub fn new(pdfium: &'static Pdfium, resolution: u32) -> Self {
        Self {
            pdfium,
            resolution: resolution.max(1),
        }
    }

    /// Bind the library at `library` (unless already bound) and build an
    /// assembler.
    pub fn bind(library: &Path, resolution: u32) -> Result<Self, OptimizerError> {
        Ok(Self::new(bind(library)?, resolution))
    }

    /// Write `images` to `out_path`, first image on page 1. Returns the page
    /// count. An empty sequence is [`OptimizerError::EmptyImageSequence`].
    pub fn write<I>(
        &self,
        images: I,
        out_path: &Path,
        progress: Option<&ProgressCallback>,
    ) -> Result<usize, OptimizerError>
    where
        I: IntoIterator<Item = Result<(DynamicImage, String), OptimizerError>>,
    {
        let write_err = |detail: String| OptimizerError::PdfWriteFailed {
            path: out_path.to_path_buf(),
            detail,
        };

        let mut document = self
            .pdfium
            .create_new_pdf()
            .map_err(|e| write_err(format!("{:?}", e)))?;

        let images = images.into_iter();
        let expected = images.size_hint().0;
        let mut count = 0usize;
        for item in images {
            let (image, name) = item?;
            count += 1;
            self.append_page(&mut document, &image)
                .map_err(|e| write_err(format!("page {} ({}): {:?}", count, name, e)))?;
            debug!(
                "Appended {} as page {} ({}x{} px)",
                name,
                count,
                image.width(),
                image.height()
            );
            if let Some(cb) = progress {
                cb.on_item_complete(PipelineStage::Assemble, count, expected.max(count));
            }
        }

        if count == 0 {
            let dir = out_path.parent().unwrap_or(Path::new(".")).to_path_buf();
            return Err(OptimizerError::EmptyImageSequence { dir });
        }

        let bytes = document
            .save_to_bytes()
            .map_err(|e| write_err(format!("{:?}", e)))?;
        write_atomic(out_path, &bytes)?;

        info!("Wrote {} pages to {}", count, out_path.display());
        Ok(count)
    }

    fn append_page(&self, document: &mut PdfDocument, image: &DynamicImage) -> Result<(), PdfiumError> {
        let width = PdfPoints::new(page_points(image.width(), self.resolution));
        let height = PdfPoints::new(page_points(image.height(), self.resolution));

        let mut page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::Custom(width, height))?;
        page.objects_mut().create_image_object(
            PdfPoints::new(0.0),
            PdfPoints::new(0.0),
            image,
            Some(width),
            Some(height),
        )?;
        Ok(())
    }
}

/// Inputs for the reassembly stage.
#[derive(Clone)]
pub struct AssembleJob {
    pub processed_dir: PathBuf,
    pub out_path: PathBuf,
    pub library: PathBuf,
    pub resolution: u32,
    pub progress: Option<ProgressCallback>,
}

/// Reassemble `processed_dir` (in page order) into `out_path`.
pub async fn assemble(job: AssembleJob) -> Result<usize, OptimizerError> {
    let pages = PageDir::scan(&job.processed_dir)?;
    if pages.is_empty() {
        return Err(OptimizerError::EmptyImageSequence {
            dir: job.processed_dir,
        });
    }

    let total = pages.len();
    info!(
        "Assembling {} pages from {} at {} DPI",
        total,
        job.processed_dir.display(),
        job.resolution
    );
    if let Some(ref cb) = job.progress {
        cb.on_stage_start(PipelineStage::Assemble, total);
    }

    let progress = job.progress.clone();
    let count = tokio::task::spawn_blocking(move || {
        let assembler = PdfAssembler::bind(&job.library, job.resolution)?;
        assembler.write(pages.iter(), &job.out_path, job.progress.as_ref())
    })
    .await
    .map_err(|e| OptimizerError::Internal(format!("Assemble task panicked: {}", e)))??;

    if let Some(ref cb) = progress {
        cb.on_stage_complete(PipelineStage::Assemble, total, count);
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_follows_resolution() {
        assert_eq!(page_points(96, 96), 72.0);
        assert_eq!(page_points(1920, 96), 1440.0);
        assert_eq!(page_points(300, 300), 72.0);
        assert_eq!(page_points(150, 0), 150.0 * 72.0);
    }

    #[tokio::test]
    async fn empty_directory_fails_before_binding() {
        let dir = tempfile::tempdir().unwrap();
        let job = AssembleJob {
            processed_dir: dir.path().to_path_buf(),
            out_path: dir.path().join("out.pdf"),
            library: PathBuf::from("/definitely/not/libpdfium.so"),
            resolution: 96,
            progress: None,
        };
        let err = assemble(job).await.unwrap_err();
        assert!(matches!(err, OptimizerError::EmptyImageSequence { .. }));
        assert!(!dir.path().join("out.pdf").exists());
    }
}
