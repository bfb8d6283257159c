//! PDFium binding for pipeline workers.
//!
//! PDFium's init/destroy pair is process-global, so the library is bound
//! once per process and never dropped. Workers share that binding (calls
//! are serialised by pdfium-render's `thread_safe` feature) but each opens
//! its own document handle.

use crate::error::OptimizerError;
use once_cell::sync::OnceCell;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

static PDFIUM: OnceCell<(PathBuf, Pdfium)> = OnceCell::new();

/// Resolve the PDFium library path once, before workers start.
///
/// Must run on a blocking thread: a cache miss downloads the library.
pub fn resolve_library(explicit: Option<&Path>) -> Result<PathBuf, OptimizerError> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => pdfium_auto::ensure_pdfium_library(None)
            .map_err(|e| OptimizerError::PdfiumBindingFailed(e.to_string())),
    }
}

/// The process-wide PDFium binding, bound from `path` on first use.
///
/// Once bound, later calls return the same instance whatever `path` they
/// pass. A failed bind leaves nothing behind, so a later call may retry.
pub fn bind(path: &Path) -> Result<&'static Pdfium, OptimizerError> {
    let (bound_path, pdfium) = PDFIUM.get_or_try_init(|| {
        debug!("Binding pdfium from {}", path.display());
        pdfium_auto::bind_pdfium_from_path(path)
            .map(|pdfium| (path.to_path_buf(), pdfium))
            .map_err(|e| OptimizerError::PdfiumBindingFailed(e.to_string()))
    })?;
    if bound_path != path {
        warn!(
            "PDFium already bound from {}; ignoring {}",
            bound_path.display(),
            path.display()
        );
    }
    Ok(pdfium)
}

/// Open `pdf_path`, mapping pdfium's load errors onto the input error kinds.
pub fn open_document<'a>(
    pdfium: &'a Pdfium,
    pdf_path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, OptimizerError> {
    pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                OptimizerError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                OptimizerError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            OptimizerError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })
}

/// Page count of `pdf_path`.
pub fn page_count(
    library: &Path,
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<usize, OptimizerError> {
    let pdfium = bind(library)?;
    let document = open_document(pdfium, pdf_path, password)?;
    Ok(document.pages().len() as usize)
}
