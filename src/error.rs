//! Error types for the pdf-optimizer library.
//!
//! [`OptimizerError`] is fatal to the current run: it is what the top-level
//! `optimize*` functions return. Two classes of trouble deliberately do not
//! show up here:
//!
//! * an unreadable or missing job state file, which is treated as a fresh
//!   job (see [`crate::job::StateStore::load`]);
//! * a failing super-resolution backend, which degrades to a pass-through
//!   and is only logged (see [`crate::filters::SuperResolveError`]).

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf-optimizer library.
#[derive(Debug, Error)]
pub enum OptimizerError {
    // ── Input errors ──────────────────────────────────────────────────────
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// No `--input` was given and the input directory holds no PDF.
    #[error("No PDF files found in '{dir}'\nPass --input <PATH> or drop a PDF into that directory.")]
    NoInputPdf { dir: PathBuf },

    /// Mode string was neither `test` nor `output`.
    #[error("Invalid mode '{0}'. Supported modes are 'test' and 'output'.")]
    InvalidMode(String),

    // ── PDF errors ────────────────────────────────────────────────────────
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// pdfium could not load or render one page (1-indexed).
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Building or saving the output document failed.
    #[error("Failed to write PDF '{path}': {detail}")]
    PdfWriteFailed { path: PathBuf, detail: String },

    // ── Image errors ──────────────────────────────────────────────────────
    #[error("Failed to decode image '{path}': {source}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to write image '{path}': {source}")]
    ImageWrite {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The reassembler was handed no pages.
    #[error("No page images to assemble in '{dir}'")]
    EmptyImageSequence { dir: PathBuf },

    // ── Filter errors ─────────────────────────────────────────────────────
    #[error("Invalid filter specification '{spec}': {reason}")]
    InvalidFilterSpec { spec: String, reason: String },

    /// Only raised with `strict_filters`; otherwise unknown names are skipped.
    #[error("Unknown filter '{name}'. Known filters: enhance_text, median_filt, bilateral_filt, gaussian_blur, sharpen, conv_filt, super_resolve")]
    UnknownFilter { name: String },

    #[error("Invalid parameter '{param}' for filter '{filter}': {reason}")]
    InvalidFilterParam {
        filter: String,
        param: String,
        reason: String,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDFium is normally downloaded automatically on first run.\n\
If the auto-download failed, you can:\n\
  • Check your internet connection and try again.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n\
  • Pass --pdfium-lib /path/to/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OptimizerError {
    /// Attach a path to a bare I/O error.
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_param(
        filter: impl Into<String>,
        param: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidFilterParam {
            filter: filter.into(),
            param: param.into(),
            reason: reason.into(),
        }
    }
}
