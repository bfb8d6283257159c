//! Pipeline stages for PDF optimisation.
//!
//! Each submodule implements exactly one step.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ rasterize ──▶ optimize ──▶ assemble
//! (%PDF)    (pdfium)      (filters)    (pdfium)
//!            raw/         processed/   output/
//! ```
//!
//! 1. [`input`]:     validate the PDF or find the default one
//! 2. [`rasterize`]: render pages to `raw/page_<n>.png`, one blocking task
//!    per contiguous chunk of pages
//! 3. [`optimize`]:  run the filter chain over every raw page, one
//!    blocking task per page
//! 4. [`assemble`]:  write processed pages, in [`loader`] order, into the
//!    output PDF
//!
//! [`pdfium`] holds the binding helpers the PDFium-backed stages share.

pub mod assemble;
pub mod input;
pub mod loader;
pub mod optimize;
pub mod pdfium;
pub mod rasterize;
