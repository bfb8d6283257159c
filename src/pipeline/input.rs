//! Input resolution: validate a user-supplied PDF or pick the default one.
//!
//! We check the `%PDF` magic bytes before returning so callers get a
//! meaningful error rather than a pdfium failure deep inside a worker.

use crate::error::OptimizerError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Resolve the PDF to optimise.
///
/// An explicit path is validated. Without one, the first `*.pdf` in
/// `input_dir` (by file name) is used; the directory is created if missing.
pub fn resolve_input(explicit: Option<&Path>, input_dir: &Path) -> Result<PathBuf, OptimizerError> {
    match explicit {
        Some(path) => validate_local(path),
        None => {
            let found = locate_default_input(input_dir)?;
            validate_local(&found)
        }
    }
}

/// Validate a local file path: exists, readable, PDF magic bytes.
pub fn validate_local(path: &Path) -> Result<PathBuf, OptimizerError> {
    let path = path.to_path_buf();

    if !path.is_file() {
        return Err(OptimizerError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            match f.read_exact(&mut magic) {
                Ok(()) if &magic == b"%PDF" => {}
                Ok(()) => return Err(OptimizerError::NotAPdf { path, magic }),
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Err(OptimizerError::NotAPdf { path, magic })
                }
                Err(e) => return Err(OptimizerError::io(path, e)),
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(OptimizerError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(OptimizerError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path)
}

/// First `*.pdf` (case-insensitive extension) in `dir`, sorted by file name.
pub fn locate_default_input(dir: &Path) -> Result<PathBuf, OptimizerError> {
    std::fs::create_dir_all(dir).map_err(|e| OptimizerError::io(dir, e))?;

    let mut pdfs: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| OptimizerError::io(dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && has_pdf_extension(p))
        .collect();
    pdfs.sort();

    let first = pdfs.into_iter().next().ok_or_else(|| OptimizerError::NoInputPdf {
        dir: dir.to_path_buf(),
    })?;
    info!("No --input given, using {}", first.display());
    Ok(first)
}

fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &[u8]) -> PathBuf {
        let p = dir.join(name);
        std::fs::write(&p, body).unwrap();
        p
    }

    #[test]
    fn accepts_pdf_magic() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(dir.path(), "a.pdf", b"%PDF-1.7\n...");
        assert_eq!(validate_local(&p).unwrap(), p);
    }

    #[test]
    fn rejects_missing_and_non_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate_local(&dir.path().join("nope.pdf")).unwrap_err();
        assert!(matches!(err, OptimizerError::FileNotFound { .. }));

        let p = write(dir.path(), "fake.pdf", b"PK\x03\x04zip");
        let err = validate_local(&p).unwrap_err();
        assert!(matches!(err, OptimizerError::NotAPdf { magic, .. } if &magic == b"PK\x03\x04"));

        let p = write(dir.path(), "tiny.pdf", b"%P");
        assert!(matches!(
            validate_local(&p).unwrap_err(),
            OptimizerError::NotAPdf { .. }
        ));
    }

    #[test]
    fn default_input_is_first_pdf_by_name() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "zeta.pdf", b"%PDF-1.4");
        write(dir.path(), "notes.txt", b"hello");
        let alpha = write(dir.path(), "alpha.PDF", b"%PDF-1.4");
        assert_eq!(resolve_input(None, dir.path()).unwrap(), alpha);
    }

    #[test]
    fn empty_input_dir_is_created_and_reported() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("input");
        let err = resolve_input(None, &dir).unwrap_err();
        assert!(matches!(err, OptimizerError::NoInputPdf { .. }));
        assert!(dir.is_dir());
    }

    #[test]
    fn explicit_input_ignores_input_dir() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(dir.path(), "chosen.pdf", b"%PDF-1.5");
        let elsewhere = dir.path().join("does-not-matter");
        assert_eq!(resolve_input(Some(&p), &elsewhere).unwrap(), p);
        assert!(!elsewhere.exists());
    }
}
