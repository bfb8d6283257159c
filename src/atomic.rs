//! Atomic file replacement shared by the state file and output PDFs.

use crate::error::OptimizerError;
use std::io::Write;
use std::path::Path;

/// Write `bytes` to `path` through a temp file in the same directory,
/// synced and then renamed into place. Readers see the old file or the
/// new one, never a prefix. Missing parent directories are created.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), OptimizerError> {
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| OptimizerError::io(dir, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| OptimizerError::io(dir, e))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| OptimizerError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| OptimizerError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_existing_file_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("doc.pdf");
        std::fs::write(&out, b"old").unwrap();
        write_atomic(&out, b"%PDF-new").unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"%PDF-new");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn creates_missing_parent() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("output").join("doc.pdf");
        write_atomic(&out, b"x").unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"x");
    }

    #[test]
    fn failed_rename_keeps_the_target_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory cannot be replaced by a file.
        let target = dir.path().join("busy");
        std::fs::create_dir_all(target.join("inner")).unwrap();

        let err = write_atomic(&target, b"data").unwrap_err();
        assert!(matches!(err, OptimizerError::Io { .. }), "{err:?}");
        assert!(target.join("inner").is_dir());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
