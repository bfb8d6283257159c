//! Directory-ordered loading of `page_<n>.png` files.
//!
//! Pages sort by the number in their name, never lexically: `page_2.png`
//! precedes `page_10.png`. Reassembly depends on this.

use crate::error::OptimizerError;
use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

static PAGE_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^page_(\d+)\.png$").unwrap());

/// Page number embedded in a `page_<n>.png` name.
pub fn page_number(file_name: &str) -> Option<usize> {
    PAGE_FILE
        .captures(file_name)
        .and_then(|c| c[1].parse().ok())
}

/// One page file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFile {
    pub page: usize,
    pub path: PathBuf,
}

impl PageFile {
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    pub fn decode(&self) -> Result<DynamicImage, OptimizerError> {
        image::open(&self.path).map_err(|source| OptimizerError::ImageDecode {
            path: self.path.clone(),
            source,
        })
    }
}

/// The page files of a directory in page order.
///
/// Listing happens once; decoding happens lazily in [`PageDir::iter`], and
/// every call to `iter` starts again from the first page.
#[derive(Debug, Clone)]
pub struct PageDir {
    dir: PathBuf,
    files: Vec<PageFile>,
}

impl PageDir {
    /// List `dir`. Files not named `page_<n>.png` are ignored.
    pub fn scan(dir: impl AsRef<Path>) -> Result<Self, OptimizerError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|e| OptimizerError::io(dir, e))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| OptimizerError::io(dir, e))?;
            let name = entry.file_name();
            let Some(page) = name.to_str().and_then(page_number) else {
                continue;
            };
            files.push(PageFile {
                page,
                path: entry.path(),
            });
        }
        files.sort_by_key(|f| f.page);

        Ok(Self {
            dir: dir.to_path_buf(),
            files,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn files(&self) -> &[PageFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Decoded `(image, file name)` pairs in page order.
    pub fn iter(&self) -> impl Iterator<Item = Result<(DynamicImage, String), OptimizerError>> + '_ {
        self.files
            .iter()
            .map(|f| f.decode().map(|img| (img, f.file_name().to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_page(dir: &Path, n: usize) {
        let img = RgbImage::from_pixel(2, 2, Rgb([n as u8, 0, 0]));
        img.save(dir.join(format!("page_{n}.png"))).unwrap();
    }

    #[test]
    fn page_number_parsing() {
        assert_eq!(page_number("page_1.png"), Some(1));
        assert_eq!(page_number("page_120.png"), Some(120));
        assert_eq!(page_number("page_.png"), None);
        assert_eq!(page_number("page_1.jpg"), None);
        assert_eq!(page_number("xpage_1.png"), None);
        assert_eq!(page_number("page_1.png.tmp"), None);
    }

    #[test]
    fn numeric_not_lexical_order() {
        let dir = tempfile::tempdir().unwrap();
        for n in [10, 2, 1, 9, 3, 4, 5, 6, 7, 8] {
            write_page(dir.path(), n);
        }
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let pages = PageDir::scan(dir.path()).unwrap();
        let order: Vec<usize> = pages.files().iter().map(|f| f.page).collect();
        assert_eq!(order, (1..=10).collect::<Vec<_>>());

        let names: Vec<String> = pages.iter().map(|r| r.unwrap().1).collect();
        assert_eq!(names[1], "page_2.png");
        assert_eq!(names[9], "page_10.png");
    }

    #[test]
    fn iteration_is_restartable_and_decodes() {
        let dir = tempfile::tempdir().unwrap();
        write_page(dir.path(), 1);
        write_page(dir.path(), 2);
        let pages = PageDir::scan(dir.path()).unwrap();

        for _ in 0..2 {
            let reds: Vec<u8> = pages
                .iter()
                .map(|r| r.unwrap().0.to_rgb8().get_pixel(0, 0).0[0])
                .collect();
            assert_eq!(reds, vec![1, 2]);
        }
    }

    #[test]
    fn undecodable_page_surfaces_on_iteration() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page_1.png"), b"not a png").unwrap();
        let pages = PageDir::scan(dir.path()).unwrap();
        assert_eq!(pages.len(), 1);
        let err = pages.iter().next().unwrap().unwrap_err();
        assert!(matches!(err, OptimizerError::ImageDecode { .. }));
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let err = PageDir::scan("/definitely/not/here").unwrap_err();
        assert!(matches!(err, OptimizerError::Io { .. }));
    }
}
