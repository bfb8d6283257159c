//! # pdfium-auto
//!
//! Find a usable [PDFium](https://pdfium.googlesource.com/pdfium/) shared
//! library for `pdfium-render`, fetching it on first use when the machine has
//! none.
//!
//! ## Resolution order
//!
//! 1. `PDFIUM_LIB_PATH`: an existing library file; used as-is.
//! 2. The per-version cache directory (`PDFIUM_AUTO_CACHE_DIR` overrides the
//!    platform default, e.g. `~/.cache/pdf-optimizer/pdfium-7690/`).
//! 3. Download the platform archive from
//!    [bblanchon/pdfium-binaries](https://github.com/bblanchon/pdfium-binaries),
//!    extract the library into the cache directory and use it.
//!
//! ```rust,no_run
//! use pdfium_auto::{bind_pdfium_from_path, ensure_pdfium_library};
//!
//! let path = ensure_pdfium_library(Some(&|done, total| {
//!     if let Some(t) = total {
//!         eprint!("\rPDFium: {done}/{t} bytes");
//!     }
//! }))
//! .expect("PDFium unavailable");
//! let pdfium = bind_pdfium_from_path(&path).expect("bind failed");
//! # let _ = pdfium;
//! ```

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use pdfium_render::prelude::Pdfium;
use thiserror::Error;

/// pdfium-binaries release (`chromium/<N>`) fetched on demand.
pub const PDFIUM_VERSION: &str = "7690";

/// Points at an existing library file; skips cache and download.
pub const LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Overrides the root of the download cache.
pub const CACHE_DIR_ENV: &str = "PDFIUM_AUTO_CACHE_DIR";

const RELEASE_URL: &str = "https://github.com/bblanchon/pdfium-binaries/releases/download";

const CACHE_APP_DIR: &str = "pdf-optimizer";

/// Errors returned while locating or binding PDFium.
#[derive(Error, Debug)]
pub enum PdfiumAutoError {
    #[error("No PDFium build is published for {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("Cache directory '{path}' is not usable: {source}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    #[error("Could not extract '{member}' from the PDFium archive: {reason}")]
    Extract { member: String, reason: String },

    #[error("Failed to bind PDFium from '{path}': {reason}")]
    Bind { path: PathBuf, reason: String },
}

/// Where a platform's library lives inside the release archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    /// Release asset, e.g. `pdfium-linux-x64.tgz`.
    pub archive: &'static str,
    /// Path of the library inside the archive.
    pub member: &'static str,
    /// File name written to the cache directory.
    pub file_name: &'static str,
}

impl Platform {
    /// Platform of the running process.
    pub fn current() -> Result<Self, PdfiumAutoError> {
        Self::for_target(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Platform for an explicit `(os, arch)` pair as spelled by
    /// [`std::env::consts`].
    pub fn for_target(os: &str, arch: &str) -> Result<Self, PdfiumAutoError> {
        const MAC_LIB: (&str, &str) = ("lib/libpdfium.dylib", "libpdfium.dylib");
        const LINUX_LIB: (&str, &str) = ("lib/libpdfium.so", "libpdfium.so");
        const WIN_LIB: (&str, &str) = ("bin/pdfium.dll", "pdfium.dll");

        let (archive, (member, file_name)) = match (os, arch) {
            ("macos", "aarch64") => ("pdfium-mac-arm64.tgz", MAC_LIB),
            ("macos", "x86_64") => ("pdfium-mac-x64.tgz", MAC_LIB),
            ("linux", "x86_64") => ("pdfium-linux-x64.tgz", LINUX_LIB),
            ("linux", "aarch64") => ("pdfium-linux-arm64.tgz", LINUX_LIB),
            ("windows", "x86_64") => ("pdfium-win-x64.tgz", WIN_LIB),
            ("windows", "aarch64") => ("pdfium-win-arm64.tgz", WIN_LIB),
            ("windows", "x86") => ("pdfium-win-x86.tgz", WIN_LIB),
            _ => {
                return Err(PdfiumAutoError::UnsupportedPlatform {
                    os: os.to_string(),
                    arch: arch.to_string(),
                })
            }
        };

        Ok(Self {
            archive,
            member,
            file_name,
        })
    }

    fn download_url(&self) -> String {
        format!("{RELEASE_URL}/chromium%2F{PDFIUM_VERSION}/{}", self.archive)
    }
}

/// Resolves the library path from an optional override and a cache
/// directory. [`LibraryLocator::from_env`] reads both from the environment.
#[derive(Debug, Clone)]
pub struct LibraryLocator {
    override_path: Option<PathBuf>,
    cache_dir: PathBuf,
    platform: Platform,
}

impl LibraryLocator {
    pub fn from_env() -> Result<Self, PdfiumAutoError> {
        let override_path = std::env::var_os(LIB_PATH_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let cache_root = std::env::var_os(CACHE_DIR_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_cache_root);

        Ok(Self {
            override_path,
            cache_dir: cache_root.join(format!("pdfium-{PDFIUM_VERSION}")),
            platform: Platform::current()?,
        })
    }

    /// Locator rooted at `cache_root`, ignoring the environment.
    pub fn with_cache_root(cache_root: impl Into<PathBuf>) -> Result<Self, PdfiumAutoError> {
        Ok(Self {
            override_path: None,
            cache_dir: cache_root
                .into()
                .join(format!("pdfium-{PDFIUM_VERSION}")),
            platform: Platform::current()?,
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Path the library occupies once cached.
    pub fn cache_path(&self) -> PathBuf {
        self.cache_dir.join(self.platform.file_name)
    }

    /// Existing library on disk, without touching the network.
    pub fn existing(&self) -> Option<PathBuf> {
        if let Some(p) = self.override_path.as_ref().filter(|p| p.is_file()) {
            return Some(p.clone());
        }
        let cached = self.cache_path();
        cached.is_file().then_some(cached)
    }

    /// Existing library, or download it into the cache.
    ///
    /// `on_progress` receives `(bytes_downloaded, content_length)`.
    pub fn ensure(
        &self,
        on_progress: Option<&dyn Fn(u64, Option<u64>)>,
    ) -> Result<PathBuf, PdfiumAutoError> {
        if let Some(path) = self.existing() {
            return Ok(path);
        }

        std::fs::create_dir_all(&self.cache_dir).map_err(|source| PdfiumAutoError::CacheDir {
            path: self.cache_dir.clone(),
            source,
        })?;

        let archive = download(&self.platform.download_url(), on_progress)?;
        let dest = self.cache_path();
        extract_member(&archive, self.platform.member, &dest)?;
        Ok(dest)
    }
}

fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(std::env::temp_dir)
        .join(CACHE_APP_DIR)
}

static RESOLVED: OnceLock<PathBuf> = OnceLock::new();

/// `true` when a library is available without downloading.
pub fn is_pdfium_cached() -> bool {
    RESOLVED.get().is_some()
        || LibraryLocator::from_env()
            .map(|l| l.existing().is_some())
            .unwrap_or(false)
}

/// Resolve the library for this process, downloading at most once.
pub fn ensure_pdfium_library(
    on_progress: Option<&dyn Fn(u64, Option<u64>)>,
) -> Result<PathBuf, PdfiumAutoError> {
    if let Some(path) = RESOLVED.get() {
        return Ok(path.clone());
    }
    let path = LibraryLocator::from_env()?.ensure(on_progress)?;
    // Concurrent first callers resolve the same path; losing the race is harmless.
    let _ = RESOLVED.set(path.clone());
    Ok(path)
}

/// Bind to the library at `path` without consulting the cache.
///
/// PDFium's init/destroy are process-global: dropping the returned value
/// tears the library down for every other instance too. Keep one per
/// process.
pub fn bind_pdfium_from_path(path: &Path) -> Result<Pdfium, PdfiumAutoError> {
    Pdfium::bind_to_library(path)
        .map(Pdfium::new)
        .map_err(|e| PdfiumAutoError::Bind {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

fn download(
    url: &str,
    on_progress: Option<&dyn Fn(u64, Option<u64>)>,
) -> Result<Vec<u8>, PdfiumAutoError> {
    let fail = |reason: String| PdfiumAutoError::Download {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("pdfium-auto/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| fail(e.to_string()))?;

    let mut response = client.get(url).send().map_err(|e| fail(e.to_string()))?;
    if !response.status().is_success() {
        return Err(fail(format!("HTTP {}", response.status())));
    }

    let total = response.content_length();
    let mut buf = Vec::with_capacity(total.unwrap_or(32 * 1024 * 1024) as usize);
    let mut chunk = vec![0u8; 64 * 1024];

    loop {
        match response.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if let Some(cb) = on_progress {
                    cb(buf.len() as u64, total);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(fail(e.to_string())),
        }
    }

    Ok(buf)
}

/// Unpack the single archive entry `member` from a `.tgz` into `dest`.
///
/// The entry is streamed into a temp file beside `dest` and renamed into
/// place, so an interrupted extraction never leaves a truncated library at
/// the path [`LibraryLocator::existing`] accepts.
fn extract_member(archive: &[u8], member: &str, dest: &Path) -> Result<(), PdfiumAutoError> {
    let fail = |reason: String| PdfiumAutoError::Extract {
        member: member.to_string(),
        reason,
    };
    let dir = dest
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    let mut tar = tar::Archive::new(flate2::read::GzDecoder::new(archive));
    for entry in tar.entries().map_err(|e| fail(e.to_string()))? {
        let mut entry = entry.map_err(|e| fail(e.to_string()))?;
        let matches = entry
            .path()
            .map(|p| p == Path::new(member))
            .map_err(|e| fail(e.to_string()))?;
        if !matches {
            continue;
        }

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|source| {
            PdfiumAutoError::CacheDir {
                path: dir.to_path_buf(),
                source,
            }
        })?;
        std::io::copy(&mut entry, &mut tmp)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| fail(e.to_string()))?;
        tmp.persist(dest).map_err(|e| fail(e.error.to_string()))?;
        return Ok(());
    }

    Err(fail("not present in archive".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn tgz_with(member: &str, body: &[u8]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::fast()));
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, member, body).unwrap();
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn current_platform_is_supported() {
        Platform::current().expect("test hosts are on a supported platform");
    }

    #[test]
    fn linux_and_windows_layouts() {
        let linux = Platform::for_target("linux", "x86_64").unwrap();
        assert_eq!(linux.member, "lib/libpdfium.so");
        assert!(linux.download_url().ends_with("chromium%2F7690/pdfium-linux-x64.tgz"));

        let win = Platform::for_target("windows", "x86").unwrap();
        assert_eq!(win.file_name, "pdfium.dll");
        assert_eq!(win.member, "bin/pdfium.dll");
    }

    #[test]
    fn unknown_platform_is_rejected() {
        let err = Platform::for_target("plan9", "mips").unwrap_err();
        assert!(err.to_string().contains("plan9/mips"));
    }

    #[test]
    fn cache_dir_is_versioned() {
        let tmp = tempfile::tempdir().unwrap();
        let locator = LibraryLocator::with_cache_root(tmp.path()).unwrap();
        assert!(locator.cache_dir().starts_with(tmp.path()));
        assert!(locator
            .cache_dir()
            .to_string_lossy()
            .ends_with(&format!("pdfium-{PDFIUM_VERSION}")));
    }

    #[test]
    fn existing_finds_cached_library() {
        let tmp = tempfile::tempdir().unwrap();
        let locator = LibraryLocator::with_cache_root(tmp.path()).unwrap();
        assert!(locator.existing().is_none());

        std::fs::create_dir_all(locator.cache_dir()).unwrap();
        std::fs::write(locator.cache_path(), b"stub").unwrap();
        assert_eq!(locator.existing(), Some(locator.cache_path()));
    }

    #[test]
    fn extract_member_writes_only_the_library() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tgz_with("lib/libpdfium.so", b"ELF");
        let dest = tmp.path().join("libpdfium.so");

        extract_member(&archive, "lib/libpdfium.so", &dest).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"ELF");

        let err = extract_member(&archive, "bin/pdfium.dll", &dest).unwrap_err();
        assert!(matches!(err, PdfiumAutoError::Extract { .. }));
    }

    #[test]
    fn truncated_archive_leaves_no_library_behind() {
        let tmp = tempfile::tempdir().unwrap();
        // Poorly compressible body so truncation cuts into the entry data.
        let mut x: u32 = 0x1234_5678;
        let body: Vec<u8> = (0..256 * 1024)
            .map(|_| {
                x = x.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (x >> 24) as u8
            })
            .collect();
        let archive = tgz_with("lib/libpdfium.so", &body);
        let truncated = &archive[..archive.len() / 2];
        let dest = tmp.path().join("libpdfium.so");

        let err = extract_member(truncated, "lib/libpdfium.so", &dest).unwrap_err();
        assert!(matches!(err, PdfiumAutoError::Extract { .. }), "{err:?}");
        assert!(!dest.exists());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }
}
