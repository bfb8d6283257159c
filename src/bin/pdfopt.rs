//! CLI binary for pdf-optimizer.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `OptimizerConfig` and prints the resulting paths.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf_optimizer::{
    optimize, Mode, OptimizeOutput, OptimizerConfig, Outcome, PipelineProgressCallback,
    PipelineStage, ProgressCallback,
};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar per pipeline stage. Items may finish
/// out of order; the bar only counts them.
struct CliProgressCallback {
    bar: Mutex<Option<ProgressBar>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            bar: Mutex::new(None),
            errors: AtomicUsize::new(0),
        })
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(ref bar) = *guard {
                f(bar);
            }
        }
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: PipelineStage, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        let bar = ProgressBar::new(total as u64);
        bar.set_style(style);
        bar.set_prefix(format!("{:<11}", stage.label()));
        bar.enable_steady_tick(Duration::from_millis(80));

        self.errors.store(0, Ordering::SeqCst);
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(old) = guard.replace(bar) {
                old.finish_and_clear();
            }
        }
    }

    fn on_item_complete(&self, _stage: PipelineStage, _item: usize, _total: usize) {
        self.with_bar(|bar| bar.inc(1));
    }

    fn on_item_error(&self, stage: PipelineStage, item: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.with_bar(|bar| {
            bar.println(format!(
                "  {} {} page {:>3}  {}",
                red("✗"),
                stage.label(),
                item,
                red(&msg)
            ));
            bar.inc(1);
        });
    }

    fn on_stage_complete(&self, stage: PipelineStage, total: usize, success_count: usize) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(bar) = guard.take() {
                bar.finish_and_clear();
            }
        }

        let failed = total.saturating_sub(success_count);
        if failed == 0 {
            eprintln!(
                "{} {}  {} pages",
                green("✔"),
                stage.label(),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}  {}/{} pages  ({} failed)",
                red("✘"),
                stage.label(),
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }

    fn on_stage_skipped(&self, stage: PipelineStage) {
        eprintln!("{} {}  {}", cyan("↷"), stage.label(), dim("done in a previous run"));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Try the default filter on one random page of the first PDF in ./input
  pdfopt

  # Full run on a given file
  pdfopt --input scan.pdf --mode output

  # Denoise, then sharpen with the second kernel
  pdfopt -i scan.pdf -m output -o "median_filt(ksize=3), sharpen(kernel=2)"

  # Edge-preserving denoise with custom parameters, higher render DPI
  pdfopt -i scan.pdf -o "bilateral_filt(d=7, sigmaColor=40, sigmaSpace=40)" --dpi 200

FILTERS:
  enhance_text(factor=2.0)                         contrast boost
  median_filt(ksize=5)                             median blur, odd ksize
  bilateral_filt(d=9, sigmaColor=75, sigmaSpace=75) edge-preserving denoise
  gaussian_blur(ksize=3, sigma=0)                  sigma 0 = derived from ksize
  sharpen(kernel=1)                                one of five kernels, 1-5
  conv_filt                                        speckle removal
  super_resolve                                    4x upscale (Real-ESRGAN)

  Filters run left to right. Unknown names are skipped with a warning
  unless --strict-filters is given.

WORKING DIRECTORY:
  <workdir>/<name>/raw/          rasterised pages (page_1.png, ...)
  <workdir>/<name>/processed/    filtered pages
  <workdir>/<name>/output/       reassembled PDF
  <workdir>/<name>/state.txt     stage marker; delete to force re-rasterising

ENVIRONMENT VARIABLES:
  PDFOPT_*                Every flag, e.g. PDFOPT_DPI=150, PDFOPT_OPTION=...
  PDFOPT_UPSCALER         Upscaler executable for super_resolve
  PDFIUM_LIB_PATH         Path to an existing libpdfium — skips auto-download
  PDFIUM_AUTO_CACHE_DIR   Override the default pdfium cache directory
  RUST_LOG                Log filter, e.g. pdf_optimizer=debug

  PDFium (~30 MB) is downloaded automatically on first run and cached in
  ~/.cache/pdf-optimizer/pdfium-7690/.
"#;

/// Rasterise a PDF, filter every page, and reassemble it.
#[derive(Parser, Debug)]
#[command(
    name = "pdfopt",
    version,
    about = "Rasterise a PDF, run an image filter chain over each page, and reassemble it",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input PDF. Default: first PDF found in --input-dir.
    #[arg(short, long, env = "PDFOPT_INPUT")]
    input: Option<PathBuf>,

    /// `test` filters one random page; `output` writes the full PDF.
    #[arg(short, long, env = "PDFOPT_MODE", default_value = "test")]
    mode: String,

    /// Filter chain, e.g. "median_filt(ksize=3), sharpen(kernel=2)".
    #[arg(short = 'o', long = "option", env = "PDFOPT_OPTION", default_value = "enhance_text")]
    option: String,

    /// Directory searched when --input is not given.
    #[arg(long, env = "PDFOPT_INPUT_DIR", default_value = "input")]
    input_dir: PathBuf,

    /// Parent of the per-document job directories.
    #[arg(long, env = "PDFOPT_WORKDIR", default_value = "workdir")]
    workdir: PathBuf,

    /// Rendering DPI (36–600).
    #[arg(long, env = "PDFOPT_DPI", default_value_t = 96,
          value_parser = clap::value_parser!(u32).range(36..=600))]
    dpi: u32,

    /// Width in pixels of every rasterised page.
    #[arg(long, env = "PDFOPT_WIDTH", default_value_t = 1920)]
    width: u32,

    /// Worker pool size for rasterising and filtering.
    #[arg(short, long, env = "PDFOPT_WORKERS", default_value_t = 4)]
    workers: usize,

    /// Resolution (DPI) recorded in the output PDF.
    #[arg(long, env = "PDFOPT_RESOLUTION", default_value_t = 96)]
    resolution: u32,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDFOPT_PASSWORD")]
    password: Option<String>,

    /// Path to an existing libpdfium.
    #[arg(long, env = "PDFOPT_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// Upscaler executable used by super_resolve.
    #[arg(long, env = "PDFOPT_UPSCALER")]
    upscaler: Option<PathBuf>,

    /// Treat unknown filter names as errors.
    #[arg(long, env = "PDFOPT_STRICT_FILTERS")]
    strict_filters: bool,

    /// Persist and skip the filtering and reassembly stages too.
    #[arg(long, env = "PDFOPT_TRACK_ALL_STAGES")]
    track_all_stages: bool,

    /// Disable progress bars.
    #[arg(long, env = "PDFOPT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFOPT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the final paths.
    #[arg(short, long, env = "PDFOPT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bars replace INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let mode: Mode = cli.mode.parse()?;

    // ── Ensure PDFium engine is available ───────────────────────────────────
    if cli.pdfium_lib.is_none() && !pdfium_auto::is_pdfium_cached() {
        ensure_pdfium(cli.quiet)?;
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Run ──────────────────────────────────────────────────────────────
    let output = optimize(
        cli.input.as_deref(),
        &cli.input_dir,
        &cli.workdir,
        mode,
        &config,
    )
    .await
    .context("Optimisation failed")?;

    print_result(&output, cli.quiet);
    Ok(())
}

/// Download PDFium with a byte-level progress bar (silently when quiet).
fn ensure_pdfium(quiet: bool) -> Result<()> {
    if quiet {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
        return Ok(());
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.set_message("Connecting…");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    // block_in_place keeps the callback borrow valid without a 'static bound.
    tokio::task::block_in_place(|| {
        pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
            if let Some(t) = total {
                if bar.length().unwrap_or(0) != t {
                    bar.set_length(t);
                }
            }
            bar.set_position(downloaded);
        }))
    })
    .context("Failed to download PDFium engine")?;

    dl_bar.finish_with_message("ready ✓");
    Ok(())
}

/// Map CLI args to `OptimizerConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<OptimizerConfig> {
    let mut builder = OptimizerConfig::builder()
        .dpi(cli.dpi)
        .target_width(cli.width)
        .workers(cli.workers)
        .resolution(cli.resolution)
        .filters(cli.option.clone())
        .strict_filters(cli.strict_filters)
        .track_all_stages(cli.track_all_stages);

    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_library(lib.clone());
    }
    if let Some(ref up) = cli.upscaler {
        builder = builder.upscaler_command(up.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Final paths go to stdout; the summary line to stderr.
fn print_result(output: &OptimizeOutput, quiet: bool) {
    for path in output.outcome.paths() {
        println!("{}", path.display());
    }
    if quiet {
        return;
    }

    let stats = &output.stats;
    match output.outcome {
        Outcome::Test { .. } => eprintln!(
            "{}  sampled 1 of {} pages  {}ms  →  compare raw vs processed above",
            green("✔"),
            stats.total_pages,
            stats.total_duration_ms,
        ),
        Outcome::Output { ref pdf, pages } => eprintln!(
            "{}  {} pages  {}ms  →  {}",
            green("✔"),
            pages,
            stats.total_duration_ms,
            bold(&pdf.display().to_string()),
        ),
    }
}
