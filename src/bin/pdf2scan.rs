//! CLI binary for edgequake-pdf2scan.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2scan::pipeline::input::is_url;
use edgequake_pdf2scan::{
    convert, inspect, write_pdf, CancelToken, ConversionConfig, ConversionProgressCallback,
    EmbedEncoding, FailurePolicy, ProgressCallback, ScanParameters,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
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

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per page. Pages finish out of order
/// when several are synthesised at once, so start times are keyed by page.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    /// Spinner only; the bar gets its length in `on_conversion_start`.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Scanning");
        self.bar.reset_eta();
    }

    fn take_elapsed(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

fn truncate(msg: &str, max: usize) -> String {
    if msg.chars().count() > max {
        let cut: String = msg.chars().take(max - 1).collect();
        format!("{cut}\u{2026}")
    } else {
        msg.to_string()
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Scanning {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, elapsed_ms: u64) {
        self.take_elapsed(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_page_fallback(&self, page_num: usize, total: usize, error: &str) {
        let secs = self.take_elapsed(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            yellow("↺"),
            page_num,
            total,
            yellow(&format!("clean page kept: {}", truncate(error, 64))),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let secs = self.take_elapsed(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&truncate(error, 80)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.abandon();
    }

    fn on_conversion_complete(&self, total_pages: usize, fallback_pages: usize) {
        self.bar.finish_and_clear();
        if fallback_pages == 0 {
            eprintln!(
                "{} {} pages scanned",
                green("✔"),
                bold(&total_pages.to_string())
            );
        } else {
            eprintln!(
                "{} {} pages scanned  ({} kept clean after errors)",
                cyan("⚠"),
                bold(&total_pages.to_string()),
                yellow(&fallback_pages.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Basic conversion (writes document_scanned.pdf)
  pdf2scan document.pdf

  # Explicit output and resolution
  pdf2scan document.pdf -o scan.pdf --dpi 200

  # Reproducible output
  pdf2scan document.pdf --seed 42

  # Heavier JPEG artefacts, smaller file
  pdf2scan document.pdf --quality 40 --embed jpeg --embed-quality 85

  # Custom scanner profile
  pdf2scan document.pdf --params cheap_scanner.json

  # Convert from URL
  pdf2scan https://arxiv.org/pdf/1706.03762 -o attention_scanned.pdf

  # Inspect PDF metadata only
  pdf2scan --inspect-only document.pdf

SCANNER PROFILE (--params, JSON, every field optional):
  {
    "rotation_range_degrees": [-0.5, 0.5],
    "contrast_factor_range": [1.0, 1.2],
    "brightness_factor_range": [0.9, 1.1],
    "gaussian_blur_radius": 0.5,
    "pixel_noise_std_dev": 5.0,
    "paper_texture_base_color": [250, 250, 250],
    "texture_noise_std_dev": 3.0,
    "blend_alpha": 0.95,
    "recompression_quality": 75,
    "rotation_fill": [0, 0, 0]
  }

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH         Path to an existing libpdfium
  RUST_LOG                Override the log filter (e.g. edgequake_pdf2scan=debug)
  PDF2SCAN_*              Every flag, e.g. PDF2SCAN_DPI=200
"#;

/// Make digital PDFs look scanned.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2scan",
    version,
    about = "Make digitally generated PDFs look like scanned paper",
    long_about = "Rasterise every page of a PDF, add scanner-like skew, tone shifts, blur, \
sensor noise, paper grain and JPEG artefacts, and write a new image-only PDF with the same \
page count and page sizes.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Output PDF path. Default: <input stem>_scanned.pdf.
    #[arg(short, long, env = "PDF2SCAN_OUTPUT")]
    output: Option<PathBuf>,

    /// Rendering DPI (72–600).
    #[arg(short, long, env = "PDF2SCAN_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Document seed for reproducible output. Random when omitted.
    #[arg(long, env = "PDF2SCAN_SEED")]
    seed: Option<u64>,

    /// Number of pages synthesised in parallel. Default: CPU count.
    #[arg(short, long, env = "PDF2SCAN_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Per-page synthesis timeout in seconds.
    #[arg(long, env = "PDF2SCAN_PAGE_TIMEOUT", default_value_t = 300)]
    page_timeout: u64,

    /// JPEG quality of the recompression stage (1–100). Overrides --params.
    #[arg(long, env = "PDF2SCAN_QUALITY",
          value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: Option<u8>,

    /// How page images are stored in the output PDF.
    #[arg(long, env = "PDF2SCAN_EMBED", value_enum, default_value = "lossless")]
    embed: EmbedArg,

    /// JPEG quality for `--embed jpeg` (1–100).
    #[arg(long, env = "PDF2SCAN_EMBED_QUALITY", default_value_t = 90,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    embed_quality: u8,

    /// JSON file with scan-effect parameters.
    #[arg(long, env = "PDF2SCAN_PARAMS")]
    params: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2SCAN_PASSWORD")]
    password: Option<String>,

    /// Keep the clean page when a page's effects fail, instead of aborting.
    #[arg(long, env = "PDF2SCAN_FALLBACK_ON_ERROR")]
    fallback_on_error: bool,

    /// Print PDF metadata only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Print a JSON report (per-page seeds, sizes, timings) on stdout.
    #[arg(long, env = "PDF2SCAN_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2SCAN_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2SCAN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2SCAN_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2SCAN_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum EmbedArg {
    Lossless,
    Jpeg,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar provides all the feedback that matters, so library
    // INFO logs are suppressed while it is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let meta = inspect(&cli.input, cli.password.as_deref())
            .await
            .context("Failed to inspect PDF")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:         {}", cli.input);
            if let Some(ref t) = meta.title {
                println!("Title:        {}", t);
            }
            if let Some(ref a) = meta.author {
                println!("Author:       {}", a);
            }
            println!("Pages:        {}", meta.page_count);
            println!("PDF Version:  {}", meta.pdf_version);
            if let Some(ref p) = meta.producer {
                println!("Producer:     {}", p);
            }
            for (i, size) in meta.page_sizes.iter().enumerate() {
                println!(
                    "  page {:>4}: {:.1} × {:.1} pt",
                    i + 1,
                    size.width_pt,
                    size.height_pt
                );
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };

    let cancel = CancelToken::new();
    let config = build_config(&cli, progress_cb, cancel.clone())?;
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&cli.input));

    // ── Ctrl-C ───────────────────────────────────────────────────────────
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n{} interrupt received, stopping…", yellow("!"));
            cancel.cancel();
        }
    });

    // ── Run conversion ───────────────────────────────────────────────────
    let output = convert(&cli.input, &config)
        .await
        .context("Conversion failed")?;
    let stats = output.stats.clone();
    let report = cli.json.then(|| serde_json::to_string_pretty(&output));
    write_pdf(&output_path, output.pdf)
        .await
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    if let Some(json) = report {
        println!("{}", json.context("Failed to serialise report")?);
    }

    if !cli.quiet {
        eprintln!(
            "{}  {} pages  {}ms  seed {}  →  {}",
            if stats.fallback_pages == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            stats.total_pages,
            stats.total_duration_ms,
            dim(&stats.seed.to_string()),
            bold(&output_path.display().to_string()),
        );
    }

    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(
    cli: &Cli,
    progress: Option<ProgressCallback>,
    cancel: CancelToken,
) -> Result<ConversionConfig> {
    let mut params = match cli.params {
        Some(ref path) => ScanParameters::from_json_file(path)
            .with_context(|| format!("Failed to load scan parameters from {:?}", path))?,
        None => ScanParameters::default(),
    };
    if let Some(q) = cli.quality {
        params.recompression_quality = q;
    }

    let embed = match cli.embed {
        EmbedArg::Lossless => EmbedEncoding::Lossless,
        EmbedArg::Jpeg => EmbedEncoding::Jpeg {
            quality: cli.embed_quality,
        },
    };
    let policy = if cli.fallback_on_error {
        FailurePolicy::FallbackToClean
    } else {
        FailurePolicy::FailFast
    };

    let mut builder = ConversionConfig::builder()
        .dpi(cli.dpi)
        .scan_parameters(params)
        .page_timeout(Duration::from_secs(cli.page_timeout))
        .failure_policy(policy)
        .embed_encoding(embed)
        .download_timeout_secs(cli.download_timeout)
        .cancel_token(cancel);

    if let Some(seed) = cli.seed {
        builder = builder.seed(seed);
    }
    if let Some(n) = cli.concurrency {
        builder = builder.concurrency(n);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// `<stem>_scanned.pdf` next to the input, or in the working directory for URLs.
fn default_output_path(input: &str) -> PathBuf {
    let from_url = is_url(input);
    let name = if from_url {
        input.rsplit('/').find(|s| !s.is_empty()).unwrap_or("document")
    } else {
        input
    };
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("document");
    let file_name = format!("{stem}_scanned.pdf");
    match path.parent() {
        Some(parent) if !from_url && !parent.as_os_str().is_empty() => parent.join(file_name),
        _ => PathBuf::from(file_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_sits_next_to_input() {
        assert_eq!(
            default_output_path("docs/report.pdf"),
            PathBuf::from("docs/report_scanned.pdf")
        );
        assert_eq!(default_output_path("report.pdf"), PathBuf::from("report_scanned.pdf"));
    }

    #[test]
    fn default_output_for_url_uses_last_segment() {
        assert_eq!(
            default_output_path("https://arxiv.org/pdf/1706.03762"),
            PathBuf::from("1706_scanned.pdf")
        );
        assert_eq!(
            default_output_path("https://example.com/files/paper.pdf"),
            PathBuf::from("paper_scanned.pdf")
        );
    }

    #[test]
    fn cli_parses_core_flags() {
        let cli = Cli::try_parse_from([
            "pdf2scan", "in.pdf", "-o", "out.pdf", "-d", "150", "--seed", "7", "--embed", "jpeg",
        ])
        .unwrap();
        assert_eq!(cli.dpi, 150);
        assert_eq!(cli.seed, Some(7));
        let config = build_config(&cli, None, CancelToken::new()).unwrap();
        assert_eq!(config.dpi, 150);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.embed_encoding, EmbedEncoding::Jpeg { quality: 90 });
    }

    #[test]
    fn cli_rejects_out_of_range_dpi() {
        assert!(Cli::try_parse_from(["pdf2scan", "in.pdf", "--dpi", "1200"]).is_err());
    }
}
