//! Whole-document conversion entry points.
//!
//! ## Execution model
//!
//! ```text
//!  blocking thread            async task                 blocking pool
//! ┌──────────────┐  bounded  ┌─────────────────────┐    ┌──────────────┐
//! │ rasterise p0 │──channel─▶│ buffer_unordered(N) │───▶│ synthesize   │
//! │ rasterise p1 │  (cap N)  │  + per-page timeout │◀───│ + encode     │
//! │ …            │           ├─────────────────────┤    └──────────────┘
//! └──────────────┘           │ PageOrder ─▶ append │
//!                            └─────────────────────┘
//! ```
//!
//! pdfium is driven from a single blocking thread: it opens the document,
//! rasterises pages in order and pushes them into a channel whose capacity
//! is the concurrency limit, so at most ~2N rasters are alive at once. The
//! async side pulls pages, runs up to N syntheses in parallel on the
//! blocking pool, and appends finished pages to the output strictly in page
//! order. The output is only serialised after the last page was appended.
//!
//! Any page failure cancels the run: the producer stops at the next page,
//! in-flight syntheses stop at their next stage boundary, and the partial
//! document is dropped without being written anywhere.

use crate::cancel::CancelToken;
use crate::config::{ConversionConfig, EmbedEncoding, FailurePolicy, ScanParameters};
use crate::error::{PageError, Pdf2ScanError, SynthesisError};
use crate::output::{ConversionStats, DocumentInfo, PageReport, PageSize, ScanOutput};
use crate::pipeline::assemble::{encode_image, EncodedImage, PageOrder, PdfAssembler};
use crate::pipeline::input::{self, PdfSource};
use crate::pipeline::render::{self, PageRasterizer, PdfiumRasterizer};
use crate::pipeline::scan::{page_seed, synthesize_with_cancel};
use crate::progress::ProgressCallback;
use futures::future;
use futures::stream::StreamExt;
use image::DynamicImage;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

/// Convert a PDF file or URL into a scanned-looking PDF.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `input_str` — Local file path or HTTP/HTTPS URL to a PDF
/// * `config` — Conversion configuration
///
/// # Errors
/// Every error is fatal and no output is produced. A failing page is
/// reported as [`Pdf2ScanError::PageFailed`] with its 0-based index, unless
/// [`FailurePolicy::FallbackToClean`] applies.
pub async fn convert(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ScanOutput, Pdf2ScanError> {
    let input_str = input_str.as_ref();
    info!("Starting conversion: {}", input_str);
    let source = input::resolve_input(input_str, config.download_timeout_secs).await?;
    convert_source(source, config).await
}

/// Convert PDF bytes held in memory.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdf2scan::{convert_from_bytes, ConversionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes: Vec<u8> = std::fs::read("document.pdf")?;
/// let output = convert_from_bytes(bytes, &ConversionConfig::default()).await?;
/// std::fs::write("document_scanned.pdf", &output.pdf)?;
/// # Ok(())
/// # }
/// ```
pub async fn convert_from_bytes(
    bytes: impl Into<Vec<u8>>,
    config: &ConversionConfig,
) -> Result<ScanOutput, Pdf2ScanError> {
    let source = PdfSource::from_bytes("<memory>", bytes.into())?;
    convert_source(source, config).await
}

/// Convert pages produced by any [`PageRasterizer`].
///
/// The rasterizer is moved onto a blocking thread and only used from there.
/// This is how alternative rendering backends plug in, and how the pipeline
/// is exercised without a pdfium library.
pub async fn convert_with<R>(
    rasterizer: R,
    config: &ConversionConfig,
) -> Result<ScanOutput, Pdf2ScanError>
where
    R: PageRasterizer + Send + 'static,
{
    run_pipeline(config, move |sink| sink.drive(&rasterizer)).await
}

/// Convert a PDF and write the result to `output_path`.
///
/// The file only appears once the whole document has been converted: the
/// bytes go to a temp file in the destination directory which is then
/// renamed into place.
pub async fn convert_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionStats, Pdf2ScanError> {
    let output = convert(input_str, config).await?;
    write_pdf(output_path, output.pdf).await?;
    Ok(output.stats)
}

/// Atomically write `pdf` to `path`, creating parent directories.
pub async fn write_pdf(path: impl AsRef<Path>, pdf: Vec<u8>) -> Result<(), Pdf2ScanError> {
    let path = path.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || write_atomically(&path, &pdf))
        .await
        .map_err(|e| Pdf2ScanError::Internal(format!("Write task panicked: {}", e)))?
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ScanOutput, Pdf2ScanError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2ScanError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input_str, config))
}

/// Read document information without converting anything.
pub async fn inspect(
    input_str: impl AsRef<str>,
    password: Option<&str>,
) -> Result<DocumentInfo, Pdf2ScanError> {
    let source = input::resolve_input(input_str.as_ref(), 120).await?;
    let password = password.map(str::to_string);
    tokio::task::spawn_blocking(move || {
        let pdfium = render::bind_pdfium()?;
        let document = render::open_document(&pdfium, source, password.as_deref())?;
        Ok(render::document_info(&document))
    })
    .await
    .map_err(|e| Pdf2ScanError::Internal(format!("Metadata task panicked: {}", e)))?
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn convert_source(
    source: PdfSource,
    config: &ConversionConfig,
) -> Result<ScanOutput, Pdf2ScanError> {
    let password = config.password.clone();
    let max_pixels = config.max_rendered_pixels;
    run_pipeline(config, move |sink| {
        let pdfium = render::bind_pdfium()?;
        let document = render::open_document(&pdfium, source, password.as_deref())?;
        let rasterizer = PdfiumRasterizer::new(document, max_pixels);
        sink.drive(&rasterizer)
    })
    .await
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), Pdf2ScanError> {
    let fail = |source: std::io::Error| Pdf2ScanError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(fail)?;
    let mut staging = tempfile::NamedTempFile::new_in(parent).map_err(fail)?;
    staging.write_all(bytes).map_err(fail)?;
    staging.as_file().sync_all().map_err(fail)?;
    staging.persist(path).map_err(|e| fail(e.error))?;
    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

enum RasterEvent {
    Opened { page_count: usize },
    Page(RasterizedPage),
}

struct RasterizedPage {
    index: usize,
    size: PageSize,
    image: Arc<DynamicImage>,
    render_ms: u64,
}

/// Producer end of the raster channel, owned by the blocking thread.
pub(crate) struct PageSink {
    tx: mpsc::Sender<RasterEvent>,
    cancel: CancelToken,
    dpi: u32,
}

impl PageSink {
    /// Rasterise every page in order and hand it to the consumer.
    ///
    /// Returns early without error when the consumer has gone away; the
    /// consumer's error is the one reported.
    fn drive<R: PageRasterizer + ?Sized>(&self, rasterizer: &R) -> Result<(), Pdf2ScanError> {
        if self.cancel.is_cancelled() {
            return Err(Pdf2ScanError::Cancelled);
        }
        let total = rasterizer.page_count();
        if total == 0 {
            return Err(Pdf2ScanError::EmptyDocument);
        }
        if self
            .tx
            .blocking_send(RasterEvent::Opened { page_count: total })
            .is_err()
        {
            return Ok(());
        }

        for index in 0..total {
            if self.cancel.is_cancelled() {
                return Err(Pdf2ScanError::Cancelled);
            }
            let start = Instant::now();
            let size = rasterizer
                .page_size(index)
                .map_err(|e| page_failed(index, e.into()))?;
            let image = rasterizer
                .rasterize(index, self.dpi)
                .map_err(|e| page_failed(index, e.into()))?;
            let page = RasterizedPage {
                index,
                size,
                image: Arc::new(image),
                render_ms: start.elapsed().as_millis() as u64,
            };
            if self.tx.blocking_send(RasterEvent::Page(page)).is_err() {
                return Ok(());
            }
        }
        Ok(())
    }
}

fn page_failed(page_index: usize, cause: PageError) -> Pdf2ScanError {
    Pdf2ScanError::PageFailed { page_index, cause }
}

/// Read-only state shared by all page tasks of one run.
struct PageContext {
    total: usize,
    seed: u64,
    scan: ScanParameters,
    encoding: EmbedEncoding,
    timeout: Duration,
    policy: FailurePolicy,
    cancel: CancelToken,
    progress: Option<ProgressCallback>,
}

struct ProcessedPage {
    report: PageReport,
    image: EncodedImage,
}

/// Consumer-side state that outlives a failed run long enough to report it.
struct Collector {
    total: Option<usize>,
    order: PageOrder<ProcessedPage>,
    assembler: PdfAssembler,
    reports: Vec<PageReport>,
}

async fn run_pipeline<P>(
    config: &ConversionConfig,
    produce: P,
) -> Result<ScanOutput, Pdf2ScanError>
where
    P: FnOnce(&PageSink) -> Result<(), Pdf2ScanError> + Send + 'static,
{
    let total_start = Instant::now();
    let concurrency = config.concurrency.max(1);
    let seed = config.seed.unwrap_or_else(rand::random);
    info!("Document seed: {} (use --seed {} to reproduce)", seed, seed);

    // Scoped to this run: tripping it on failure never touches the caller's token.
    let run_cancel = config.cancel.child_token();

    let (tx, rx) = mpsc::channel(concurrency);
    let sink = PageSink {
        tx,
        cancel: run_cancel.clone(),
        dpi: config.dpi,
    };
    let producer = tokio::task::spawn_blocking(move || produce(&sink));

    let mut collector = Collector {
        total: None,
        order: PageOrder::new(),
        assembler: PdfAssembler::new(),
        reports: Vec::new(),
    };
    let consumed = consume(rx, seed, concurrency, config, &run_cancel, &mut collector).await;
    if consumed.is_err() {
        run_cancel.cancel();
    }
    let produced = producer
        .await
        .map_err(|e| Pdf2ScanError::Internal(format!("Render task panicked: {}", e)))
        .and_then(|r| r);

    if let Err(e) = consumed.and(produced) {
        run_cancel.cancel();
        if let (Some(index), Some(cb)) = (e.page_index(), &config.progress_callback) {
            cb.on_page_error(index + 1, collector.total.unwrap_or(0), &e.to_string());
        }
        warn!("Conversion aborted: {}", e);
        return Err(e);
    }
    if config.cancel.is_cancelled() {
        return Err(Pdf2ScanError::Cancelled);
    }

    let total_pages = collector.total.unwrap_or(0);
    if collector.reports.len() != total_pages || collector.order.pending() != 0 {
        return Err(Pdf2ScanError::Internal(format!(
            "assembled {} of {} pages",
            collector.reports.len(),
            total_pages
        )));
    }

    let pdf = collector
        .assembler
        .finalize()
        .map_err(Pdf2ScanError::FinalizeFailed)?;

    let pages = collector.reports;
    let fallback_pages = pages.iter().filter(|p| p.fallback).count();
    let stats = ConversionStats {
        total_pages,
        fallback_pages,
        seed,
        dpi: config.dpi,
        output_bytes: pdf.len(),
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        render_duration_ms: pages.iter().map(|p| p.render_ms).sum(),
        synthesis_duration_ms: pages.iter().map(|p| p.synthesis_ms).sum(),
    };

    info!(
        "Conversion complete: {} pages ({} fallback), {} bytes, {}ms total",
        total_pages, fallback_pages, stats.output_bytes, stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_complete(total_pages, fallback_pages);
    }

    Ok(ScanOutput { pdf, pages, stats })
}

async fn consume(
    mut rx: mpsc::Receiver<RasterEvent>,
    seed: u64,
    concurrency: usize,
    config: &ConversionConfig,
    cancel: &CancelToken,
    collector: &mut Collector,
) -> Result<(), Pdf2ScanError> {
    let total = match rx.recv().await {
        Some(RasterEvent::Opened { page_count }) => page_count,
        Some(RasterEvent::Page(_)) => {
            return Err(Pdf2ScanError::Internal(
                "page received before document was opened".into(),
            ))
        }
        // producer failed before opening; its error is reported by the caller
        None => return Ok(()),
    };
    collector.total = Some(total);
    info!("PDF has {} pages", total);
    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start(total);
    }

    let ctx = Arc::new(PageContext {
        total,
        seed,
        scan: config.scan.clone(),
        encoding: config.embed_encoding,
        timeout: config.page_timeout,
        policy: config.failure_policy,
        cancel: cancel.clone(),
        progress: config.progress_callback.clone(),
    });

    let mut processed = ReceiverStream::new(rx)
        .filter_map(|event| {
            future::ready(match event {
                RasterEvent::Page(page) => Some(page),
                RasterEvent::Opened { .. } => None,
            })
        })
        .map(|page| process_page(page, Arc::clone(&ctx)))
        .buffer_unordered(concurrency);

    while let Some(result) = processed.next().await {
        let page = result?;
        for (index, ready) in collector.order.push(page.report.page_index, page) {
            collector
                .assembler
                .append_page(ready.report.size, ready.image)
                .map_err(|e| page_failed(index, e.into()))?;
            collector.reports.push(ready.report);
        }
    }
    Ok(())
}

async fn process_page(
    page: RasterizedPage,
    ctx: Arc<PageContext>,
) -> Result<ProcessedPage, Pdf2ScanError> {
    let index = page.index;
    let page_num = index + 1;
    if ctx.cancel.is_cancelled() {
        return Err(Pdf2ScanError::Cancelled);
    }
    if let Some(ref cb) = ctx.progress {
        cb.on_page_start(page_num, ctx.total);
    }

    let seed = page_seed(ctx.seed, index);
    let start = Instant::now();
    let page_cancel = ctx.cancel.child_token();
    let worker = {
        let image = Arc::clone(&page.image);
        let params = ctx.scan.clone();
        let encoding = ctx.encoding;
        let token = page_cancel.clone();
        tokio::task::spawn_blocking(move || -> Result<EncodedImage, PageError> {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let scanned = synthesize_with_cancel(&image, &params, &mut rng, &token)?;
            Ok(encode_image(&scanned, encoding)?)
        })
    };

    let outcome = match tokio::time::timeout(ctx.timeout, worker).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(SynthesisError::Internal(join_err.to_string()).into()),
        Err(_) => {
            page_cancel.cancel();
            Err(SynthesisError::Timeout {
                elapsed_ms: ctx.timeout.as_millis() as u64,
            }
            .into())
        }
    };

    let report = |synthesis_ms: u64, fallback: bool| PageReport {
        page_index: index,
        size: page.size,
        pixel_width: page.image.width(),
        pixel_height: page.image.height(),
        seed,
        render_ms: page.render_ms,
        synthesis_ms,
        fallback,
    };

    match outcome {
        Ok(image) => {
            let elapsed_ms = start.elapsed().as_millis() as u64;
            debug!("Page {} synthesised in {}ms", page_num, elapsed_ms);
            if let Some(ref cb) = ctx.progress {
                cb.on_page_complete(page_num, ctx.total, elapsed_ms);
            }
            Ok(ProcessedPage {
                report: report(elapsed_ms, false),
                image,
            })
        }
        Err(PageError::Synthesis(SynthesisError::Cancelled)) => Err(Pdf2ScanError::Cancelled),
        Err(PageError::Synthesis(err)) if ctx.policy == FailurePolicy::FallbackToClean => {
            if ctx.cancel.is_cancelled() {
                return Err(Pdf2ScanError::Cancelled);
            }
            warn!(
                "Page {}: scan synthesis failed ({}); embedding the clean page",
                page_num, err
            );
            if let Some(ref cb) = ctx.progress {
                cb.on_page_fallback(page_num, ctx.total, &err.to_string());
            }
            let clean = Arc::clone(&page.image);
            let encoding = ctx.encoding;
            let image = tokio::task::spawn_blocking(move || encode_image(&clean.to_rgb8(), encoding))
                .await
                .map_err(|e| Pdf2ScanError::Internal(format!("Encode task panicked: {}", e)))?
                .map_err(|e| page_failed(index, e.into()))?;
            Ok(ProcessedPage {
                report: report(start.elapsed().as_millis() as u64, true),
                image,
            })
        }
        Err(cause) => Err(page_failed(index, cause)),
    }
}
