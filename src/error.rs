//! Error types for the edgequake-pdf2scan library.
//!
//! Errors are layered the same way the pipeline is:
//!
//! * [`RasterizeError`], [`SynthesisError`], [`ReassemblyError`] — what went
//!   wrong inside one stage for one page.
//! * [`PageError`] — which stage caused a page to fail.
//! * [`Pdf2ScanError`] — **Fatal**: returned from the top-level `convert*`
//!   functions. A page failure is fatal too: the whole document is abandoned
//!   and reported as [`Pdf2ScanError::PageFailed`] with the 0-based page index.
//!
//! Nothing is retried and no page is silently skipped; callers that want a
//! retry-with-other-parameters policy build it on top.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2scan library.
#[derive(Debug, Error)]
pub enum Pdf2ScanError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The document has no pages, so there is nothing to scan.
    #[error("PDF has no pages; nothing to convert")]
    EmptyDocument,

    // ── Page errors ───────────────────────────────────────────────────────
    /// A page could not be rasterised, synthesised or embedded.
    ///
    /// The conversion was aborted and no output was produced.
    #[error("Page {} failed: {cause}", .page_index + 1)]
    PageFailed {
        /// 0-based index of the failing page.
        page_index: usize,
        #[source]
        cause: PageError,
    },

    /// The assembled document could not be serialised.
    #[error("Failed to finalise output document: {0}")]
    FinalizeFailed(#[source] ReassemblyError),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output PDF file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The run was cancelled through its [`crate::CancelToken`].
    #[error("Conversion cancelled")]
    Cancelled,

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
You can:\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n\
  • Place libpdfium next to the working directory.\n\
  • Install pdfium system-wide (e.g. from bblanchon/pdfium-binaries).\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Pdf2ScanError {
    /// The 0-based index of the page that aborted the run, if any.
    pub fn page_index(&self) -> Option<usize> {
        match self {
            Pdf2ScanError::PageFailed { page_index, .. } => Some(*page_index),
            _ => None,
        }
    }
}

/// The stage that caused a page to fail.
#[derive(Debug, Error)]
pub enum PageError {
    /// Page rasterisation failed.
    #[error("rasterisation failed: {0}")]
    Rasterization(#[from] RasterizeError),

    /// One of the scan-effect stages failed.
    #[error("scan synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    /// The synthesised image could not be embedded in the output.
    #[error("page embedding failed: {0}")]
    Reassembly(#[from] ReassemblyError),
}

/// A page could not be rendered to a raster image.
#[derive(Debug, Clone, Error)]
pub enum RasterizeError {
    /// The requested page does not exist.
    #[error("page index {index} is out of range (document has {total} pages)")]
    OutOfRange { index: usize, total: usize },

    /// The rendering backend rejected the page.
    #[error("{0}")]
    Backend(String),
}

/// A scan-effect stage could not complete.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// A pipeline parameter is outside its legal range.
    #[error("invalid parameter '{name}': {detail}")]
    InvalidParameter { name: &'static str, detail: String },

    /// The lossy codec round trip failed.
    #[error("codec error: {0}")]
    Codec(#[from] image::ImageError),

    /// Synthesis did not finish within the per-page budget.
    #[error("timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// Cancellation was requested between two stages.
    #[error("cancelled")]
    Cancelled,

    /// The worker thread died (panic) before returning.
    #[error("worker failed: {0}")]
    Internal(String),
}

/// The output document could not be built or serialised.
#[derive(Debug, Error)]
pub enum ReassemblyError {
    /// Page dimensions are not positive finite numbers.
    #[error("invalid page size {width} x {height} pt")]
    InvalidPageSize { width: f32, height: f32 },

    /// The image to embed has a zero dimension.
    #[error("cannot embed an empty {width}x{height} image")]
    EmptyImage { width: u32, height: u32 },

    /// Compressing the page image failed.
    #[error("image encoding failed: {0}")]
    Encode(String),

    /// Serialising the PDF failed.
    #[error("PDF write failed: {0}")]
    Write(String),
}
