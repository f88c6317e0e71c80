//! # edgequake-pdf2scan
//!
//! Turn digitally generated PDFs into copies that look like they went
//! through an office scanner.
//!
//! ## Why this crate?
//!
//! Document-AI pipelines (OCR, layout detection, VLM extraction) are usually
//! tested on clean, born-digital PDFs, then meet crooked, noisy, JPEG-mangled
//! scans in production. This crate produces the latter from the former: each
//! page is rasterised, run through a seeded chain of scanner-like
//! degradations, and written back as a full-page image, so the output has the
//! same page count and page sizes as the input but no text layer.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      resolve local file or download from URL
//!  ├─ 2. Render     rasterise pages via pdfium (blocking thread, in order)
//!  ├─ 3. Scan       per page, in parallel:
//!  │                normalize → rotate → contrast/brightness → blur →
//!  │                sensor noise → paper texture → JPEG round trip → sharpen
//!  ├─ 4. Assemble   one full-bleed image per page, strictly in page order
//!  └─ 5. Output     PDF bytes + per-page report + stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2scan::{convert_to_file, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder().dpi(200).seed(42).build()?;
//!     let stats = convert_to_file("document.pdf", "document_scanned.pdf", &config).await?;
//!     eprintln!("{} pages, seed {}", stats.total_pages, stats.seed);
//!     Ok(())
//! }
//! ```
//!
//! Single images can be degraded without any PDF involved:
//!
//! ```rust
//! use edgequake_pdf2scan::{page_rng, synthesize, ScanParameters};
//! use image::{DynamicImage, Rgb, RgbImage};
//!
//! let page = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, Rgb([255, 255, 255])));
//! let scanned = synthesize(&page, &ScanParameters::default(), &mut page_rng(42, 0)).unwrap();
//! assert_eq!(scanned.dimensions(), (64, 64));
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2scan` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdf2scan = { version = "0.1", default-features = false }
//! ```
//!
//! ## Runtime requirement
//!
//! Rendering needs a pdfium shared library at runtime. It is looked up via
//! `PDFIUM_LIB_PATH`, then in the working directory, then on the system
//! library path.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cancel;
pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cancel::CancelToken;
pub use config::{
    ConversionConfig, ConversionConfigBuilder, EmbedEncoding, FailurePolicy, ScanParameters,
};
pub use convert::{
    convert, convert_from_bytes, convert_sync, convert_to_file, convert_with, inspect, write_pdf,
};
pub use error::{PageError, Pdf2ScanError, RasterizeError, ReassemblyError, SynthesisError};
pub use output::{ConversionStats, DocumentInfo, PageReport, PageSize, ScanOutput};
pub use pipeline::assemble::{PageOrder, PdfAssembler};
pub use pipeline::render::{PageRasterizer, PdfiumRasterizer};
pub use pipeline::scan::{page_rng, sample_jitter, synthesize, synthesize_with_cancel, Jitter};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};

/// The in-memory page raster passed between effect stages: 8-bit RGB.
pub type ImageBuffer = image::RgbImage;
