//! Page rasterisation behind the [`PageRasterizer`] trait.
//!
//! The orchestrator only ever talks to the trait; [`PdfiumRasterizer`] is
//! the production implementation. Tests and alternative backends plug in
//! their own type through [`crate::convert::convert_with`].
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which is not safe
//! to call from async contexts. Every function in this module blocks and is
//! meant to be called from a `tokio::task::spawn_blocking` thread. A
//! document is opened, rasterised and closed on that one thread.

use crate::error::{Pdf2ScanError, RasterizeError};
use crate::output::{DocumentInfo, PageSize};
use crate::pipeline::input::PdfSource;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Produces one raster image per page of an open document.
///
/// Indices are 0-based. Implementations must be usable from a single
/// blocking thread; they need not be `Sync`.
pub trait PageRasterizer {
    /// Number of pages in the document.
    fn page_count(&self) -> usize;

    /// Physical size of a page in points.
    fn page_size(&self, index: usize) -> Result<PageSize, RasterizeError>;

    /// Render a page at `dpi`, white background, annotations included.
    fn rasterize(&self, index: usize, dpi: u32) -> Result<DynamicImage, RasterizeError>;
}

/// Bind to a pdfium shared library.
///
/// Lookup order: `PDFIUM_LIB_PATH`, then the working directory, then the
/// system library search path.
pub fn bind_pdfium() -> Result<Pdfium, Pdf2ScanError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => {
            debug!("Binding pdfium from PDFIUM_LIB_PATH={}", path);
            Pdfium::bind_to_library(&path)
        }
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| Pdf2ScanError::PdfiumBindingFailed(e.to_string()))?;
    Ok(Pdfium::new(bindings))
}

/// Open a document, classifying failures as password or corruption errors.
pub fn open_document<'a>(
    pdfium: &'a Pdfium,
    source: PdfSource,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, Pdf2ScanError> {
    let origin = source.origin().to_path_buf();
    let loaded = match source {
        PdfSource::Path(path) => pdfium.load_pdf_from_file(&path, password),
        PdfSource::Bytes { data, .. } => pdfium.load_pdf_from_byte_vec(data, password),
    };
    loaded.map_err(|e| classify_open_error(&origin, password.is_some(), e))
}

fn classify_open_error(path: &Path, had_password: bool, e: PdfiumError) -> Pdf2ScanError {
    let detail = format!("{:?}", e);
    if detail.contains("Password") || detail.contains("password") {
        if had_password {
            Pdf2ScanError::WrongPassword {
                path: path.to_path_buf(),
            }
        } else {
            Pdf2ScanError::PasswordRequired {
                path: path.to_path_buf(),
            }
        }
    } else {
        Pdf2ScanError::CorruptPdf {
            path: path.to_path_buf(),
            detail,
        }
    }
}

/// [`PageRasterizer`] over an open pdfium document.
pub struct PdfiumRasterizer<'a> {
    document: PdfDocument<'a>,
    max_pixels: u32,
}

impl<'a> PdfiumRasterizer<'a> {
    /// `max_pixels` caps the longest rendered edge; see
    /// [`PageSize::capped_pixel_dimensions`].
    pub fn new(document: PdfDocument<'a>, max_pixels: u32) -> Self {
        let rasterizer = Self {
            document,
            max_pixels,
        };
        info!("PDF loaded: {} pages", rasterizer.page_count());
        rasterizer
    }

    fn page(&self, index: usize) -> Result<PdfPage<'a>, RasterizeError> {
        let total = self.page_count();
        if index >= total {
            return Err(RasterizeError::OutOfRange { index, total });
        }
        self.document
            .pages()
            .get(index as u16)
            .map_err(|e| RasterizeError::Backend(format!("{:?}", e)))
    }
}

fn size_of(page: &PdfPage) -> PageSize {
    PageSize::new(page.width().value, page.height().value)
}

impl PageRasterizer for PdfiumRasterizer<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn page_size(&self, index: usize) -> Result<PageSize, RasterizeError> {
        Ok(size_of(&self.page(index)?))
    }

    fn rasterize(&self, index: usize, dpi: u32) -> Result<DynamicImage, RasterizeError> {
        let page = self.page(index)?;
        let (w, h) = size_of(&page).capped_pixel_dimensions(dpi, self.max_pixels);

        let render_config = PdfRenderConfig::new()
            .set_target_width(w as i32)
            .set_target_height(h as i32)
            .render_form_data(true)
            .render_annotations(true);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| RasterizeError::Backend(format!("{:?}", e)))?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            index + 1,
            image.width(),
            image.height()
        );
        Ok(image)
    }
}

/// Read title, author, producer, version and page sizes.
pub fn document_info(document: &PdfDocument) -> DocumentInfo {
    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata
            .get(tag)
            .map(|t| t.value().to_string())
            .filter(|v| !v.is_empty())
    };

    let page_sizes: Vec<PageSize> = document.pages().iter().map(|p| size_of(&p)).collect();

    DocumentInfo {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        page_count: page_sizes.len(),
        pdf_version: format!("{:?}", document.version()),
        page_sizes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn password_errors_are_classified() {
        let path = Path::new("secret.pdf");
        let err = classify_open_error(path, false, PdfiumError::PdfiumLibraryInternalError(
            PdfiumInternalError::PasswordError,
        ));
        assert!(matches!(err, Pdf2ScanError::PasswordRequired { .. }));

        let err = classify_open_error(path, true, PdfiumError::PdfiumLibraryInternalError(
            PdfiumInternalError::PasswordError,
        ));
        assert!(matches!(err, Pdf2ScanError::WrongPassword { .. }));
    }

    #[test]
    fn other_open_errors_are_corruption() {
        let err = classify_open_error(
            Path::new("broken.pdf"),
            false,
            PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::FormatError),
        );
        match err {
            Pdf2ScanError::CorruptPdf { detail, .. } => assert!(detail.contains("FormatError")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn open_document_borrows_owned_password() {
        let Ok(pdfium) = bind_pdfium() else {
            println!("SKIP — pdfium library not available");
            return;
        };
        let password = String::from("hunter2");
        let source = PdfSource::Bytes {
            origin: PathBuf::from("garbage.pdf"),
            data: b"%PDF-1.7\nnot really a pdf".to_vec(),
        };
        let err = open_document(&pdfium, source, Some(password.as_str())).unwrap_err();
        assert!(
            matches!(
                err,
                Pdf2ScanError::CorruptPdf { .. } | Pdf2ScanError::WrongPassword { .. }
            ),
            "got {err:?}"
        );
    }
}
