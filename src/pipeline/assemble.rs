//! Output reassembly: one full-bleed image per page, written with lopdf.
//!
//! Each output page carries the original page's MediaBox and a single image
//! XObject scaled to cover it (`w 0 0 h 0 0 cm /Im0 Do`). Nothing else from
//! the source document is carried over: no text layer, no annotations, no
//! metadata, so the result looks and behaves like a scanner's output.
//!
//! Pages arrive from concurrent workers in any order. [`PageOrder`] holds
//! early arrivals back until every earlier page has been appended, so the
//! output order always matches the input order.

use crate::config::EmbedEncoding;
use crate::error::ReassemblyError;
use crate::output::PageSize;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::collections::BTreeMap;
use std::io::Write;
use tracing::debug;

/// A page image already compressed for embedding.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub width: u32,
    pub height: u32,
    filter: &'static str,
    data: Vec<u8>,
}

impl EncodedImage {
    /// Compressed size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Compress `image` for embedding as a `/DeviceRGB` image XObject.
///
/// Runs on the worker thread so the single-threaded assembler only has to
/// copy bytes.
pub fn encode_image(
    image: &RgbImage,
    encoding: EmbedEncoding,
) -> Result<EncodedImage, ReassemblyError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(ReassemblyError::EmptyImage { width, height });
    }
    let (filter, data) = match encoding {
        EmbedEncoding::Lossless => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder
                .write_all(image.as_raw())
                .map_err(|e| ReassemblyError::Encode(e.to_string()))?;
            let data = encoder
                .finish()
                .map_err(|e| ReassemblyError::Encode(e.to_string()))?;
            ("FlateDecode", data)
        }
        EmbedEncoding::Jpeg { quality } => {
            let mut data = Vec::new();
            let encoder = JpegEncoder::new_with_quality(&mut data, quality);
            image
                .write_with_encoder(encoder)
                .map_err(|e| ReassemblyError::Encode(e.to_string()))?;
            ("DCTDecode", data)
        }
    };
    Ok(EncodedImage {
        width,
        height,
        filter,
        data,
    })
}

/// Builds the output document page by page.
pub struct PdfAssembler {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl Default for PdfAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfAssembler {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    /// Number of pages appended so far.
    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Encode and append `image` as a page of physical size `size`.
    pub fn append_image(
        &mut self,
        size: PageSize,
        image: &RgbImage,
        encoding: EmbedEncoding,
    ) -> Result<(), ReassemblyError> {
        let encoded = encode_image(image, encoding)?;
        self.append_page(size, encoded)
    }

    /// Append a page of physical size `size` covered by `image`.
    pub fn append_page(
        &mut self,
        size: PageSize,
        image: EncodedImage,
    ) -> Result<(), ReassemblyError> {
        let (w, h) = (size.width_pt, size.height_pt);
        if !(w.is_finite() && h.is_finite() && w > 0.0 && h > 0.0) {
            return Err(ReassemblyError::InvalidPageSize {
                width: w,
                height: h,
            });
        }

        let image_id = self.doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => image.width as i64,
                "Height" => image.height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8_i64,
                "Filter" => image.filter,
            },
            image.data,
        ));

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Real(w),
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Real(h),
                        Object::Integer(0),
                        Object::Integer(0),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_bytes = content
            .encode()
            .map_err(|e| ReassemblyError::Write(e.to_string()))?;
        let content_id = self
            .doc
            .add_object(Stream::new(dictionary! {}, content_bytes));

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(w),
                Object::Real(h),
            ],
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
            "Contents" => content_id,
        });
        self.kids.push(page_id.into());
        debug!(
            "Appended page {} ({} x {} pt, {}x{} px)",
            self.kids.len(),
            w,
            h,
            image.width,
            image.height
        );
        Ok(())
    }

    /// Write the page tree and catalog and serialise the document.
    pub fn finalize(mut self) -> Result<Vec<u8>, ReassemblyError> {
        let count = self.kids.len() as i64;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => self.kids,
            "Count" => count,
        };
        self.doc
            .objects
            .insert(self.pages_id, Object::Dictionary(pages));
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        self.doc
            .save_to(&mut buf)
            .map_err(|e| ReassemblyError::Write(e.to_string()))?;
        Ok(buf)
    }
}

/// Reorder buffer keyed by page index.
///
/// [`push`](Self::push) returns the run of items that became contiguous
/// with everything released before, in index order.
#[derive(Debug)]
pub struct PageOrder<T> {
    next: usize,
    pending: BTreeMap<usize, T>,
}

impl<T> Default for PageOrder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PageOrder<T> {
    pub fn new() -> Self {
        Self {
            next: 0,
            pending: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, index: usize, item: T) -> Vec<(usize, T)> {
        self.pending.insert(index, item);
        let mut ready = Vec::new();
        while let Some(item) = self.pending.remove(&self.next) {
            ready.push((self.next, item));
            self.next += 1;
        }
        ready
    }

    /// Index of the next page to be released.
    pub fn next_index(&self) -> usize {
        self.next
    }

    /// Items held back waiting for an earlier page.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
