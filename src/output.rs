//! Result types returned by the conversion entry points.

use serde::{Deserialize, Serialize};

/// Physical size of a PDF page in points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl PageSize {
    pub fn new(width_pt: f32, height_pt: f32) -> Self {
        Self {
            width_pt,
            height_pt,
        }
    }

    /// Pixel dimensions of this page rasterised at `dpi`.
    ///
    /// Each axis is `round(points × dpi / 72)`, never less than one pixel.
    pub fn pixel_dimensions(&self, dpi: u32) -> (u32, u32) {
        let scale = dpi as f32 / 72.0;
        let px = |pt: f32| ((pt * scale).round() as u32).max(1);
        (px(self.width_pt), px(self.height_pt))
    }

    /// Like [`pixel_dimensions`](Self::pixel_dimensions), but scaled down
    /// proportionally so that neither edge exceeds `max_pixels`.
    pub fn capped_pixel_dimensions(&self, dpi: u32, max_pixels: u32) -> (u32, u32) {
        let (w, h) = self.pixel_dimensions(dpi);
        let longest = w.max(h);
        if longest <= max_pixels {
            return (w, h);
        }
        let factor = max_pixels as f64 / longest as f64;
        let shrink = |v: u32| ((v as f64 * factor).round() as u32).clamp(1, max_pixels);
        (shrink(w), shrink(h))
    }
}

/// The finished conversion: the scanned PDF plus what happened to each page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOutput {
    /// The complete output PDF.
    #[serde(skip)]
    pub pdf: Vec<u8>,
    /// One entry per page, in document order.
    pub pages: Vec<PageReport>,
    pub stats: ConversionStats,
}

/// What was done to one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageReport {
    /// 0-based page index.
    pub page_index: usize,
    /// Physical size copied to the output page.
    pub size: PageSize,
    /// Raster width in pixels.
    pub pixel_width: u32,
    /// Raster height in pixels.
    pub pixel_height: u32,
    /// Seed of this page's random stream.
    pub seed: u64,
    pub render_ms: u64,
    pub synthesis_ms: u64,
    /// `true` when synthesis failed and the clean raster was embedded.
    pub fallback: bool,
}

/// Aggregate statistics for a conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    pub total_pages: usize,
    /// Pages embedded without scan effects under `FailurePolicy::FallbackToClean`.
    pub fallback_pages: usize,
    /// Document seed; rerun with the same seed to reproduce the output.
    pub seed: u64,
    pub dpi: u32,
    pub output_bytes: usize,
    pub total_duration_ms: u64,
    /// Sum of per-page rasterisation time.
    pub render_duration_ms: u64,
    /// Sum of per-page synthesis time (pages overlap, so this can exceed the wall clock).
    pub synthesis_duration_ms: u64,
}

/// Document information extracted without converting anything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    pub producer: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
    /// Physical size of each page, in document order.
    pub page_sizes: Vec<PageSize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_dimensions_scale_linearly_with_dpi() {
        let page = PageSize::new(100.0, 100.0);
        assert_eq!(page.pixel_dimensions(72), (100, 100));
        assert_eq!(page.pixel_dimensions(144), (200, 200));
        // 100 × 300/72 = 416.67
        assert_eq!(page.pixel_dimensions(300), (417, 417));
    }

    #[test]
    fn a4_at_300_dpi() {
        let a4 = PageSize::new(595.0, 842.0);
        assert_eq!(a4.pixel_dimensions(300), (2479, 3508));
    }

    #[test]
    fn tiny_page_is_at_least_one_pixel() {
        assert_eq!(PageSize::new(0.1, 0.1).pixel_dimensions(72), (1, 1));
    }

    #[test]
    fn cap_keeps_aspect_ratio() {
        let poster = PageSize::new(2384.0, 3370.0); // A0
        let (w, h) = poster.capped_pixel_dimensions(600, 10_000);
        assert_eq!(h, 10_000);
        let ratio = w as f32 / h as f32;
        assert!((ratio - 2384.0 / 3370.0).abs() < 0.001, "ratio {ratio}");
    }

    #[test]
    fn cap_is_noop_when_small() {
        let page = PageSize::new(100.0, 200.0);
        assert_eq!(page.capped_pixel_dimensions(300, 20_000), page.pixel_dimensions(300));
    }
}
