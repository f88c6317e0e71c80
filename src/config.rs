//! Configuration types for PDF-to-scan conversion.
//!
//! Two layers of configuration exist:
//!
//! * [`ScanParameters`] — the numeric knobs of the scan-effect pipeline
//!   (rotation range, noise deviations, blend weight, codec quality, …).
//!   Serialisable so alternate "scanner profiles" can live in JSON files.
//! * [`ConversionConfig`] — everything about a whole-document run: DPI,
//!   seed, concurrency, timeouts, failure policy, output encoding, and the
//!   [`ScanParameters`] to apply to every page.
//!
//! `ConversionConfig` is built via its [`ConversionConfigBuilder`], which
//! clamps obviously-out-of-range values and validates the rest in `build()`.

use crate::cancel::CancelToken;
use crate::error::{Pdf2ScanError, SynthesisError};
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// PIL-style "SHARPEN" kernel; its weights sum to 16.
pub const DEFAULT_SHARPEN_KERNEL: [f32; 9] = [-2.0, -2.0, -2.0, -2.0, 32.0, -2.0, -2.0, -2.0, -2.0];

/// Numeric parameters of the scan-effect pipeline.
///
/// The defaults reproduce a lightly misaligned, slightly soft office scanner
/// with visible sensor noise and mild JPEG artefacts.
///
/// # Example
/// ```rust
/// use edgequake_pdf2scan::ScanParameters;
///
/// let params = ScanParameters {
///     pixel_noise_std_dev: 8.0,
///     recompression_quality: 60,
///     ..ScanParameters::default()
/// };
/// assert!(params.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanParameters {
    /// Rotation angle range in degrees, sampled uniformly. Default: ±0.5°.
    pub rotation_range_degrees: (f32, f32),

    /// Contrast factor range, applied around the mean luminance. Default: 1.0–1.2.
    pub contrast_factor_range: (f32, f32),

    /// Brightness factor range, a plain multiplicative scale. Default: 0.9–1.1.
    pub brightness_factor_range: (f32, f32),

    /// Gaussian blur sigma in pixels. `0` disables the stage. Default: 0.5.
    pub gaussian_blur_radius: f32,

    /// Standard deviation of the additive per-channel sensor noise. Default: 5.0.
    pub pixel_noise_std_dev: f32,

    /// Colour of the blank paper showing through the scan. Default: (250, 250, 250).
    pub paper_texture_base_color: [u8; 3],

    /// Standard deviation of the paper texture grain. Default: 3.0.
    pub texture_noise_std_dev: f32,

    /// Weight of the degraded page over the paper texture, in `[0, 1]`. Default: 0.95.
    pub blend_alpha: f32,

    /// JPEG quality (1–100) of the lossy recompression pass. Default: 75.
    pub recompression_quality: u8,

    /// 3×3 sharpen kernel in row-major order, normalised by its sum.
    pub sharpen_kernel: [f32; 9],

    /// Fill colour for canvas corners uncovered by the rotation. Default: black.
    ///
    /// A flatbed scanner with its lid open records dark wedges in exactly
    /// these places; set this to the paper colour for a cleaner look.
    pub rotation_fill: [u8; 3],
}

impl Default for ScanParameters {
    fn default() -> Self {
        Self {
            rotation_range_degrees: (-0.5, 0.5),
            contrast_factor_range: (1.0, 1.2),
            brightness_factor_range: (0.9, 1.1),
            gaussian_blur_radius: 0.5,
            pixel_noise_std_dev: 5.0,
            paper_texture_base_color: [250, 250, 250],
            texture_noise_std_dev: 3.0,
            blend_alpha: 0.95,
            recompression_quality: 75,
            sharpen_kernel: DEFAULT_SHARPEN_KERNEL,
            rotation_fill: [0, 0, 0],
        }
    }
}

impl ScanParameters {
    /// Check every field is inside its legal range.
    pub fn validate(&self) -> Result<(), SynthesisError> {
        check_range("rotation_range_degrees", self.rotation_range_degrees)?;
        check_range("contrast_factor_range", self.contrast_factor_range)?;
        check_range("brightness_factor_range", self.brightness_factor_range)?;
        if self.contrast_factor_range.0 < 0.0 {
            return Err(invalid("contrast_factor_range", "factors must be ≥ 0"));
        }
        if self.brightness_factor_range.0 < 0.0 {
            return Err(invalid("brightness_factor_range", "factors must be ≥ 0"));
        }
        check_deviation("gaussian_blur_radius", self.gaussian_blur_radius)?;
        check_deviation("pixel_noise_std_dev", self.pixel_noise_std_dev)?;
        check_deviation("texture_noise_std_dev", self.texture_noise_std_dev)?;
        if !(0.0..=1.0).contains(&self.blend_alpha) {
            return Err(invalid(
                "blend_alpha",
                format!("must be within 0..=1, got {}", self.blend_alpha),
            ));
        }
        if !(1..=100).contains(&self.recompression_quality) {
            return Err(invalid(
                "recompression_quality",
                format!("must be 1–100, got {}", self.recompression_quality),
            ));
        }
        if self.sharpen_kernel.iter().any(|w| !w.is_finite()) {
            return Err(invalid("sharpen_kernel", "weights must be finite"));
        }
        Ok(())
    }

    /// Load parameters from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Pdf2ScanError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Pdf2ScanError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        let params: ScanParameters = serde_json::from_str(&text).map_err(|e| {
            Pdf2ScanError::InvalidConfig(format!("cannot parse {}: {e}", path.display()))
        })?;
        params
            .validate()
            .map_err(|e| Pdf2ScanError::InvalidConfig(e.to_string()))?;
        Ok(params)
    }
}

fn invalid(name: &'static str, detail: impl Into<String>) -> SynthesisError {
    SynthesisError::InvalidParameter {
        name,
        detail: detail.into(),
    }
}

fn check_range(name: &'static str, (lo, hi): (f32, f32)) -> Result<(), SynthesisError> {
    if !lo.is_finite() || !hi.is_finite() {
        return Err(invalid(name, "bounds must be finite"));
    }
    if lo > hi {
        return Err(invalid(name, format!("lower bound {lo} exceeds upper bound {hi}")));
    }
    Ok(())
}

fn check_deviation(name: &'static str, value: f32) -> Result<(), SynthesisError> {
    if !value.is_finite() || value < 0.0 {
        return Err(invalid(name, format!("must be a finite value ≥ 0, got {value}")));
    }
    Ok(())
}

// ── Document-level configuration ─────────────────────────────────────────

/// Configuration for a PDF-to-scan conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdf2scan::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .dpi(200)
///     .seed(42)
///     .concurrency(4)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Rasterisation DPI. Range: 72–600. Default: 300.
    ///
    /// Output pixel size is `round(points × dpi / 72)` on each axis, so an
    /// A4 page at 300 DPI becomes 2480 × 3508 px.
    pub dpi: u32,

    /// Safety cap on the longest rendered edge in pixels. Default: 20 000.
    ///
    /// An A0 poster at 600 DPI would need a 19 866 × 28 087 px bitmap;
    /// pages beyond the cap are rendered smaller, keeping their aspect ratio.
    /// The physical output page size is unaffected.
    pub max_rendered_pixels: u32,

    /// Scan-effect parameters applied to every page.
    pub scan: ScanParameters,

    /// Document seed. Each page derives its own random stream from this seed
    /// and its index. `None` draws a fresh seed per run (logged, and recorded
    /// in the output stats so a run can be reproduced).
    pub seed: Option<u64>,

    /// Number of pages synthesised in parallel. Default: available cores.
    pub concurrency: usize,

    /// Upper bound on the synthesis time of one page. Default: 300 s.
    pub page_timeout: Duration,

    /// What to do when a page's synthesis fails. Default: [`FailurePolicy::FailFast`].
    pub failure_policy: FailurePolicy,

    /// How page images are compressed inside the output PDF. Default: lossless.
    pub embed_encoding: EmbedEncoding,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Cooperative cancellation. Checked between pages and between stages.
    pub cancel: CancelToken,

    /// Per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            max_rendered_pixels: 20_000,
            scan: ScanParameters::default(),
            seed: None,
            concurrency: default_concurrency(),
            page_timeout: Duration::from_secs(300),
            failure_policy: FailurePolicy::default(),
            embed_encoding: EmbedEncoding::default(),
            password: None,
            download_timeout_secs: 120,
            cancel: CancelToken::new(),
            progress_callback: None,
        }
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("scan", &self.scan)
            .field("seed", &self.seed)
            .field("concurrency", &self.concurrency)
            .field("page_timeout", &self.page_timeout)
            .field("failure_policy", &self.failure_policy)
            .field("embed_encoding", &self.embed_encoding)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn scan_parameters(mut self, params: ScanParameters) -> Self {
        self.config.scan = params;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn page_timeout(mut self, timeout: Duration) -> Self {
        self.config.page_timeout = timeout;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn embed_encoding(mut self, encoding: EmbedEncoding) -> Self {
        self.config.embed_encoding = encoding;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.config.cancel = token;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Pdf2ScanError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(Pdf2ScanError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(Pdf2ScanError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.page_timeout.is_zero() {
            return Err(Pdf2ScanError::InvalidConfig(
                "Page timeout must be > 0".into(),
            ));
        }
        if let EmbedEncoding::Jpeg { quality } = c.embed_encoding {
            if !(1..=100).contains(&quality) {
                return Err(Pdf2ScanError::InvalidConfig(format!(
                    "Embed JPEG quality must be 1–100, got {quality}"
                )));
            }
        }
        c.scan
            .validate()
            .map_err(|e| Pdf2ScanError::InvalidConfig(e.to_string()))?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// What the orchestrator does when a page cannot be synthesised.
///
/// Rasterisation and reassembly failures always abort: without a raster
/// there is nothing to fall back to, and a broken output document cannot be
/// partially trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Abort the whole document on the first failing page. (default)
    #[default]
    FailFast,
    /// Embed the clean, unprocessed raster for a page whose synthesis failed.
    /// The page is flagged in [`crate::output::PageReport::fallback`].
    FallbackToClean,
}

/// How page images are stored in the output PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EmbedEncoding {
    /// zlib-compressed raw RGB (`/FlateDecode`). Bit-exact. (default)
    #[default]
    Lossless,
    /// Baseline JPEG (`/DCTDecode`) at the given quality. Much smaller files,
    /// at the price of a second generation of compression artefacts.
    Jpeg { quality: u8 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_scanner() {
        let p = ScanParameters::default();
        assert_eq!(p.rotation_range_degrees, (-0.5, 0.5));
        assert_eq!(p.contrast_factor_range, (1.0, 1.2));
        assert_eq!(p.brightness_factor_range, (0.9, 1.1));
        assert_eq!(p.gaussian_blur_radius, 0.5);
        assert_eq!(p.pixel_noise_std_dev, 5.0);
        assert_eq!(p.paper_texture_base_color, [250, 250, 250]);
        assert_eq!(p.texture_noise_std_dev, 3.0);
        assert_eq!(p.blend_alpha, 0.95);
        assert_eq!(p.recompression_quality, 75);
        assert_eq!(p.sharpen_kernel.iter().sum::<f32>(), 16.0);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn inverted_range_is_rejected() {
        let p = ScanParameters {
            contrast_factor_range: (1.2, 1.0),
            ..ScanParameters::default()
        };
        let err = p.validate().unwrap_err();
        assert!(err.to_string().contains("contrast_factor_range"));
    }

    #[test]
    fn out_of_range_alpha_and_quality_rejected() {
        let p = ScanParameters {
            blend_alpha: 1.5,
            ..ScanParameters::default()
        };
        assert!(p.validate().is_err());

        let p = ScanParameters {
            recompression_quality: 0,
            ..ScanParameters::default()
        };
        assert!(p.validate().is_err());
    }

    #[test]
    fn negative_noise_rejected() {
        let p = ScanParameters {
            pixel_noise_std_dev: -1.0,
            ..ScanParameters::default()
        };
        assert!(p.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let p: ScanParameters =
            serde_json::from_str(r#"{ "pixel_noise_std_dev": 9.0, "recompression_quality": 40 }"#)
                .unwrap();
        assert_eq!(p.pixel_noise_std_dev, 9.0);
        assert_eq!(p.recompression_quality, 40);
        assert_eq!(p.blend_alpha, 0.95);
    }

    #[test]
    fn json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");
        let params = ScanParameters {
            rotation_range_degrees: (-1.0, 1.0),
            ..ScanParameters::default()
        };
        std::fs::write(&path, serde_json::to_string(&params).unwrap()).unwrap();
        let loaded = ScanParameters::from_json_file(&path).unwrap();
        assert_eq!(loaded, params);
    }

    #[test]
    fn invalid_json_profile_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{ "blend_alpha": 3.0 }"#).unwrap();
        let err = ScanParameters::from_json_file(&path).unwrap_err();
        assert!(matches!(err, Pdf2ScanError::InvalidConfig(_)));
    }

    #[test]
    fn builder_clamps_dpi_and_concurrency() {
        let config = ConversionConfig::builder()
            .dpi(10_000)
            .concurrency(0)
            .build()
            .unwrap();
        assert_eq!(config.dpi, 600);
        assert_eq!(config.concurrency, 1);
    }

    #[test]
    fn builder_defaults() {
        let config = ConversionConfig::builder().build().unwrap();
        assert_eq!(config.dpi, 300);
        assert_eq!(config.seed, None);
        assert_eq!(config.failure_policy, FailurePolicy::FailFast);
        assert_eq!(config.embed_encoding, EmbedEncoding::Lossless);
        assert!(config.concurrency >= 1);
    }

    #[test]
    fn builder_rejects_invalid_scan_parameters() {
        let err = ConversionConfig::builder()
            .scan_parameters(ScanParameters {
                texture_noise_std_dev: f32::NAN,
                ..ScanParameters::default()
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, Pdf2ScanError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_zero_timeout_and_bad_embed_quality() {
        assert!(ConversionConfig::builder()
            .page_timeout(Duration::ZERO)
            .build()
            .is_err());
        assert!(ConversionConfig::builder()
            .embed_encoding(EmbedEncoding::Jpeg { quality: 0 })
            .build()
            .is_err());
    }

    #[test]
    fn debug_redacts_password() {
        let config = ConversionConfig::builder().password("hunter2").build().unwrap();
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("hunter2"));
    }
}
