//! The scan synthesiser: eight effect stages in a fixed order.
//!
//! ```text
//! normalize ─▶ rotate ─▶ contrast/brightness ─▶ blur ─▶ sensor noise
//!     ─▶ paper texture blend ─▶ JPEG round trip ─▶ sharpen
//! ```
//!
//! The order matters: noise is added after the blur so it stays crisp,
//! the paper grain goes in before the lossy codec so it picks up block
//! artefacts like the rest of the page, and the final sharpen exaggerates
//! those artefacts the way scanner firmware does.
//!
//! ## Randomness
//!
//! All random draws for a page come from one generator, in this order:
//! rotation angle, contrast factor, brightness factor, sensor noise
//! (row-major, R/G/B per pixel), paper texture (row-major, R/G/B). With the
//! same parameters, input image and seed the output is bit-identical.
//!
//! Concurrent pages never share a generator: [`page_rng`] derives an
//! independent ChaCha stream from the document seed and the page index, so
//! the result does not depend on which worker finishes first.

use crate::cancel::CancelToken;
use crate::config::ScanParameters;
use crate::error::SynthesisError;
use crate::pipeline::effects;
use image::{DynamicImage, RgbImage};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::time::Instant;
use tracing::trace;

/// The per-page random draws that are not per-pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Jitter {
    pub angle_degrees: f32,
    pub contrast: f32,
    pub brightness: f32,
}

/// Draw the rotation angle, contrast and brightness factors, in that order.
pub fn sample_jitter<R: Rng + ?Sized>(params: &ScanParameters, rng: &mut R) -> Jitter {
    Jitter {
        angle_degrees: uniform(rng, params.rotation_range_degrees),
        contrast: uniform(rng, params.contrast_factor_range),
        brightness: uniform(rng, params.brightness_factor_range),
    }
}

fn uniform<R: Rng + ?Sized>(rng: &mut R, (lo, hi): (f32, f32)) -> f32 {
    // always consume one draw so later stages see the same stream
    let v = rng.gen_range(lo..=hi);
    if lo == hi {
        lo
    } else {
        v
    }
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE5_E9B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Seed of page `page_index` within a document seeded with `document_seed`.
pub fn page_seed(document_seed: u64, page_index: usize) -> u64 {
    splitmix64(document_seed ^ splitmix64(page_index as u64))
}

/// The generator used for page `page_index`.
pub fn page_rng(document_seed: u64, page_index: usize) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(page_seed(document_seed, page_index))
}

/// Run all eight stages on `image`.
///
/// The output has exactly the input's pixel dimensions. Equivalent to
/// [`synthesize_with_cancel`] with a token that is never cancelled.
pub fn synthesize<R: Rng + ?Sized>(
    image: &DynamicImage,
    params: &ScanParameters,
    rng: &mut R,
) -> Result<RgbImage, SynthesisError> {
    synthesize_with_cancel(image, params, rng, &CancelToken::new())
}

/// Run all eight stages, checking `cancel` before each one.
pub fn synthesize_with_cancel<R: Rng + ?Sized>(
    image: &DynamicImage,
    params: &ScanParameters,
    rng: &mut R,
    cancel: &CancelToken,
) -> Result<RgbImage, SynthesisError> {
    params.validate()?;
    if image.width() == 0 || image.height() == 0 {
        return Err(SynthesisError::InvalidParameter {
            name: "image",
            detail: format!("empty {}x{} raster", image.width(), image.height()),
        });
    }

    let jitter = sample_jitter(params, rng);
    trace!(?jitter, "sampled page jitter");

    let mut stage = Stage::new(cancel);

    stage.enter("normalize")?;
    let mut page = effects::normalize_color(image);

    stage.enter("rotate")?;
    page = effects::rotate(&page, jitter.angle_degrees, params.rotation_fill);

    stage.enter("tone")?;
    page = effects::adjust_contrast(&page, jitter.contrast);
    page = effects::adjust_brightness(&page, jitter.brightness);

    stage.enter("blur")?;
    page = effects::gaussian_blur(&page, params.gaussian_blur_radius);

    stage.enter("noise")?;
    page = effects::add_sensor_noise(&page, params.pixel_noise_std_dev, rng)?;

    stage.enter("texture")?;
    let texture = effects::paper_texture(
        page.width(),
        page.height(),
        params.paper_texture_base_color,
        params.texture_noise_std_dev,
        rng,
    )?;
    page = effects::blend(&texture, &page, params.blend_alpha)?;
    drop(texture);

    stage.enter("recompress")?;
    page = effects::recompress_jpeg(&page, params.recompression_quality)?;

    stage.enter("sharpen")?;
    page = effects::sharpen(&page, &params.sharpen_kernel);
    stage.finish();

    Ok(page)
}

/// Cancellation checkpoint plus per-stage timing.
struct Stage<'a> {
    cancel: &'a CancelToken,
    current: Option<(&'static str, Instant)>,
}

impl<'a> Stage<'a> {
    fn new(cancel: &'a CancelToken) -> Self {
        Self {
            cancel,
            current: None,
        }
    }

    fn enter(&mut self, name: &'static str) -> Result<(), SynthesisError> {
        self.finish();
        if self.cancel.is_cancelled() {
            trace!(stage = name, "cancelled before stage");
            return Err(SynthesisError::Cancelled);
        }
        self.current = Some((name, Instant::now()));
        Ok(())
    }

    fn finish(&mut self) {
        if let Some((name, start)) = self.current.take() {
            trace!(stage = name, elapsed_us = start.elapsed().as_micros() as u64, "stage done");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn white_page(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([255, 255, 255])))
    }

    fn text_like_page(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
            if (y / 6) % 3 == 0 && (x / 4) % 5 != 0 {
                Rgb([20, 20, 20])
            } else {
                Rgb([255, 255, 255])
            }
        }))
    }

    fn mean(image: &RgbImage) -> f64 {
        image.as_raw().iter().map(|&v| v as f64).sum::<f64>() / image.as_raw().len() as f64
    }

    #[test]
    fn same_seed_same_output() {
        let page = text_like_page(120, 90);
        let params = ScanParameters::default();
        let a = synthesize(&page, &params, &mut page_rng(7, 0)).unwrap();
        let b = synthesize(&page, &params, &mut page_rng(7, 0)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_pages_get_different_streams() {
        let page = text_like_page(120, 90);
        let params = ScanParameters::default();
        let a = synthesize(&page, &params, &mut page_rng(7, 0)).unwrap();
        let b = synthesize(&page, &params, &mut page_rng(7, 1)).unwrap();
        assert_ne!(a, b);
        assert_ne!(page_seed(7, 0), page_seed(7, 1));
        assert_ne!(page_seed(7, 0), page_seed(8, 0));
    }

    #[test]
    fn dimensions_are_preserved() {
        for (w, h) in [(1, 1), (2, 7), (64, 48), (417, 417)] {
            let out = synthesize(&white_page(w, h), &ScanParameters::default(), &mut page_rng(1, 0))
                .unwrap();
            assert_eq!(out.dimensions(), (w, h));
        }
    }

    #[test]
    fn greyscale_input_becomes_rgb() {
        let grey = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(30, 20, image::Luma([128])));
        let out = synthesize(&grey, &ScanParameters::default(), &mut page_rng(1, 0)).unwrap();
        assert_eq!(out.dimensions(), (30, 20));
    }

    #[test]
    fn flat_page_picks_up_noise() {
        let params = ScanParameters {
            rotation_range_degrees: (0.0, 0.0),
            ..ScanParameters::default()
        };
        let out = synthesize(&white_page(80, 80), &params, &mut page_rng(3, 0)).unwrap();
        let m = mean(&out);
        let var = out
            .as_raw()
            .iter()
            .map(|&v| (v as f64 - m).powi(2))
            .sum::<f64>()
            / out.as_raw().len() as f64;
        assert!(var > 0.0);
    }

    #[test]
    fn white_page_stays_near_toned_white() {
        // No rotation, so no black corners pull the mean down.
        let params = ScanParameters {
            rotation_range_degrees: (0.0, 0.0),
            ..ScanParameters::default()
        };
        let page = white_page(100, 100);
        let mut rng = page_rng(11, 0);
        let jitter = sample_jitter(&params, &mut page_rng(11, 0));
        let out = synthesize(&page, &params, &mut rng).unwrap();

        let expected = (255.0 * jitter.brightness).min(255.0) as f64;
        let m = mean(&out);
        assert!((m - expected).abs() <= 15.0, "mean {m}, expected ≈ {expected}");
    }

    #[test]
    fn jitter_stays_in_range_and_degenerate_ranges_are_exact() {
        let params = ScanParameters::default();
        let mut rng = page_rng(5, 0);
        for _ in 0..200 {
            let j = sample_jitter(&params, &mut rng);
            assert!((-0.5..=0.5).contains(&j.angle_degrees));
            assert!((1.0..=1.2).contains(&j.contrast));
            assert!((0.9..=1.1).contains(&j.brightness));
        }

        let fixed = ScanParameters {
            rotation_range_degrees: (0.25, 0.25),
            contrast_factor_range: (1.0, 1.0),
            brightness_factor_range: (1.0, 1.0),
            ..ScanParameters::default()
        };
        let j = sample_jitter(&fixed, &mut rng);
        assert_eq!(j.angle_degrees, 0.25);
        assert_eq!(j.contrast, 1.0);
        assert_eq!(j.brightness, 1.0);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let params = ScanParameters {
            blend_alpha: 2.0,
            ..ScanParameters::default()
        };
        let err = synthesize(&white_page(10, 10), &params, &mut page_rng(1, 0)).unwrap_err();
        assert!(matches!(
            err,
            SynthesisError::InvalidParameter {
                name: "blend_alpha",
                ..
            }
        ));
    }

    #[test]
    fn empty_raster_is_rejected() {
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 10));
        assert!(synthesize(&empty, &ScanParameters::default(), &mut page_rng(1, 0)).is_err());
    }

    #[test]
    fn cancelled_token_stops_before_first_stage() {
        let token = CancelToken::new();
        token.cancel();
        let err = synthesize_with_cancel(
            &white_page(10, 10),
            &ScanParameters::default(),
            &mut page_rng(1, 0),
            &token,
        )
        .unwrap_err();
        assert!(matches!(err, SynthesisError::Cancelled));
    }
}
