//! Individual scan-effect stages.
//!
//! Every stage is a pure function: it borrows its input and returns a new
//! buffer of the same dimensions. Randomness is always injected by the
//! caller, so a stage never decides on its own where its entropy comes from.
//!
//! Channel arithmetic is done in `f32`. Tone, noise, texture and blend
//! results are clamped to `0..=255` and truncated towards zero
//! ([`trunc_u8`]); only the sharpen convolution rounds ([`clamp_u8`]).
//! Tone and blend use the interpolation form `a + t·(b − a)`.

use crate::error::SynthesisError;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage};
use imageproc::filter::{filter, gaussian_blur_f32};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use imageproc::kernel::Kernel;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::io::Cursor;

/// Round and clamp a channel value into `u8`.
#[inline]
pub fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Clamp a channel value into `u8`, truncating the fraction.
#[inline]
pub fn trunc_u8(v: f32) -> u8 {
    v.clamp(0.0, 255.0) as u8
}

/// ITU-R 601 luma with integer weights, rounded to the nearest level.
#[inline]
fn luma(p: &Rgb<u8>) -> u32 {
    (p[0] as u32 * 299 + p[1] as u32 * 587 + p[2] as u32 * 114 + 500) / 1000
}

fn map_channels(image: &RgbImage, f: impl Fn(f32) -> f32) -> RgbImage {
    let mut out = image.clone();
    for v in out.iter_mut() {
        *v = trunc_u8(f(*v as f32));
    }
    out
}

fn gaussian(name: &'static str, std_dev: f32) -> Result<Normal<f32>, SynthesisError> {
    Normal::new(0.0, std_dev).map_err(|e| SynthesisError::InvalidParameter {
        name,
        detail: e.to_string(),
    })
}

/// Stage 1: drop alpha, expand greyscale and palette images to 8-bit RGB.
pub fn normalize_color(image: &DynamicImage) -> RgbImage {
    image.to_rgb8()
}

/// Stage 2: rotate by `angle_degrees` about the centre.
///
/// Positive angles turn the page counter-clockwise. The canvas keeps its
/// size, so content leaving the frame is clipped and the uncovered corners
/// are painted with `fill`.
pub fn rotate(image: &RgbImage, angle_degrees: f32, fill: [u8; 3]) -> RgbImage {
    if angle_degrees == 0.0 {
        return image.clone();
    }
    // imageproc turns clockwise for positive theta
    rotate_about_center(
        image,
        -angle_degrees.to_radians(),
        Interpolation::Bicubic,
        Rgb(fill),
    )
}

/// Mean luma of the whole image.
pub fn mean_luminance(image: &RgbImage) -> f32 {
    let count = image.width() as u64 * image.height() as u64;
    if count == 0 {
        return 0.0;
    }
    let sum: u64 = image.pixels().map(|p| luma(p) as u64).sum();
    sum as f32 / count as f32
}

/// Stage 3a: scale distance from the (rounded) mean luma by `factor`.
///
/// `1.0` is the identity; `0.0` collapses the page to flat grey.
pub fn adjust_contrast(image: &RgbImage, factor: f32) -> RgbImage {
    let mean = mean_luminance(image).round();
    map_channels(image, |v| mean + factor * (v - mean))
}

/// Stage 3b: multiply every channel by `factor`.
pub fn adjust_brightness(image: &RgbImage, factor: f32) -> RgbImage {
    map_channels(image, |v| v * factor)
}

/// Stage 4: separable Gaussian blur with standard deviation `sigma`.
///
/// A non-positive sigma is a no-op.
pub fn gaussian_blur(image: &RgbImage, sigma: f32) -> RgbImage {
    if sigma <= 0.0 {
        return image.clone();
    }
    let (w, h) = image.dimensions();
    let blurred: [GrayImage; 3] = std::array::from_fn(|c| {
        let plane = GrayImage::from_fn(w, h, |x, y| Luma([image.get_pixel(x, y)[c]]));
        gaussian_blur_f32(&plane, sigma)
    });
    RgbImage::from_fn(w, h, |x, y| {
        Rgb([
            blurred[0].get_pixel(x, y)[0],
            blurred[1].get_pixel(x, y)[0],
            blurred[2].get_pixel(x, y)[0],
        ])
    })
}

/// Stage 5: add independent N(0, σ²) noise to every channel of every pixel.
///
/// Samples are drawn row-major, R then G then B.
pub fn add_sensor_noise<R: Rng + ?Sized>(
    image: &RgbImage,
    std_dev: f32,
    rng: &mut R,
) -> Result<RgbImage, SynthesisError> {
    let normal = gaussian("pixel_noise_std_dev", std_dev)?;
    let mut out = image.clone();
    for v in out.iter_mut() {
        *v = trunc_u8(*v as f32 + normal.sample(rng));
    }
    Ok(out)
}

/// Stage 6a: a `width × height` sheet of `base` paper with per-channel grain.
pub fn paper_texture<R: Rng + ?Sized>(
    width: u32,
    height: u32,
    base: [u8; 3],
    std_dev: f32,
    rng: &mut R,
) -> Result<RgbImage, SynthesisError> {
    let normal = gaussian("texture_noise_std_dev", std_dev)?;
    let mut sheet = RgbImage::from_pixel(width, height, Rgb(base));
    for v in sheet.iter_mut() {
        *v = trunc_u8(*v as f32 + normal.sample(rng));
    }
    Ok(sheet)
}

/// Stage 6b: `texture × (1 − alpha) + image × alpha`.
pub fn blend(
    texture: &RgbImage,
    image: &RgbImage,
    alpha: f32,
) -> Result<RgbImage, SynthesisError> {
    if texture.dimensions() != image.dimensions() {
        return Err(SynthesisError::Internal(format!(
            "texture is {:?} but page is {:?}",
            texture.dimensions(),
            image.dimensions()
        )));
    }
    let mut out = image.clone();
    for (o, t) in out.iter_mut().zip(texture.as_raw()) {
        let t = *t as f32;
        *o = trunc_u8(t + alpha * (*o as f32 - t));
    }
    Ok(out)
}

/// Stage 7: encode as baseline JPEG at `quality` and decode again.
pub fn recompress_jpeg(image: &RgbImage, quality: u8) -> Result<RgbImage, SynthesisError> {
    let mut buf = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    image.write_with_encoder(encoder)?;
    let decoded = image::load_from_memory_with_format(buf.get_ref(), ImageFormat::Jpeg)?;
    Ok(decoded.to_rgb8())
}

/// Stage 8: 3×3 convolution normalised by the kernel sum.
///
/// A kernel summing to zero is applied unnormalised. The one-pixel border is
/// copied unchanged, as are images narrower or shorter than three pixels.
pub fn sharpen(image: &RgbImage, kernel: &[f32; 9]) -> RgbImage {
    let (w, h) = image.dimensions();
    if w < 3 || h < 3 {
        return image.clone();
    }
    let sum: f32 = kernel.iter().sum();
    let divisor = if sum == 0.0 { 1.0 } else { sum };

    let mut out: RgbImage = filter(image, Kernel::new(kernel.as_slice(), 3, 3), |acc: f32| {
        clamp_u8(acc / divisor)
    });
    // imageproc extends edge pixels; the frame keeps the source values instead
    for x in 0..w {
        out.put_pixel(x, 0, *image.get_pixel(x, 0));
        out.put_pixel(x, h - 1, *image.get_pixel(x, h - 1));
    }
    for y in 1..h - 1 {
        out.put_pixel(0, y, *image.get_pixel(0, y));
        out.put_pixel(w - 1, y, *image.get_pixel(w - 1, y));
    }
    out
}
