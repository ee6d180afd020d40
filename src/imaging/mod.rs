//! Image-processing primitives for the watermark pipeline.
//!
//! Greyscale conversion, Otsu thresholding, rectangular dilation, preview
//! resizing and Telea inpainting over `image` buffers.

mod inpaint;

pub use inpaint::inpaint_telea;

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};

use crate::domain::model::Rectangle;
use crate::error::{VidError, VidResult};

/// Mask value marking a watermark pixel
pub const MASK_ON: u8 = 255;

/// Convert an RGB image to 8-bit luma.
///
/// Uses `0.299*R + 0.587*G + 0.114*B`, rounded to nearest.
pub fn to_gray(img: &RgbImage) -> GrayImage {
    let (width, height) = img.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let px = img.get_pixel(x, y);
        let lum = 0.299 * f32::from(px[0]) + 0.587 * f32::from(px[1]) + 0.114 * f32::from(px[2]);
        Luma([lum.round().clamp(0.0, 255.0) as u8])
    })
}

/// Mean over every channel value of the image, in [0, 255]
pub fn mean_intensity(img: &RgbImage) -> f64 {
    let raw = img.as_raw();
    if raw.is_empty() {
        return 0.0;
    }
    let sum: u64 = raw.iter().map(|&v| u64::from(v)).sum();
    sum as f64 / raw.len() as f64
}

/// Copy out a rectangular region; it must lie inside the image
pub fn crop(img: &RgbImage, region: Rectangle) -> VidResult<RgbImage> {
    let (width, height) = img.dimensions();
    if !region.fits_within(width, height) {
        return Err(VidError::RegionOutOfBounds {
            region: region.to_string(),
            frame_width: width,
            frame_height: height,
        });
    }
    Ok(imageops::crop_imm(img, region.x, region.y, region.width, region.height).to_image())
}

/// Global threshold maximising between-class variance (Otsu's method).
///
/// Pixels strictly greater than the returned level belong to the foreground.
/// A single-valued histogram yields 0.
pub fn otsu_threshold(img: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for px in img.pixels() {
        histogram[px[0] as usize] += 1;
    }

    let total = img.pixels().len() as f64;
    if total == 0.0 {
        return 0;
    }

    let mean_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(level, &count)| level as f64 * count as f64)
        .sum::<f64>()
        / total;

    let mut best_level = 0u8;
    let mut best_sigma = 0.0f64;
    let mut weight_low = 0.0f64;
    let mut sum_low = 0.0f64;

    for (level, &count) in histogram.iter().enumerate() {
        let p = count as f64 / total;
        weight_low += p;
        sum_low += level as f64 * p;
        let weight_high = 1.0 - weight_low;

        if weight_low.min(weight_high) < f64::from(f32::EPSILON)
            || weight_low.max(weight_high) > 1.0 - f64::from(f32::EPSILON)
        {
            continue;
        }

        let mean_low = sum_low / weight_low;
        let mean_high = (mean_total - sum_low) / weight_high;
        let sigma = weight_low * weight_high * (mean_low - mean_high).powi(2);
        if sigma > best_sigma {
            best_sigma = sigma;
            best_level = level as u8;
        }
    }

    best_level
}

/// Binarize with Otsu's threshold: above the level becomes `MASK_ON`, the rest 0
pub fn otsu_binarize(img: &GrayImage) -> GrayImage {
    let level = otsu_threshold(img);
    let mut out = img.clone();
    for px in out.pixels_mut() {
        px[0] = if px[0] > level { MASK_ON } else { 0 };
    }
    out
}

/// Dilate with a `kernel`x`kernel` rectangle, repeated `iterations` times.
///
/// The structuring element is anchored at its centre. Pixels outside the
/// image never contribute.
pub fn dilate(mask: &GrayImage, kernel: u32, iterations: u32) -> GrayImage {
    let radius = kernel / 2;
    let mut current = mask.clone();
    for _ in 0..iterations {
        let horizontal = max_filter(&current, radius, true);
        current = max_filter(&horizontal, radius, false);
    }
    current
}

fn max_filter(img: &GrayImage, radius: u32, horizontal: bool) -> GrayImage {
    let (width, height) = img.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let (pos, limit) = if horizontal { (x, width) } else { (y, height) };
        let start = pos.saturating_sub(radius);
        let end = (pos + radius).min(limit.saturating_sub(1));
        let value = (start..=end)
            .map(|p| {
                if horizontal {
                    img.get_pixel(p, y)[0]
                } else {
                    img.get_pixel(x, p)[0]
                }
            })
            .max()
            .unwrap_or(0);
        Luma([value])
    })
}

/// Scale an image to `target_height`, keeping the aspect ratio.
///
/// Returns the resized image and the scale factor `target_height / height`.
pub fn resize_to_height(img: &RgbImage, target_height: u32) -> VidResult<(RgbImage, f64)> {
    let (width, height) = img.dimensions();
    if height == 0 || target_height == 0 {
        return Err(VidError::InvalidArgument(format!(
            "cannot scale a {}x{} image to height {}",
            width, height, target_height
        )));
    }

    let scale = f64::from(target_height) / f64::from(height);
    let target_width = ((f64::from(width) * scale) as u32).max(1);
    let resized = imageops::resize(img, target_width, target_height, FilterType::Triangle);
    Ok((resized, scale))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn bimodal(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Luma([30])
            } else {
                Luma([200])
            }
        })
    }

    #[test]
    fn test_to_gray_weights() {
        let img = RgbImage::from_pixel(2, 2, Rgb([255, 0, 0]));
        assert_eq!(to_gray(&img).get_pixel(0, 0)[0], 76);

        let white = RgbImage::from_pixel(1, 1, Rgb([255, 255, 255]));
        assert_eq!(to_gray(&white).get_pixel(0, 0)[0], 255);
    }

    #[test]
    fn test_mean_intensity() {
        let mut img = RgbImage::from_pixel(2, 1, Rgb([0, 0, 0]));
        img.put_pixel(1, 0, Rgb([60, 60, 60]));
        assert!((mean_intensity(&img) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_otsu_splits_bimodal_histogram() {
        let img = bimodal(10, 4);
        let level = otsu_threshold(&img);
        assert!((30..200).contains(&level));

        let bin = otsu_binarize(&img);
        assert_eq!(bin.get_pixel(0, 0)[0], 0);
        assert_eq!(bin.get_pixel(9, 3)[0], MASK_ON);
    }

    #[test]
    fn test_otsu_uniform_image() {
        let img = GrayImage::from_pixel(5, 5, Luma([90]));
        assert_eq!(otsu_threshold(&img), 0);
        assert!(otsu_binarize(&img).pixels().all(|p| p[0] == MASK_ON));

        let black = GrayImage::new(5, 5);
        assert!(otsu_binarize(&black).pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn test_dilate_single_pixel() {
        let mut mask = GrayImage::new(11, 11);
        mask.put_pixel(5, 5, Luma([MASK_ON]));

        let once = dilate(&mask, 5, 1);
        let on: usize = once.pixels().filter(|p| p[0] == MASK_ON).count();
        assert_eq!(on, 25);
        assert_eq!(once.get_pixel(3, 3)[0], MASK_ON);
        assert_eq!(once.get_pixel(2, 5)[0], 0);

        let twice = dilate(&mask, 5, 2);
        assert_eq!(twice.pixels().filter(|p| p[0] == MASK_ON).count(), 81);
    }

    #[test]
    fn test_dilate_clips_at_border() {
        let mut mask = GrayImage::new(4, 4);
        mask.put_pixel(0, 0, Luma([MASK_ON]));
        let out = dilate(&mask, 5, 1);
        assert_eq!(out.pixels().filter(|p| p[0] == MASK_ON).count(), 9);
    }

    #[test]
    fn test_crop_out_of_bounds() {
        let img = RgbImage::new(20, 20);
        assert!(crop(&img, Rectangle::new(5, 5, 10, 10)).is_ok());
        assert!(matches!(
            crop(&img, Rectangle::new(15, 0, 10, 10)),
            Err(VidError::RegionOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_resize_to_height() {
        let img = RgbImage::new(1920, 1080);
        let (preview, scale) = resize_to_height(&img, 720).unwrap();
        assert_eq!(preview.dimensions(), (1280, 720));
        assert!((scale - 720.0 / 1080.0).abs() < 1e-12);
        assert!(resize_to_height(&img, 0).is_err());
    }
}
