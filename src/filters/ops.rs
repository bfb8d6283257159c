//! Pixel operations behind the named filters.
//!
//! All operations take and return 8-bit RGB. Convolutions clamp to
//! `0..=255` and replicate edge pixels.

use image::{Rgb, RgbImage};
use imageproc::filter::{filter3x3, gaussian_blur_f32, median_filter};

/// The five sharpening kernels, selected 1-based by `sharpen(kernel=n)`.
/// Each sums to 1, so flat regions keep their brightness.
#[rustfmt::skip]
pub const SHARPEN_KERNELS: [[f32; 9]; 5] = [
    [-1.0, -1.0, -1.0,
     -1.0,  9.0, -1.0,
     -1.0, -1.0, -1.0],
    [ 0.0, -1.0,  0.0,
     -1.0,  5.0, -1.0,
      0.0, -1.0,  0.0],
    [-0.5, -0.75, -0.5,
     -0.75, 6.0, -0.75,
     -0.5, -0.75, -0.5],
    [ 0.0, -0.5,  0.0,
     -0.5,  3.0, -0.5,
      0.0, -0.5,  0.0],
    [ 0.0,  -0.25, 0.0,
     -0.25,  2.0, -0.25,
      0.0,  -0.25, 0.0],
];

/// Laplacian-like kernel used by `conv_filt` to knock out speckles.
#[rustfmt::skip]
pub const SPECKLE_KERNEL: [f32; 9] = [
    1.0,  1.0, 1.0,
    1.0, -6.0, 1.0,
    1.0,  1.0, 1.0,
];

/// Contrast enhancement: blend each pixel away from (factor > 1) or
/// towards (factor < 1) a flat grey at the image's mean luminance.
pub fn enhance_contrast(img: &RgbImage, factor: f32) -> RgbImage {
    let pixels = u64::from(img.width()) * u64::from(img.height());
    if pixels == 0 {
        return img.clone();
    }

    let luma_sum: u64 = img.pixels().map(|p| u64::from(luma(p))).sum();
    let mean = (luma_sum as f64 / pixels as f64 + 0.5).floor() as f32;

    let mut out = img.clone();
    for p in out.pixels_mut() {
        for c in p.0.iter_mut() {
            *c = (mean + factor * (f32::from(*c) - mean)).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// ITU-R 601-2 luma, the grey level contrast is measured against.
fn luma(p: &Rgb<u8>) -> u8 {
    let [r, g, b] = p.0;
    ((u32::from(r) * 299 + u32::from(g) * 587 + u32::from(b) * 114) / 1000) as u8
}

/// Median blur over a `ksize × ksize` window. `ksize` must be odd.
pub fn median_blur(img: &RgbImage, ksize: u32) -> RgbImage {
    let radius = ksize / 2;
    if radius == 0 {
        return img.clone();
    }
    median_filter(img, radius, radius)
}

/// Gaussian blur. A non-positive `sigma` is derived from `ksize` the way
/// OpenCV does it, so `gaussian_blur(ksize=3)` keeps its familiar strength.
pub fn gaussian_blur(img: &RgbImage, ksize: u32, sigma: f32) -> RgbImage {
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
    };
    gaussian_blur_f32(img, sigma)
}

/// 3×3 convolution, row-major kernel, saturating to `u8`.
pub fn convolve3x3(img: &RgbImage, kernel: &[f32; 9]) -> RgbImage {
    filter3x3::<Rgb<u8>, f32, u8>(img, kernel)
}

/// Edge-preserving bilateral filter.
///
/// `d` is the neighbourhood diameter; neighbours further than `d / 2` from
/// the centre are ignored. Range distance is the L1 distance over the three
/// channels, weighted by a Gaussian of `sigma_color`; spatial weight is a
/// Gaussian of `sigma_space`.
pub fn bilateral(img: &RgbImage, d: u32, sigma_color: f32, sigma_space: f32) -> RgbImage {
    let radius = (d / 2) as i64;
    if radius == 0 || img.width() == 0 || img.height() == 0 {
        return img.clone();
    }
    let sigma_color = sigma_color.max(f32::EPSILON);
    let sigma_space = sigma_space.max(f32::EPSILON);

    let color_coeff = -0.5 / (sigma_color * sigma_color);
    let color_weight: Vec<f32> = (0..=3 * 255)
        .map(|i| ((i * i) as f32 * color_coeff).exp())
        .collect();

    let space_coeff = -0.5 / (sigma_space * sigma_space);
    let mut taps: Vec<(i64, i64, f32)> = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let r2 = dx * dx + dy * dy;
            if r2 <= radius * radius {
                taps.push((dx, dy, (r2 as f32 * space_coeff).exp()));
            }
        }
    }

    let (w, h) = (img.width() as i64, img.height() as i64);
    let mut out = RgbImage::new(img.width(), img.height());

    for y in 0..h {
        for x in 0..w {
            let centre = img.get_pixel(x as u32, y as u32).0;
            let mut acc = [0f32; 3];
            let mut norm = 0f32;

            for &(dx, dy, spatial) in &taps {
                let nx = (x + dx).clamp(0, w - 1) as u32;
                let ny = (y + dy).clamp(0, h - 1) as u32;
                let n = img.get_pixel(nx, ny).0;
                let dist: usize = (0..3)
                    .map(|c| (i32::from(n[c]) - i32::from(centre[c])).unsigned_abs() as usize)
                    .sum();
                let wgt = spatial * color_weight[dist];
                for c in 0..3 {
                    acc[c] += wgt * f32::from(n[c]);
                }
                norm += wgt;
            }

            let px = if norm > 0.0 {
                Rgb(acc.map(|v| (v / norm).round().clamp(0.0, 255.0) as u8))
            } else {
                Rgb(centre)
            };
            out.put_pixel(x as u32, y as u32, px);
        }
    }

    out
}
