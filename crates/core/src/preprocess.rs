//! Tile preprocessing: grayscale, CLAHE, non-local-means denoising
//!
//! Scanned and re-compressed comic pages have flat, washed-out lettering and
//! JPEG speckle around glyph edges. Local contrast enhancement brings the
//! lettering up against its bubble, and patch-based denoising removes the
//! speckle without blurring stroke edges the way a box or gaussian filter
//! would.
//!
//! Both filters follow the classic OpenCV formulations (`createCLAHE`,
//! `fastNlMeansDenoising`) closely enough that parameters tuned for one
//! carry over to the other.

use crate::config::PreprocessConfig;
use image::{GrayImage, RgbImage};
use rayon::prelude::*;
use thiserror::Error;
use tracing::debug;

/// Output rows handled by one denoising job
const DENOISE_BAND_ROWS: usize = 64;

/// Largest accepted NLM patch or search radius
pub const MAX_DENOISE_RADIUS: u32 = 32;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PreprocessError {
    #[error("Cannot preprocess an empty image ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("Invalid preprocessing parameter: {0}")]
    InvalidParameter(String),
}

/// Grayscale + CLAHE + NLM pipeline for one tile
#[derive(Debug, Clone, PartialEq)]
pub struct Preprocessor {
    clip_limit: f32,
    grid_size: u32,
    denoise_strength: f32,
    patch_radius: u32,
    search_radius: u32,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::from_config(&PreprocessConfig::default())
    }
}

impl Preprocessor {
    pub fn from_config(config: &PreprocessConfig) -> Self {
        Self {
            clip_limit: config.clip_limit,
            grid_size: config.grid_size,
            denoise_strength: config.denoise_strength,
            patch_radius: config.patch_radius,
            search_radius: config.search_radius,
        }
    }

    /// Normalize a tile for recognition
    ///
    /// On error the caller should fall back to the unprocessed tile.
    pub fn preprocess(&self, tile: &RgbImage) -> Result<GrayImage, PreprocessError> {
        let (width, height) = tile.dimensions();
        if width == 0 || height == 0 {
            return Err(PreprocessError::EmptyImage { width, height });
        }

        for (name, radius) in [("patch", self.patch_radius), ("search", self.search_radius)] {
            if radius > MAX_DENOISE_RADIUS {
                return Err(PreprocessError::InvalidParameter(format!(
                    "NLM {name} radius {radius} exceeds {MAX_DENOISE_RADIUS}"
                )));
            }
        }

        let gray = image::imageops::grayscale(tile);
        let enhanced = apply_clahe(&gray, self.clip_limit, self.grid_size)?;
        let denoised = denoise_nl_means(
            &enhanced,
            self.denoise_strength,
            self.patch_radius,
            self.search_radius,
        );

        debug!("Preprocessed {}x{} tile", width, height);
        Ok(denoised)
    }
}

/// Contrast-limited adaptive histogram equalization
///
/// The image is split into a `grid_size` x `grid_size` grid of contextual
/// regions. Each region gets a clipped, equalized lookup table. Every pixel
/// is mapped through the four nearest tables, bilinearly weighted by its
/// distance to their region centres.
pub fn apply_clahe(
    image: &GrayImage,
    clip_limit: f32,
    grid_size: u32,
) -> Result<GrayImage, PreprocessError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(PreprocessError::EmptyImage { width, height });
    }
    if grid_size == 0 {
        return Err(PreprocessError::InvalidParameter(
            "CLAHE grid size must be at least 1".to_string(),
        ));
    }
    if !(clip_limit > 0.0) {
        return Err(PreprocessError::InvalidParameter(format!(
            "CLAHE clip limit must be positive, got {clip_limit}"
        )));
    }

    // Never more regions than pixels along an axis
    let tiles_x = grid_size.min(width) as usize;
    let tiles_y = grid_size.min(height) as usize;
    let (w, h) = (width as usize, height as usize);
    let src = image.as_raw();

    let mut luts = vec![[0u8; 256]; tiles_x * tiles_y];
    for ty in 0..tiles_y {
        let (y0, y1) = (ty * h / tiles_y, (ty + 1) * h / tiles_y);
        for tx in 0..tiles_x {
            let (x0, x1) = (tx * w / tiles_x, (tx + 1) * w / tiles_x);

            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for &v in &src[y * w + x0..y * w + x1] {
                    hist[v as usize] += 1;
                }
            }

            let area = ((x1 - x0) * (y1 - y0)) as u32;
            luts[ty * tiles_x + tx] = clipped_equalization(&mut hist, area, clip_limit);
        }
    }

    let tile_w = w as f32 / tiles_x as f32;
    let tile_h = h as f32 / tiles_y as f32;

    // Per-column neighbour indices and weights are the same on every row
    let columns: Vec<(usize, usize, f32)> = (0..w)
        .map(|x| neighbours((x as f32 + 0.5) / tile_w - 0.5, tiles_x))
        .collect();

    let mut out = GrayImage::new(width, height);
    let dst: &mut [u8] = &mut out;
    dst.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let (ty1, ty2, wy) = neighbours((y as f32 + 0.5) / tile_h - 0.5, tiles_y);
        let top = &luts[ty1 * tiles_x..(ty1 + 1) * tiles_x];
        let bottom = &luts[ty2 * tiles_x..(ty2 + 1) * tiles_x];

        for (x, px) in row.iter_mut().enumerate() {
            let v = src[y * w + x] as usize;
            let (tx1, tx2, wx) = columns[x];

            let upper = (1.0 - wx) * f32::from(top[tx1][v]) + wx * f32::from(top[tx2][v]);
            let lower = (1.0 - wx) * f32::from(bottom[tx1][v]) + wx * f32::from(bottom[tx2][v]);
            let mapped = (1.0 - wy) * upper + wy * lower;

            *px = mapped.round().clamp(0.0, 255.0) as u8;
        }
    });

    Ok(out)
}

/// Clip a region histogram, spread the excess, return the equalized LUT
fn clipped_equalization(hist: &mut [u32; 256], area: u32, clip_limit: f32) -> [u8; 256] {
    let clip = ((clip_limit * area as f32 / 256.0) as u32).max(1);

    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > clip {
            excess += *bin - clip;
            *bin = clip;
        }
    }

    let batch = excess / 256;
    let residual = (excess - batch * 256) as usize;
    for bin in hist.iter_mut() {
        *bin += batch;
    }
    if residual > 0 {
        let step = (256 / residual).max(1);
        for bin in hist.iter_mut().step_by(step).take(residual) {
            *bin += 1;
        }
    }

    let scale = 255.0 / area.max(1) as f32;
    let mut lut = [0u8; 256];
    let mut cumulative = 0u32;
    for (entry, &count) in lut.iter_mut().zip(hist.iter()) {
        cumulative += count;
        *entry = (cumulative as f32 * scale).round().min(255.0) as u8;
    }
    lut
}

/// Lower/upper region index and upper weight for a fractional region coordinate
#[inline]
fn neighbours(pos: f32, count: usize) -> (usize, usize, f32) {
    let last = count - 1;
    if pos <= 0.0 {
        return (0, 0, 0.0);
    }
    let lower = pos.floor() as usize;
    if lower >= last {
        return (last, last, 0.0);
    }
    (lower, lower + 1, pos - lower as f32)
}

/// Non-local-means denoising
///
/// Each output pixel is a weighted mean of the pixels in a
/// `(2 * search_radius + 1)^2` window, weighted by
/// `exp(-(mean squared patch distance) / strength^2)` between the
/// `(2 * patch_radius + 1)^2` patches around the two pixels. Patch distances
/// are box sums over a per-offset integral image. Borders are replicated.
///
/// Bands of rows are denoised in parallel. A zero `strength` returns the
/// input unchanged.
pub fn denoise_nl_means(
    image: &GrayImage,
    strength: f32,
    patch_radius: u32,
    search_radius: u32,
) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || !(strength > 0.0) {
        return image.clone();
    }

    let params = NlmParams {
        patch: patch_radius as usize,
        search: search_radius as usize,
        inv_h2: 1.0 / f64::from(strength).powi(2),
        inv_patch_area: 1.0 / ((2 * patch_radius as usize + 1).pow(2)) as f64,
    };
    let padded = Padded::new(image, params.patch + params.search);
    let w = width as usize;

    let mut out = GrayImage::new(width, height);
    let dst: &mut [u8] = &mut out;
    dst.par_chunks_mut(w * DENOISE_BAND_ROWS)
        .enumerate()
        .for_each(|(band, rows)| denoise_band(&padded, &params, band * DENOISE_BAND_ROWS, rows));

    out
}

struct NlmParams {
    patch: usize,
    search: usize,
    inv_h2: f64,
    inv_patch_area: f64,
}

/// Source image with `pad` replicated pixels on every side
struct Padded {
    data: Vec<i32>,
    stride: usize,
    /// Unpadded width
    width: usize,
    pad: usize,
}

impl Padded {
    fn new(image: &GrayImage, pad: usize) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let stride = w + 2 * pad;
        let rows = h + 2 * pad;
        let src = image.as_raw();

        let mut data = Vec::with_capacity(stride * rows);
        for py in 0..rows {
            let y = py.saturating_sub(pad).min(h - 1);
            for px in 0..stride {
                let x = px.saturating_sub(pad).min(w - 1);
                data.push(i32::from(src[y * w + x]));
            }
        }

        Self {
            data,
            stride,
            width: w,
            pad,
        }
    }

    #[inline]
    fn at(&self, x: usize, y: usize) -> i32 {
        self.data[y * self.stride + x]
    }
}

/// Denoise output rows `y0 .. y0 + rows.len() / width`
fn denoise_band(padded: &Padded, params: &NlmParams, y0: usize, rows: &mut [u8]) {
    let w = padded.width;
    let band_h = rows.len() / w;
    let (r, s) = (params.patch, params.search);
    let patch = 2 * r + 1;

    // Patch-centre region: output pixels plus `r` on each side
    let iw = w + 2 * r;
    let ih = band_h + 2 * r;
    let istride = iw + 1;

    let mut integral = vec![0u64; istride * (ih + 1)];
    let mut weight_sum = vec![0f64; w * band_h];
    let mut value_sum = vec![0f64; w * band_h];

    for dy in 0..=2 * s {
        for dx in 0..=2 * s {
            // Region (i, j) sits at padded (i + s, y0 + j + s); its partner is
            // shifted by (dx - s, dy - s)
            for j in 0..ih {
                let mut row_acc = 0u64;
                let py = y0 + j + s;
                for i in 0..iw {
                    let diff = padded.at(i + s, py) - padded.at(i + dx, py + dy - s);
                    row_acc += (diff * diff) as u64;
                    integral[(j + 1) * istride + i + 1] = integral[j * istride + i + 1] + row_acc;
                }
            }

            for y in 0..band_h {
                for x in 0..w {
                    let ssd = integral[(y + patch) * istride + x + patch]
                        + integral[y * istride + x]
                        - integral[y * istride + x + patch]
                        - integral[(y + patch) * istride + x];
                    let distance = ssd as f64 * params.inv_patch_area;
                    let weight = (-distance * params.inv_h2).exp();

                    // Candidate pixel at original (x + dx - s, y0 + y + dy - s)
                    let candidate =
                        padded.at(x + padded.pad + dx - s, y0 + y + padded.pad + dy - s);
                    let k = y * w + x;
                    weight_sum[k] += weight;
                    value_sum[k] += weight * f64::from(candidate);
                }
            }
        }
    }

    for (k, px) in rows.iter_mut().enumerate() {
        // The zero offset always contributes weight 1
        *px = (value_sum[k] / weight_sum[k]).round().clamp(0.0, 255.0) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    fn value_range(image: &GrayImage) -> (u8, u8) {
        let min = image.pixels().map(|p| p[0]).min().unwrap();
        let max = image.pixels().map(|p| p[0]).max().unwrap();
        (min, max)
    }

    fn variance(image: &GrayImage) -> f64 {
        let n = f64::from(image.width() * image.height());
        let mean = image.pixels().map(|p| f64::from(p[0])).sum::<f64>() / n;
        image
            .pixels()
            .map(|p| (f64::from(p[0]) - mean).powi(2))
            .sum::<f64>()
            / n
    }

    #[test]
    fn test_empty_image_rejected() {
        let pre = Preprocessor::default();
        assert_eq!(
            pre.preprocess(&RgbImage::new(0, 10)),
            Err(PreprocessError::EmptyImage {
                width: 0,
                height: 10
            })
        );
    }

    #[test]
    fn test_oversized_radius_rejected() {
        let config = PreprocessConfig {
            search_radius: MAX_DENOISE_RADIUS + 1,
            ..PreprocessConfig::default()
        };
        let result = Preprocessor::from_config(&config).preprocess(&RgbImage::new(8, 8));
        assert!(matches!(result, Err(PreprocessError::InvalidParameter(_))));
    }

    #[test]
    fn test_preprocess_keeps_dimensions() {
        let tile = RgbImage::from_fn(37, 90, |x, y| Rgb([(x * 5) as u8, (y * 2) as u8, 128]));
        let out = Preprocessor::default().preprocess(&tile).unwrap();
        assert_eq!(out.dimensions(), (37, 90));
    }

    #[test]
    fn test_clahe_constant_image_stays_constant() {
        let image = GrayImage::from_pixel(64, 48, Luma([90]));
        let out = apply_clahe(&image, 1.5, 8).unwrap();
        let (min, max) = value_range(&out);
        assert_eq!(min, max);
    }

    #[test]
    fn test_clahe_stretches_low_contrast() {
        let image = GrayImage::from_fn(256, 256, |x, y| Luma([100 + ((x + y) % 20) as u8]));
        let out = apply_clahe(&image, 1.5, 8).unwrap();
        let (min, max) = value_range(&out);
        assert!(max - min > 30, "range {min}..{max} not stretched");
    }

    #[test]
    fn test_clahe_preserves_order_within_region() {
        let image = GrayImage::from_fn(64, 64, |x, _| Luma([(x * 4) as u8]));
        let out = apply_clahe(&image, 1.5, 1).unwrap();
        for x in 1..64 {
            assert!(out.get_pixel(x, 10)[0] >= out.get_pixel(x - 1, 10)[0]);
        }
    }

    #[test]
    fn test_clahe_tiny_image_with_large_grid() {
        let image = GrayImage::from_fn(3, 2, |x, y| Luma([(x * 60 + y * 30) as u8]));
        let out = apply_clahe(&image, 1.5, 8).unwrap();
        assert_eq!(out.dimensions(), (3, 2));
    }

    #[test]
    fn test_clahe_invalid_parameters() {
        let image = GrayImage::new(8, 8);
        assert!(matches!(
            apply_clahe(&image, 1.5, 0),
            Err(PreprocessError::InvalidParameter(_))
        ));
        assert!(matches!(
            apply_clahe(&image, 0.0, 8),
            Err(PreprocessError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_denoise_constant_image_unchanged() {
        let image = GrayImage::from_pixel(70, 130, Luma([200]));
        assert_eq!(denoise_nl_means(&image, 7.0, 3, 5), image);
    }

    #[test]
    fn test_denoise_reduces_speckle() {
        // Deterministic salt-and-pepper-ish noise over a flat background
        let image = GrayImage::from_fn(48, 80, |x, y| {
            let n = (x * 7919 + y * 104_729) % 13;
            Luma([128u8.wrapping_add(n as u8).wrapping_sub(6)])
        });
        let out = denoise_nl_means(&image, 7.0, 3, 5);
        assert_eq!(out.dimensions(), image.dimensions());
        assert!(variance(&out) < variance(&image));
    }

    #[test]
    fn test_denoise_zero_strength_is_identity() {
        let image = GrayImage::from_fn(16, 16, |x, y| Luma([(x * y) as u8]));
        assert_eq!(denoise_nl_means(&image, 0.0, 3, 5), image);
    }

    #[test]
    fn test_denoise_band_edges_are_seamless() {
        // Rows 60..70 straddle the first band edge in the full image but sit
        // inside a single band of the crop starting at row 50
        let image = GrayImage::from_fn(20, 150, |x, y| Luma([((x * 13 + y * 7) % 251) as u8]));
        let full = denoise_nl_means(&image, 7.0, 1, 2);
        let crop = image::imageops::crop_imm(&image, 0, 50, 20, 40).to_image();
        let cropped = denoise_nl_means(&crop, 7.0, 1, 2);
        for y in 60..70 {
            for x in 0..20 {
                assert_eq!(full.get_pixel(x, y), cropped.get_pixel(x, y - 50));
            }
        }
    }
}
