// ============================================================
// Image Transforms
// ============================================================
// Train:  RandomResizedCrop(size) → RandomHorizontalFlip(0.5)
// Eval:   Resize(shorter side)    → CenterCrop(size)
// Both:   → CHW f32 in [0, 1] → per-channel normalize
//
// Pixel resampling is delegated to image::imageops. Randomness
// is drawn from a caller-supplied Rng so the crop geometry can
// be reproduced in tests.

use image::{
    imageops::{self, FilterType},
    RgbImage,
};
use rand::Rng;

/// ImageNet channel statistics
pub const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const STD: [f32; 3] = [0.229, 0.224, 0.225];

const CROP_SCALE: (f64, f64) = (0.08, 1.0);
const CROP_RATIO: (f64, f64) = (3.0 / 4.0, 4.0 / 3.0);
const CROP_ATTEMPTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Random-resized crop to `size`x`size` plus random horizontal flip
    Train { size: u32 },
    /// Resize the shorter side to `resize`, then center-crop `crop`x`crop`
    Eval { resize: u32, crop: u32 },
}

impl Transform {
    /// Output side length
    pub fn output_size(&self) -> u32 {
        match *self {
            Self::Train { size }    => size,
            Self::Eval { crop, .. } => crop,
        }
    }

    pub fn apply<R: Rng>(&self, image: &RgbImage, rng: &mut R) -> RgbImage {
        match *self {
            Self::Train { size } => {
                let cropped = random_resized_crop(image, size, rng);
                if rng.gen_bool(0.5) {
                    imageops::flip_horizontal(&cropped)
                } else {
                    cropped
                }
            }
            Self::Eval { resize, crop } => center_crop(&resize_shorter(image, resize), crop),
        }
    }
}

/// Crop a random region covering 8%–100% of the area with an aspect
/// ratio in [3/4, 4/3], then resize it to `size`x`size`.
pub fn random_resized_crop<R: Rng>(image: &RgbImage, size: u32, rng: &mut R) -> RgbImage {
    let (x, y, w, h) = crop_box(image.width(), image.height(), rng);
    let region = imageops::crop_imm(image, x, y, w, h).to_image();
    imageops::resize(&region, size, size, FilterType::Triangle)
}

/// Pick the random-resized-crop window `(x, y, w, h)` for an image.
pub fn crop_box<R: Rng>(width: u32, height: u32, rng: &mut R) -> (u32, u32, u32, u32) {
    let area = f64::from(width) * f64::from(height);
    let (log_lo, log_hi) = (CROP_RATIO.0.ln(), CROP_RATIO.1.ln());

    for _ in 0..CROP_ATTEMPTS {
        let target_area = area * rng.gen_range(CROP_SCALE.0..=CROP_SCALE.1);
        let aspect = rng.gen_range(log_lo..=log_hi).exp();

        let w = (target_area * aspect).sqrt().round() as u32;
        let h = (target_area / aspect).sqrt().round() as u32;

        if w > 0 && h > 0 && w <= width && h <= height {
            let x = rng.gen_range(0..=width - w);
            let y = rng.gen_range(0..=height - h);
            return (x, y, w, h);
        }
    }

    // fallback: largest centered window within the ratio bounds
    let in_ratio = f64::from(width) / f64::from(height);
    let (w, h) = if in_ratio < CROP_RATIO.0 {
        (width, ((f64::from(width) / CROP_RATIO.0).round() as u32).min(height))
    } else if in_ratio > CROP_RATIO.1 {
        (((f64::from(height) * CROP_RATIO.1).round() as u32).min(width), height)
    } else {
        (width, height)
    };
    ((width - w) / 2, (height - h) / 2, w, h)
}

/// Resize so the shorter side equals `size`, keeping the aspect ratio
pub fn resize_shorter(image: &RgbImage, size: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    let (nw, nh) = if w <= h {
        (size, ((u64::from(h) * u64::from(size)) / u64::from(w).max(1)) as u32)
    } else {
        (((u64::from(w) * u64::from(size)) / u64::from(h).max(1)) as u32, size)
    };
    imageops::resize(image, nw.max(1), nh.max(1), FilterType::Triangle)
}

/// Center crop to `size`x`size`; images smaller than `size` are
/// upscaled first so the output is always square.
pub fn center_crop(image: &RgbImage, size: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    if w < size || h < size {
        return center_crop(&resize_shorter(image, size), size);
    }
    let x = (w - size) / 2;
    let y = (h - size) / 2;
    imageops::crop_imm(image, x, y, size, size).to_image()
}

/// HWC u8 → normalized CHW f32, appended to `out`
pub fn to_normalized_chw(image: &RgbImage, out: &mut Vec<f32>) {
    let (w, h) = image.dimensions();
    out.reserve(3 * (w * h) as usize);
    for c in 0..3 {
        for y in 0..h {
            for x in 0..w {
                let v = f32::from(image.get_pixel(x, y)[c]) / 255.0;
                out.push((v - MEAN[c]) / STD[c]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use image::Rgb;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_crop_box_stays_inside_image() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let (x, y, w, h) = crop_box(64, 40, &mut rng);
            assert!(w > 0 && h > 0);
            assert!(x + w <= 64 && y + h <= 40);
        }
    }

    #[test]
    fn test_crop_box_fallback_for_extreme_ratio() {
        let mut rng = StdRng::seed_from_u64(0);
        // a 1-pixel-high strip never fits a sampled window
        let (x, y, w, h) = crop_box(400, 1, &mut rng);
        assert_eq!((w, h), (1, 1));
        assert_eq!((x, y), (199, 0));
    }

    #[test]
    fn test_train_and_eval_output_sizes() {
        let img = RgbImage::from_pixel(50, 30, Rgb([10, 20, 30]));
        let mut rng = StdRng::seed_from_u64(1);

        let train = Transform::Train { size: 16 };
        assert_eq!(train.apply(&img, &mut rng).dimensions(), (16, 16));

        let eval = Transform::Eval { resize: 20, crop: 16 };
        assert_eq!(eval.apply(&img, &mut rng).dimensions(), (16, 16));
        assert_eq!(eval.output_size(), 16);
    }

    #[test]
    fn test_resize_shorter_keeps_aspect() {
        let img = RgbImage::new(40, 20);
        assert_eq!(resize_shorter(&img, 10).dimensions(), (20, 10));
        let tall = RgbImage::new(20, 60);
        assert_eq!(resize_shorter(&tall, 10).dimensions(), (10, 30));
    }

    #[test]
    fn test_center_crop_upscales_small_inputs() {
        let img = RgbImage::new(8, 6);
        assert_eq!(center_crop(&img, 12).dimensions(), (12, 12));
    }

    #[test]
    fn test_normalization_is_channel_major() {
        let img = RgbImage::from_pixel(2, 1, Rgb([255, 0, 128]));
        let mut out = Vec::new();
        to_normalized_chw(&img, &mut out);

        assert_eq!(out.len(), 6);
        assert_abs_diff_eq!(out[0], (1.0 - MEAN[0]) / STD[0], epsilon = 1e-6);
        assert_abs_diff_eq!(out[1], out[0], epsilon = 1e-6);
        assert_abs_diff_eq!(out[2], (0.0 - MEAN[1]) / STD[1], epsilon = 1e-6);
        assert_abs_diff_eq!(out[4], (128.0 / 255.0 - MEAN[2]) / STD[2], epsilon = 1e-6);
    }
}
