//! Dataset augmentation: flip, brightness, rotation and Gaussian noise.
//!
//! Each input image expands into the original plus one variant per
//! [`Augmentation`], written side by side with a suffix naming the transform.

use crate::io;
use crate::PrepError;
use image::imageops;
use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{rotate, Interpolation};
use imageproc::noise;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};

pub const BRIGHTEN_FACTOR: f32 = 1.2;
pub const DARKEN_FACTOR: f32 = 0.8;
pub const ROTATION_DEGREES: f32 = 5.0;
pub const DEFAULT_NOISE_LEVEL: f32 = 10.0;

/// One output variant of [`DataAugmentor::augment_single`], in write order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Augmentation {
    Original,
    Flip,
    Bright,
    Dark,
    RotatePositive,
    RotateNegative,
    Noise,
}

impl Augmentation {
    pub const ALL: [Augmentation; 7] = [
        Augmentation::Original,
        Augmentation::Flip,
        Augmentation::Bright,
        Augmentation::Dark,
        Augmentation::RotatePositive,
        Augmentation::RotateNegative,
        Augmentation::Noise,
    ];

    /// File name suffix, appended to the stem after an underscore.
    pub fn suffix(self) -> &'static str {
        match self {
            Augmentation::Original => "original",
            Augmentation::Flip => "flip",
            Augmentation::Bright => "bright",
            Augmentation::Dark => "dark",
            Augmentation::RotatePositive => "rotate_p5",
            Augmentation::RotateNegative => "rotate_n5",
            Augmentation::Noise => "noise",
        }
    }
}

/// Mirror left to right.
pub fn flip_horizontal(image: &RgbImage) -> RgbImage {
    imageops::flip_horizontal(image)
}

/// Scale the HSV value channel by `factor` (>1 brighter, <1 darker).
///
/// With hue and saturation fixed, RGB scales linearly with V, so each
/// channel is rescaled by `V' / V` where `V' = trunc(min(V * factor, 255))`.
pub fn adjust_brightness(image: &RgbImage, factor: f32) -> RgbImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let v = pixel.0.iter().copied().max().unwrap_or(0);
        if v == 0 {
            continue;
        }
        let new_v = (v as f32 * factor).clamp(0.0, 255.0).trunc();
        let ratio = new_v / v as f32;
        for c in pixel.0.iter_mut() {
            *c = (*c as f32 * ratio).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Rotate about `(w / 2, h / 2)` keeping the canvas size.
///
/// Positive angles turn counter-clockwise; uncovered corners are black.
pub fn rotate_image(image: &RgbImage, angle_degrees: f32) -> RgbImage {
    let center = ((image.width() / 2) as f32, (image.height() / 2) as f32);
    // imageproc turns clockwise for positive theta.
    rotate(
        image,
        center,
        -angle_degrees.to_radians(),
        Interpolation::Bilinear,
        Rgb([0, 0, 0]),
    )
}

/// Add zero-mean Gaussian noise with standard deviation `level` to every
/// channel. The same `seed` always yields the same noise.
pub fn add_noise(image: &RgbImage, level: f32, seed: u64) -> RgbImage {
    let mut out = image.clone();
    if level <= 0.0 {
        return out;
    }
    noise::gaussian_noise_mut(&mut out, 0.0, f64::from(level), seed);
    out
}

/// Expands images into augmented variants on disk.
pub struct DataAugmentor {
    noise_level: f32,
    rng: StdRng,
}

impl Default for DataAugmentor {
    fn default() -> Self {
        Self::new()
    }
}

impl DataAugmentor {
    pub fn new() -> Self {
        Self {
            noise_level: DEFAULT_NOISE_LEVEL,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic noise, for reproducible datasets.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            noise_level: DEFAULT_NOISE_LEVEL,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn noise_level(mut self, level: f32) -> Self {
        self.noise_level = level;
        self
    }

    pub fn apply(&mut self, augmentation: Augmentation, image: &RgbImage) -> RgbImage {
        match augmentation {
            Augmentation::Original => image.clone(),
            Augmentation::Flip => flip_horizontal(image),
            Augmentation::Bright => adjust_brightness(image, BRIGHTEN_FACTOR),
            Augmentation::Dark => adjust_brightness(image, DARKEN_FACTOR),
            Augmentation::RotatePositive => rotate_image(image, ROTATION_DEGREES),
            Augmentation::RotateNegative => rotate_image(image, -ROTATION_DEGREES),
            Augmentation::Noise => add_noise(image, self.noise_level, self.rng.gen()),
        }
    }

    /// Write `<stem>_<suffix><ext>` into `output_dir` for every augmentation.
    ///
    /// Returns the written paths; an unreadable input yields an empty list.
    pub fn augment_single(
        &mut self,
        path: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
    ) -> Result<Vec<PathBuf>, PrepError> {
        let (path, output_dir) = (path.as_ref(), output_dir.as_ref());
        let Some(image) = io::load_image(path) else {
            return Ok(Vec::new());
        };
        io::ensure_dir(output_dir)?;

        let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let mut written = Vec::with_capacity(Augmentation::ALL.len());
        for augmentation in Augmentation::ALL {
            let variant = self.apply(augmentation, &image);
            let out = output_dir.join(format!("{stem}_{}{ext}", augmentation.suffix()));
            io::save_image(&variant, &out)?;
            tracing::debug!(path = %out.display(), "variant written");
            written.push(out);
        }

        tracing::info!(path = %path.display(), variants = written.len(), "image augmented");
        Ok(written)
    }

    /// Augment every image in `input_dir`; returns the number of files written.
    pub fn augment_batch(
        &mut self,
        input_dir: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
    ) -> Result<usize, PrepError> {
        let (input_dir, output_dir) = (input_dir.as_ref(), output_dir.as_ref());
        let files = io::list_images(input_dir)?;
        let total = files.len();
        tracing::info!(
            dir = %input_dir.display(),
            total,
            per_image = Augmentation::ALL.len(),
            "batch augmentation started"
        );

        let mut generated = 0;
        for (i, name) in files.iter().enumerate() {
            tracing::info!(file = %name, index = i + 1, total, "augmenting");
            generated += self.augment_single(input_dir.join(name), output_dir)?.len();
        }

        tracing::info!(generated, dir = %output_dir.display(), "batch augmentation finished");
        Ok(generated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([(x * 10) as u8, (y * 10) as u8, 50]))
    }

    #[test]
    fn test_suffixes_unique() {
        let mut suffixes: Vec<_> = Augmentation::ALL.iter().map(|a| a.suffix()).collect();
        suffixes.sort();
        suffixes.dedup();
        assert_eq!(suffixes.len(), Augmentation::ALL.len());
        assert_eq!(Augmentation::ALL[0], Augmentation::Original);
    }

    #[test]
    fn test_flip_horizontal() {
        let image = gradient(5, 2);
        let flipped = flip_horizontal(&image);
        assert_eq!(flipped.get_pixel(0, 1), image.get_pixel(4, 1));
        assert_eq!(flip_horizontal(&flipped), image);
    }

    #[test]
    fn test_brightness_scales_value() {
        let image = RgbImage::from_pixel(1, 1, Rgb([100, 50, 0]));
        let bright = adjust_brightness(&image, 1.2);
        assert_eq!(bright.get_pixel(0, 0), &Rgb([120, 60, 0]));
        let dark = adjust_brightness(&image, 0.8);
        assert_eq!(dark.get_pixel(0, 0), &Rgb([80, 40, 0]));
    }

    #[test]
    fn test_brightness_clips_at_white() {
        let image = RgbImage::from_pixel(1, 1, Rgb([250, 100, 10]));
        let bright = adjust_brightness(&image, 1.2);
        let p = bright.get_pixel(0, 0);
        assert_eq!(p[0], 255);
        // Hue is preserved: the other channels scale by 255 / 250.
        assert_eq!(p[1], 102);
    }

    #[test]
    fn test_brightness_black_stays_black() {
        let image = RgbImage::new(2, 2);
        assert_eq!(adjust_brightness(&image, 1.2), image);
    }

    #[test]
    fn test_rotate_keeps_size() {
        let image = gradient(20, 10);
        assert_eq!(rotate_image(&image, 5.0).dimensions(), (20, 10));
    }

    #[test]
    fn test_rotate_positive_is_counter_clockwise() {
        // A marker right of center moves above center after a 90° turn.
        let mut image = RgbImage::new(11, 11);
        image.put_pixel(9, 5, Rgb([255, 255, 255]));
        let rotated = rotate_image(&image, 90.0);
        assert!(rotated.get_pixel(5, 1)[0] > 200);
        assert!(rotated.get_pixel(5, 9)[0] < 50);
    }

    #[test]
    fn test_rotate_corners_black() {
        let image = RgbImage::from_pixel(40, 40, Rgb([200, 200, 200]));
        let rotated = rotate_image(&image, 45.0);
        assert_eq!(rotated.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(rotated.get_pixel(20, 20), &Rgb([200, 200, 200]));
    }

    #[test]
    fn test_noise_non_positive_level_is_identity() {
        let image = gradient(8, 8);
        assert_eq!(add_noise(&image, 0.0, 7), image);
        assert_eq!(add_noise(&image, -5.0, 7), image);
    }

    #[test]
    fn test_noise_statistics() {
        let image = RgbImage::from_pixel(100, 100, Rgb([128, 128, 128]));
        let noisy = add_noise(&image, 10.0, 42);

        let values: Vec<f32> = noisy.iter().map(|&v| v as f32).collect();
        let n = values.len() as f32;
        let mean = values.iter().sum::<f32>() / n;
        let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n).sqrt();

        // Truncation toward zero shifts the mean by about half a level.
        assert!((mean - 127.5).abs() < 1.0, "mean = {mean}");
        assert!((std - 10.0).abs() < 1.0, "std = {std}");
        assert_ne!(noisy, image);
    }

    #[test]
    fn test_noise_depends_only_on_seed() {
        let image = RgbImage::from_pixel(16, 16, Rgb([128, 128, 128]));
        assert_eq!(add_noise(&image, 20.0, 9), add_noise(&image, 20.0, 9));
        assert_ne!(add_noise(&image, 20.0, 9), add_noise(&image, 20.0, 10));
    }

    #[test]
    fn test_seeded_noise_is_reproducible() {
        let image = gradient(8, 8);
        let a = DataAugmentor::with_seed(3).apply(Augmentation::Noise, &image);
        let b = DataAugmentor::with_seed(3).apply(Augmentation::Noise, &image);
        assert_eq!(a, b);
    }

    #[test]
    fn test_augment_single_unreadable() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("out");
        let written = DataAugmentor::with_seed(1)
            .augment_single(dir.path().join("missing.jpg"), &out)
            .unwrap();
        assert!(written.is_empty());
        assert!(!out.exists());
    }
}
