//! Square face crops: margin expansion, black padding and resize.

use crate::io;
use crate::PrepError;
use facekit_core::{BoundingBox, FaceAnalysis};
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::path::Path;

pub const DEFAULT_OUTPUT_SIZE: u32 = 512;
/// Fraction of the box width/height added on each side.
pub const DEFAULT_MARGIN: f32 = 0.2;
/// File name prefix for batch outputs.
pub const ALIGNED_PREFIX: &str = "aligned_";

/// Pixel rectangle `[x1, x2) × [y1, y2)` inside an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl CropRect {
    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// Grow a face box by `margin` of its size on every side, clamped to the image.
///
/// Box coordinates are truncated to whole pixels before expanding.
pub fn expand_with_margin(bbox: &BoundingBox, margin: f32, width: u32, height: u32) -> CropRect {
    let (x1, y1) = (bbox.x as i64, bbox.y as i64);
    let (x2, y2) = (bbox.x2() as i64, bbox.y2() as i64);
    let (w, h) = ((x2 - x1) as f32, (y2 - y1) as f32);

    let clamp_x = |v: f32| (v as i64).clamp(0, width as i64) as u32;
    let clamp_y = |v: f32| (v as i64).clamp(0, height as i64) as u32;

    CropRect {
        x1: clamp_x(x1 as f32 - w * margin),
        y1: clamp_y(y1 as f32 - h * margin),
        x2: clamp_x(x2 as f32 + w * margin),
        y2: clamp_y(y2 as f32 + h * margin),
    }
}

/// Center `image` on a black square canvas whose side is its longer edge.
///
/// The short axis gets `diff / 2` pixels before and the remainder after.
pub fn pad_to_square(image: &RgbImage) -> RgbImage {
    let (w, h) = image.dimensions();
    if w == h {
        return image.clone();
    }
    let side = w.max(h);
    let mut canvas = RgbImage::new(side, side);
    imageops::replace(&mut canvas, image, ((side - w) / 2) as i64, ((side - h) / 2) as i64);
    canvas
}

/// Outcome of [`FaceAligner::batch_align`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
}

/// Crops the dominant face of an image into a fixed-size square.
pub struct FaceAligner<A> {
    analysis: A,
    output_size: u32,
    margin: f32,
}

impl<A: FaceAnalysis> FaceAligner<A> {
    pub fn new(analysis: A, output_size: u32) -> Self {
        Self {
            analysis,
            output_size,
            margin: DEFAULT_MARGIN,
        }
    }

    pub fn with_margin(mut self, margin: f32) -> Self {
        self.margin = margin;
        self
    }

    pub fn output_size(&self) -> u32 {
        self.output_size
    }

    /// Crop, square and resize the highest-confidence face of `image`.
    ///
    /// `None` when no face is found or the expanded box falls outside the image.
    pub fn align_image(&mut self, image: &RgbImage) -> Result<Option<RgbImage>, PrepError> {
        let faces = self.analysis.analyze(image)?;
        let Some(face) = faces.first() else {
            tracing::warn!("no face detected");
            return Ok(None);
        };

        let rect = expand_with_margin(&face.bbox, self.margin, image.width(), image.height());
        if rect.is_empty() {
            tracing::warn!(?rect, "face box lies outside the image");
            return Ok(None);
        }

        let crop =
            imageops::crop_imm(image, rect.x1, rect.y1, rect.width(), rect.height()).to_image();
        let square = pad_to_square(&crop);
        Ok(Some(imageops::resize(
            &square,
            self.output_size,
            self.output_size,
            FilterType::Triangle,
        )))
    }

    /// Align the face in the image at `path`, optionally saving the result.
    ///
    /// An unreadable image or an image without a face yields `None`.
    pub fn align_face(
        &mut self,
        path: impl AsRef<Path>,
        output: Option<&Path>,
    ) -> Result<Option<RgbImage>, PrepError> {
        let path = path.as_ref();
        let Some(image) = io::load_image(path) else {
            return Ok(None);
        };
        let Some(aligned) = self.align_image(&image)? else {
            tracing::warn!(path = %path.display(), "alignment skipped");
            return Ok(None);
        };
        tracing::info!(path = %path.display(), size = self.output_size, "face aligned");

        if let Some(output) = output {
            io::save_image(&aligned, output)?;
            tracing::info!(path = %output.display(), "aligned face saved");
        }
        Ok(Some(aligned))
    }

    /// Align every image in `input_dir`, writing `aligned_<name>` files to `output_dir`.
    pub fn batch_align(
        &mut self,
        input_dir: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
    ) -> Result<BatchSummary, PrepError> {
        let (input_dir, output_dir) = (input_dir.as_ref(), output_dir.as_ref());
        io::ensure_dir(output_dir)?;

        let files = io::list_images(input_dir)?;
        let total = files.len();
        tracing::info!(dir = %input_dir.display(), total, "batch alignment started");

        let mut succeeded = 0;
        for (i, name) in files.iter().enumerate() {
            tracing::info!(file = %name, index = i + 1, total, "aligning");
            let output = output_dir.join(format!("{ALIGNED_PREFIX}{name}"));
            if self.align_face(input_dir.join(name), Some(output.as_path()))?.is_some() {
                succeeded += 1;
            }
        }

        tracing::info!(succeeded, total, "batch alignment finished");
        Ok(BatchSummary { total, succeeded })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facekit_core::{AnalysisError, Face};
    use image::Rgb;

    fn bbox(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: 0.9, landmarks: None }
    }

    /// Reports one face at a fixed box.
    struct OneFace(BoundingBox);

    impl FaceAnalysis for OneFace {
        fn analyze(&mut self, _image: &RgbImage) -> Result<Vec<Face>, AnalysisError> {
            Ok(vec![Face { bbox: self.0.clone(), embedding: None }])
        }
    }

    struct NoFaces;

    impl FaceAnalysis for NoFaces {
        fn analyze(&mut self, _image: &RgbImage) -> Result<Vec<Face>, AnalysisError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_expand_with_margin_inside() {
        // 100x100 box at (100, 100) grows 20 px per side.
        let rect = expand_with_margin(&bbox(100.0, 100.0, 100.0, 100.0), 0.2, 640, 480);
        assert_eq!(rect, CropRect { x1: 80, y1: 80, x2: 220, y2: 220 });
    }

    #[test]
    fn test_expand_with_margin_clamps() {
        let rect = expand_with_margin(&bbox(5.0, 10.0, 90.0, 80.0), 0.2, 100, 90);
        assert_eq!(rect, CropRect { x1: 0, y1: 0, x2: 100, y2: 90 });
    }

    #[test]
    fn test_expand_with_margin_truncates_box() {
        // (30.9, 20.9)-(80.7, 40.7) truncates to (30, 20)-(80, 40): w=50, h=20.
        let rect = expand_with_margin(&bbox(30.9, 20.9, 49.8, 19.8), 0.5, 200, 200);
        assert_eq!(rect, CropRect { x1: 5, y1: 10, x2: 105, y2: 50 });
    }

    #[test]
    fn test_expand_outside_image_is_empty() {
        let rect = expand_with_margin(&bbox(500.0, 500.0, 10.0, 10.0), 0.2, 100, 100);
        assert!(rect.is_empty());
    }

    #[test]
    fn test_pad_to_square_tall() {
        let image = RgbImage::from_pixel(3, 6, Rgb([255, 255, 255]));
        let square = pad_to_square(&image);
        assert_eq!(square.dimensions(), (6, 6));
        assert_eq!(square.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(square.get_pixel(1, 0), &Rgb([255, 255, 255]));
        assert_eq!(square.get_pixel(3, 5), &Rgb([255, 255, 255]));
        assert_eq!(square.get_pixel(4, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_pad_to_square_odd_difference() {
        let image = RgbImage::from_pixel(7, 4, Rgb([9, 9, 9]));
        let square = pad_to_square(&image);
        assert_eq!(square.dimensions(), (7, 7));
        // diff 3: one row above, two below.
        assert_eq!(square.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(square.get_pixel(0, 1), &Rgb([9, 9, 9]));
        assert_eq!(square.get_pixel(0, 4), &Rgb([9, 9, 9]));
        assert_eq!(square.get_pixel(0, 5), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_align_image_is_square_of_output_size() {
        let image = RgbImage::from_pixel(300, 200, Rgb([120, 80, 40]));
        for face in [bbox(50.0, 40.0, 60.0, 120.0), bbox(10.0, 10.0, 250.0, 30.0)] {
            let mut aligner = FaceAligner::new(OneFace(face), 128);
            let aligned = aligner.align_image(&image).unwrap().expect("face present");
            assert_eq!(aligned.dimensions(), (128, 128));
        }
    }

    #[test]
    fn test_align_image_without_face() {
        let image = RgbImage::new(64, 64);
        let mut aligner = FaceAligner::new(NoFaces, 64);
        assert!(aligner.align_image(&image).unwrap().is_none());
    }

    #[test]
    fn test_align_face_unreadable() {
        let mut aligner = FaceAligner::new(OneFace(bbox(0.0, 0.0, 10.0, 10.0)), 64);
        assert!(aligner.align_face("/nonexistent/face.jpg", None).unwrap().is_none());
    }
}
