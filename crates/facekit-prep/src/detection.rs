//! Face detection on image files, with box overlays.

use crate::io;
use crate::PrepError;
use facekit_core::{Face, FaceAnalysis};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::path::Path;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: u32 = 2;

/// Runs face analysis on image files.
pub struct ImageDetector<A> {
    analysis: A,
}

impl<A: FaceAnalysis> ImageDetector<A> {
    pub fn new(analysis: A) -> Self {
        Self { analysis }
    }

    /// Detect every face in the image at `path`.
    ///
    /// An unreadable image yields an empty list.
    pub fn detect_faces(&mut self, path: impl AsRef<Path>) -> Result<Vec<Face>, PrepError> {
        let path = path.as_ref();
        let Some(image) = io::load_image(path) else {
            return Ok(Vec::new());
        };
        let faces = self.analysis.analyze(&image)?;
        tracing::info!(path = %path.display(), faces = faces.len(), "faces detected");
        Ok(faces)
    }

    /// Draw a box around every detected face, save the annotated copy, and
    /// return the faces that were drawn.
    ///
    /// Returns `Ok(None)` without writing anything when the input cannot
    /// be read.
    pub fn draw_faces(
        &mut self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<Option<Vec<Face>>, PrepError> {
        let (input, output) = (input.as_ref(), output.as_ref());
        let Some(mut image) = io::load_image(input) else {
            return Ok(None);
        };
        let faces = self.analysis.analyze(&image)?;
        tracing::info!(path = %input.display(), faces = faces.len(), "faces detected");

        draw_boxes(&mut image, &faces);
        io::save_image(&image, output)?;
        tracing::info!(path = %output.display(), "annotated image saved");
        Ok(Some(faces))
    }
}

/// Outline each face box in green, `BOX_THICKNESS` pixels wide, growing inward.
pub fn draw_boxes(image: &mut RgbImage, faces: &[Face]) {
    for face in faces {
        // Box corners truncate to whole pixels; the far corner is inclusive.
        let x1 = face.bbox.x as i32;
        let y1 = face.bbox.y as i32;
        let x2 = face.bbox.x2() as i32;
        let y2 = face.bbox.y2() as i32;

        for inset in 0..BOX_THICKNESS as i32 {
            let w = x2 - x1 + 1 - 2 * inset;
            let h = y2 - y1 + 1 - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(x1 + inset, y1 + inset).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(image, rect, BOX_COLOR);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facekit_core::{AnalysisError, BoundingBox};

    fn face_at(x: f32, y: f32, w: f32, h: f32) -> Face {
        Face {
            bbox: BoundingBox {
                x,
                y,
                width: w,
                height: h,
                confidence: 0.9,
                landmarks: None,
            },
            embedding: None,
        }
    }

    /// Returns the same faces for every image and counts the calls.
    struct FixedFaces {
        faces: Vec<Face>,
        calls: usize,
    }

    impl FixedFaces {
        fn new(faces: Vec<Face>) -> Self {
            Self { faces, calls: 0 }
        }
    }

    impl FaceAnalysis for &mut FixedFaces {
        fn analyze(&mut self, _image: &RgbImage) -> Result<Vec<Face>, AnalysisError> {
            self.calls += 1;
            Ok(self.faces.clone())
        }
    }

    #[test]
    fn test_draw_boxes_outline() {
        let mut image = RgbImage::new(50, 50);
        draw_boxes(&mut image, &[face_at(10.0, 10.0, 20.0, 20.0)]);

        assert_eq!(image.get_pixel(10, 10), &BOX_COLOR);
        assert_eq!(image.get_pixel(30, 30), &BOX_COLOR);
        assert_eq!(image.get_pixel(11, 20), &BOX_COLOR); // second ring
        assert_eq!(image.get_pixel(20, 20), &Rgb([0, 0, 0])); // interior untouched
        assert_eq!(image.get_pixel(5, 5), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_draw_boxes_clipped_to_image() {
        let mut image = RgbImage::new(20, 20);
        draw_boxes(&mut image, &[face_at(-5.0, -5.0, 40.0, 40.0)]);
        assert_eq!(image.get_pixel(10, 10), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_detect_faces_unreadable_is_empty() {
        let mut analysis = FixedFaces::new(vec![face_at(0.0, 0.0, 5.0, 5.0)]);
        let mut detector = ImageDetector::new(&mut analysis);
        assert!(detector.detect_faces("/nonexistent/face.jpg").unwrap().is_empty());
        assert_eq!(analysis.calls, 0);
    }

    #[test]
    fn test_draw_faces_writes_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("out.png");
        RgbImage::new(40, 40).save(&input).unwrap();

        let mut analysis = FixedFaces::new(vec![face_at(5.0, 5.0, 10.0, 10.0)]);
        let mut detector = ImageDetector::new(&mut analysis);
        let faces = detector.draw_faces(&input, &output).unwrap().expect("input is readable");
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].bbox.x, 5.0);

        let annotated = image::open(&output).unwrap().into_rgb8();
        assert_eq!(annotated.get_pixel(5, 5), &BOX_COLOR);
        // The returned faces come from the same analysis that was drawn.
        assert_eq!(analysis.calls, 1);
    }

    #[test]
    fn test_draw_faces_unreadable_writes_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let output = dir.path().join("out.png");
        let mut analysis = FixedFaces::new(Vec::new());
        let mut detector = ImageDetector::new(&mut analysis);
        assert!(detector.draw_faces(dir.path().join("missing.png"), &output).unwrap().is_none());
        assert!(!output.exists());
    }
}
