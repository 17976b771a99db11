#![allow(dead_code)]

use facekit_core::{AnalysisError, BoundingBox, Face, FaceAnalysis};
use image::{ImageBuffer, Rgb, RgbImage};
use std::path::{Path, PathBuf};

/// Writes a small gradient test image and returns its path.
pub fn write_test_image(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let img: RgbImage = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128u8])
    });
    let path = dir.join(name);
    img.save(&path).expect("Failed to save test image");
    path
}

/// Reports a single face in the middle third of every image.
pub struct CenterFace;

impl FaceAnalysis for CenterFace {
    fn analyze(&mut self, image: &RgbImage) -> Result<Vec<Face>, AnalysisError> {
        let (w, h) = (image.width() as f32, image.height() as f32);
        Ok(vec![Face {
            bbox: BoundingBox {
                x: w / 3.0,
                y: h / 3.0,
                width: w / 3.0,
                height: h / 3.0,
                confidence: 0.95,
                landmarks: None,
            },
            embedding: None,
        }])
    }
}

/// Never finds a face.
pub struct Blind;

impl FaceAnalysis for Blind {
    fn analyze(&mut self, _image: &RgbImage) -> Result<Vec<Face>, AnalysisError> {
        Ok(Vec::new())
    }
}
