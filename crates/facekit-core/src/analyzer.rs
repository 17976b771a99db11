//! Detector + recognizer bundle producing complete [`Face`] records.

use crate::detector::{DetectorConfig, DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::Face;
use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Detection model file name in the buffalo_l pack.
pub const DETECTION_MODEL_FILE: &str = "det_10g.onnx";
/// Recognition model file name in the buffalo_l pack.
pub const RECOGNITION_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Anything that turns an image into detected faces.
///
/// Implementations return faces ordered by descending confidence, so the
/// first element is the most reliable detection.
pub trait FaceAnalysis {
    fn analyze(&mut self, image: &RgbImage) -> Result<Vec<Face>, AnalysisError>;
}

/// Default model directory: `$FACEKIT_MODEL_DIR`, else the insightface
/// cache location `~/.insightface/models/buffalo_l`.
pub fn default_model_dir() -> PathBuf {
    model_dir_from(std::env::var("FACEKIT_MODEL_DIR").ok(), std::env::var("HOME").ok())
}

fn model_dir_from(explicit: Option<String>, home: Option<String>) -> PathBuf {
    if let Some(dir) = explicit {
        return PathBuf::from(dir);
    }
    let home = home.unwrap_or_else(|| {
        tracing::warn!(fallback = "/tmp", "HOME is not set, looking for models under /tmp");
        "/tmp".to_string()
    });
    PathBuf::from(home).join(".insightface/models/buffalo_l")
}

/// Locations of the two ONNX models.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub detection: PathBuf,
    pub recognition: PathBuf,
}

impl ModelPaths {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            detection: dir.join(DETECTION_MODEL_FILE),
            recognition: dir.join(RECOGNITION_MODEL_FILE),
        }
    }
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self::in_dir(default_model_dir())
    }
}

/// SCRFD detection with optional ArcFace embedding per face.
pub struct FaceAnalyzer {
    detector: FaceDetector,
    recognizer: Option<FaceRecognizer>,
}

impl FaceAnalyzer {
    /// Load both models; every analyzed face carries an embedding.
    pub fn load(paths: &ModelPaths, config: DetectorConfig) -> Result<Self, AnalysisError> {
        let detector = FaceDetector::load(&paths.detection, config)?;
        let recognizer = FaceRecognizer::load(&paths.recognition)?;
        Ok(Self {
            detector,
            recognizer: Some(recognizer),
        })
    }

    /// Load only the detector; faces come back without embeddings.
    pub fn detection_only(
        paths: &ModelPaths,
        config: DetectorConfig,
    ) -> Result<Self, AnalysisError> {
        let detector = FaceDetector::load(&paths.detection, config)?;
        Ok(Self {
            detector,
            recognizer: None,
        })
    }

    pub fn has_recognizer(&self) -> bool {
        self.recognizer.is_some()
    }
}

impl FaceAnalysis for FaceAnalyzer {
    fn analyze(&mut self, image: &RgbImage) -> Result<Vec<Face>, AnalysisError> {
        let boxes = self.detector.detect(image)?;
        tracing::debug!(faces = boxes.len(), "detection finished");

        boxes
            .into_iter()
            .map(|bbox| -> Result<Face, AnalysisError> {
                let embedding = match self.recognizer.as_mut() {
                    Some(recognizer) => Some(recognizer.extract(image, &bbox)?),
                    None => None,
                };
                Ok(Face { bbox, embedding })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_paths_in_dir() {
        let paths = ModelPaths::in_dir("/models/buffalo_l");
        assert_eq!(paths.detection, PathBuf::from("/models/buffalo_l/det_10g.onnx"));
        assert_eq!(paths.recognition, PathBuf::from("/models/buffalo_l/w600k_r50.onnx"));
    }

    #[test]
    fn test_model_dir_prefers_explicit_dir() {
        let dir = model_dir_from(Some("/opt/models".into()), Some("/home/facekit".into()));
        assert_eq!(dir, PathBuf::from("/opt/models"));
        let dir = model_dir_from(None, Some("/home/facekit".into()));
        assert_eq!(dir, PathBuf::from("/home/facekit/.insightface/models/buffalo_l"));
    }

    #[test]
    fn test_model_dir_without_home_uses_tmp() {
        let dir = model_dir_from(None, None);
        assert_eq!(dir, PathBuf::from("/tmp/.insightface/models/buffalo_l"));
    }

    #[test]
    fn test_load_missing_models() {
        let paths = ModelPaths::in_dir("/nonexistent");
        let err = FaceAnalyzer::detection_only(&paths, DetectorConfig::default())
            .err()
            .expect("missing detector must fail");
        assert!(matches!(err, AnalysisError::Detector(DetectorError::ModelNotFound(_))));
    }
}
