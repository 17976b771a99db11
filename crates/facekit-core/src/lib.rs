//! facekit-core: Face detection, recognition and matching engine.
//!
//! Uses SCRFD for face detection and ArcFace for face recognition,
//! both running via ONNX Runtime for CPU inference.

pub mod alignment;
pub mod analyzer;
pub mod detector;
pub mod matcher;
pub mod recognizer;
pub mod types;

pub use analyzer::{default_model_dir, AnalysisError, FaceAnalysis, FaceAnalyzer, ModelPaths};
pub use detector::{DetectorConfig, FaceDetector};
pub use matcher::FaceMatcher;
pub use recognizer::FaceRecognizer;
pub use types::{BoundingBox, Embedding, Face, MatchResult, DEFAULT_MATCH_THRESHOLD};
