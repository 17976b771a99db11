//! facekit-prep: File-level preprocessing around the face models.
//!
//! Reads images from a directory, runs detection or cropping, applies
//! augmentation transforms, and writes results to another directory.

pub mod aligner;
pub mod augment;
pub mod detection;
pub mod io;

pub use aligner::{BatchSummary, CropRect, FaceAligner};
pub use augment::{Augmentation, DataAugmentor};
pub use detection::ImageDetector;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrepError {
    #[error("face analysis failed: {0}")]
    Analysis(#[from] facekit_core::AnalysisError),
    #[error("image encode/decode failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl PrepError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
