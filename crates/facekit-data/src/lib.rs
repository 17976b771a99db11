//! facekit-data: Indexed image datasets over a directory of face crops.
//!
//! A [`Dataset`] maps an index to one sample; [`Transform`]s turn decoded
//! images into normalized CHW tensors; [`DataLoader`] groups samples into
//! `(N, C, H, W)` batches.

pub mod dataset;
pub mod loader;
pub mod transform;

pub use dataset::{parse_age, AgeDataset, AgeSample, Dataset, FaceDataset, FaceSample};
pub use loader::{AgeBatch, Batches, Collate, DataLoader, FaceBatch};
pub use transform::{Compose, Item, Normalize, Resize, ToTensor, Transform};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error(transparent)]
    Prep(#[from] facekit_prep::PrepError),
    #[error("index {index} out of range for dataset of {len} samples")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("image could not be read: {0}")]
    Unreadable(String),
    #[error("{transform} expects {expected} input")]
    WrongItem {
        transform: &'static str,
        expected: &'static str,
    },
    #[error("invalid normalization: {0}")]
    InvalidNormalize(String),
    #[error("cannot collate tensors of shape {expected:?} and {found:?}")]
    ShapeMismatch { expected: [usize; 3], found: [usize; 3] },
}
