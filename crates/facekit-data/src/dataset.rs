//! Index-addressable datasets over a directory of images.

use crate::transform::{Item, Transform};
use crate::DatasetError;
use facekit_prep::io;
use std::path::{Path, PathBuf};

/// Random access to a fixed number of samples.
pub trait Dataset {
    type Sample;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize) -> Result<Self::Sample, DatasetError>;
}

#[derive(Debug, Clone)]
pub struct FaceSample {
    pub image: Item,
    pub filename: String,
}

#[derive(Debug, Clone)]
pub struct AgeSample {
    pub image: Item,
    pub age: u32,
    pub filename: String,
}

/// Age label embedded in a file name such as `person1_age_25_bright.jpg`.
///
/// The label is the text after the first `_age_`, up to the next `_` or
/// `.`. Returns `None` when there is no marker or the label is not a
/// non-negative integer.
pub fn parse_age(filename: &str) -> Option<u32> {
    let rest = filename.split("_age_").nth(1)?;
    let label = rest.split('_').next()?.split('.').next()?;
    label.parse().ok()
}

/// Loads `dir/filename` and runs the transform over it.
fn load_item(
    dir: &Path,
    filename: &str,
    transform: Option<&dyn Transform>,
) -> Result<Item, DatasetError> {
    let path = dir.join(filename);
    let image = io::load_image(&path)
        .ok_or_else(|| DatasetError::Unreadable(path.display().to_string()))?;
    match transform {
        Some(t) => t.apply(Item::Image(image)),
        None => Ok(Item::Image(image)),
    }
}

/// Every jpg/jpeg/png file in a directory, in name order.
pub struct FaceDataset {
    dir: PathBuf,
    files: Vec<String>,
    transform: Option<Box<dyn Transform>>,
}

impl FaceDataset {
    pub fn new(
        dir: impl AsRef<Path>,
        transform: Option<Box<dyn Transform>>,
    ) -> Result<Self, DatasetError> {
        let dir = dir.as_ref().to_path_buf();
        let files = io::list_images(&dir)?;
        tracing::info!(dir = %dir.display(), images = files.len(), "face dataset loaded");
        Ok(Self { dir, files, transform })
    }

    pub fn filenames(&self) -> &[String] {
        &self.files
    }
}

impl Dataset for FaceDataset {
    type Sample = FaceSample;

    fn len(&self) -> usize {
        self.files.len()
    }

    fn get(&self, index: usize) -> Result<FaceSample, DatasetError> {
        let filename = self.files.get(index).ok_or(DatasetError::IndexOutOfRange {
            index,
            len: self.files.len(),
        })?;
        Ok(FaceSample {
            image: load_item(&self.dir, filename, self.transform.as_deref())?,
            filename: filename.clone(),
        })
    }
}

/// Images whose file names carry an `_age_<N>` label.
pub struct AgeDataset {
    dir: PathBuf,
    samples: Vec<(String, u32)>,
    transform: Option<Box<dyn Transform>>,
}

impl AgeDataset {
    /// Files without a parsable age label are skipped.
    pub fn new(
        dir: impl AsRef<Path>,
        transform: Option<Box<dyn Transform>>,
    ) -> Result<Self, DatasetError> {
        let dir = dir.as_ref().to_path_buf();
        let mut samples = Vec::new();
        let mut skipped = 0usize;
        for name in io::list_images(&dir)? {
            match parse_age(&name) {
                Some(age) => samples.push((name, age)),
                None => {
                    tracing::debug!(file = %name, "no age label, skipping");
                    skipped += 1;
                }
            }
        }
        tracing::info!(dir = %dir.display(), images = samples.len(), skipped, "age dataset loaded");
        Ok(Self { dir, samples, transform })
    }

    pub fn ages(&self) -> impl Iterator<Item = u32> + '_ {
        self.samples.iter().map(|(_, age)| *age)
    }
}

impl Dataset for AgeDataset {
    type Sample = AgeSample;

    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: usize) -> Result<AgeSample, DatasetError> {
        let (filename, age) = self.samples.get(index).ok_or(DatasetError::IndexOutOfRange {
            index,
            len: self.samples.len(),
        })?;
        Ok(AgeSample {
            image: load_item(&self.dir, filename, self.transform.as_deref())?,
            age: *age,
            filename: filename.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_age_variants() {
        assert_eq!(parse_age("person1_age_25.jpg"), Some(25));
        assert_eq!(parse_age("person1_age_25_bright.jpg"), Some(25));
        assert_eq!(parse_age("aligned_kim_age_7_rotate_n5.png"), Some(7));
        assert_eq!(parse_age("x_age_40"), Some(40));
    }

    #[test]
    fn test_parse_age_first_marker_wins() {
        assert_eq!(parse_age("a_age_30_age_31.jpg"), Some(30));
    }

    #[test]
    fn test_parse_age_rejects_unlabeled() {
        assert_eq!(parse_age("person1.jpg"), None);
        assert_eq!(parse_age("person1_age_.jpg"), None);
        assert_eq!(parse_age("person1_age_old.jpg"), None);
        assert_eq!(parse_age("person1_age_-3.jpg"), None);
        assert_eq!(parse_age("age_25.jpg"), None);
    }

    #[test]
    fn test_missing_dir_is_error() {
        assert!(FaceDataset::new("/nonexistent/facekit", None).is_err());
        assert!(AgeDataset::new("/nonexistent/facekit", None).is_err());
    }
}
