//! Image loading, saving and directory listing.

use crate::PrepError;
use image::RgbImage;
use std::path::Path;

/// File extensions treated as images (compared case-insensitively).
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub fn is_image_file(name: impl AsRef<Path>) -> bool {
    name.as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

/// Names of the image files directly inside `dir`, sorted.
pub fn list_images(dir: impl AsRef<Path>) -> Result<Vec<String>, PrepError> {
    let dir = dir.as_ref();
    let entries = std::fs::read_dir(dir).map_err(|e| PrepError::io(dir, e))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PrepError::io(dir, e))?;
        if !entry.path().is_file() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            tracing::debug!(path = %entry.path().display(), "skipping non-UTF-8 file name");
            continue;
        };
        if is_image_file(&name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Decode an image as 8-bit RGB.
///
/// A missing or undecodable file is logged and reported as `None`.
pub fn load_image(path: impl AsRef<Path>) -> Option<RgbImage> {
    let path = path.as_ref();
    match image::open(path) {
        Ok(img) => Some(img.into_rgb8()),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "image could not be read");
            None
        }
    }
}

/// Encode an image; the format follows the file extension.
pub fn save_image(image: &RgbImage, path: impl AsRef<Path>) -> Result<(), PrepError> {
    image.save(path.as_ref())?;
    Ok(())
}

/// Create `dir` and its parents if needed.
pub fn ensure_dir(dir: impl AsRef<Path>) -> Result<(), PrepError> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir).map_err(|e| PrepError::io(dir, e))
}
