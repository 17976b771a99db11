use anyhow::{Context, Result};
use facekit_core::{default_model_dir, DetectorConfig, ModelPaths, DEFAULT_MATCH_THRESHOLD};
use facekit_prep::aligner::{DEFAULT_MARGIN, DEFAULT_OUTPUT_SIZE};
use facekit_prep::augment::DEFAULT_NOISE_LEVEL;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI configuration: defaults, then an optional TOML file, then
/// `FACEKIT_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory containing `det_10g.onnx` and `w600k_r50.onnx`.
    pub model_dir: PathBuf,
    /// SCRFD input edge (multiple of 32).
    pub det_size: usize,
    /// Minimum detection confidence.
    pub det_threshold: f32,
    /// Cosine similarity a pair must exceed to count as a match.
    pub match_threshold: f32,
    /// Edge of the square crops written by `align`.
    pub align_size: u32,
    /// Fraction of the face box added on each side before cropping.
    pub align_margin: f32,
    /// Standard deviation of the Gaussian noise augmentation.
    pub noise_level: f32,
}

impl Default for Config {
    fn default() -> Self {
        let detector = DetectorConfig::default();
        Self {
            model_dir: default_model_dir(),
            det_size: detector.input_size,
            det_threshold: detector.confidence_threshold,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            align_size: DEFAULT_OUTPUT_SIZE,
            align_margin: DEFAULT_MARGIN,
            noise_level: DEFAULT_NOISE_LEVEL,
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        tracing::debug!(?config, "configuration loaded");
        Ok(config)
    }

    /// Parse a TOML file; keys it leaves out keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Override fields from `FACEKIT_*` variables; unparsable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("FACEKIT_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        override_parsed(&lookup, "FACEKIT_DET_SIZE", &mut self.det_size);
        override_parsed(&lookup, "FACEKIT_DET_THRESHOLD", &mut self.det_threshold);
        override_parsed(&lookup, "FACEKIT_MATCH_THRESHOLD", &mut self.match_threshold);
        override_parsed(&lookup, "FACEKIT_ALIGN_SIZE", &mut self.align_size);
        override_parsed(&lookup, "FACEKIT_ALIGN_MARGIN", &mut self.align_margin);
        override_parsed(&lookup, "FACEKIT_NOISE_LEVEL", &mut self.noise_level);
    }

    pub fn model_paths(&self) -> ModelPaths {
        ModelPaths::in_dir(&self.model_dir)
    }

    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            input_size: self.det_size,
            confidence_threshold: self.det_threshold,
            ..DetectorConfig::default()
        }
    }
}

fn override_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    field: &mut T,
) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *field = value,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable environment override"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.det_size, 640);
        assert_eq!(config.det_threshold, 0.5);
        assert_eq!(config.match_threshold, 0.6);
        assert_eq!(config.align_size, 512);
        assert_eq!(config.align_margin, 0.2);
        assert_eq!(config.noise_level, 10.0);
        assert_eq!(config.detector_config().nms_threshold, 0.4);
    }

    #[test]
    fn test_file_overrides_some_keys() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("facekit.toml");
        let body = "model_dir = \"/models\"\nalign_size = 256\nmatch_threshold = 0.45\n";
        std::fs::write(&path, body).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.model_dir, PathBuf::from("/models"));
        assert_eq!(config.align_size, 256);
        assert_eq!(config.match_threshold, 0.45);
        assert_eq!(config.det_size, 640);
        assert_eq!(config.model_paths().detection, PathBuf::from("/models/det_10g.onnx"));
    }

    #[test]
    fn test_file_rejects_unknown_keys() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("facekit.toml");
        std::fs::write(&path, "align_sise = 256\n").unwrap();
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(Config::from_file(Path::new("/nonexistent/facekit.toml")).is_err());
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = Config { align_size: 256, ..Config::default() };
        config.apply_overrides(lookup(&[
            ("FACEKIT_ALIGN_SIZE", "128"),
            ("FACEKIT_DET_SIZE", "320"),
            ("FACEKIT_DET_THRESHOLD", " 0.7 "),
            ("FACEKIT_MODEL_DIR", "/opt/models"),
        ]));
        assert_eq!(config.align_size, 128);
        assert_eq!(config.det_size, 320);
        assert_eq!(config.det_threshold, 0.7);
        assert_eq!(config.model_dir, PathBuf::from("/opt/models"));
        assert_eq!(config.detector_config().input_size, 320);
    }

    #[test]
    fn test_unparsable_env_keeps_value() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[
            ("FACEKIT_NOISE_LEVEL", "loud"),
            ("FACEKIT_ALIGN_MARGIN", ""),
        ]));
        assert_eq!(config.noise_level, 10.0);
        assert_eq!(config.align_margin, 0.2);
    }
}
