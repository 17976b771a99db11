//! SCRFD face detector via ONNX Runtime.
//!
//! SCRFD (Sample and Computation Redistribution for Efficient Face Detection)
//! predicts, for each of three feature strides, per-anchor scores, box
//! distances and five landmark offsets. Decoding is anchor-free with two
//! anchors per grid cell, followed by greedy NMS.

use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;
const SCRFD_OUTPUTS: usize = SCRFD_STRIDES.len() * 3;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}; download the buffalo_l pack from insightface")]
    ModelNotFound(String),
    #[error("invalid detector config: {0}")]
    InvalidConfig(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Tunables for [`FaceDetector`].
#[derive(Debug, Clone, Copy)]
pub struct DetectorConfig {
    /// Square network input edge; must be a multiple of the largest stride (32).
    pub input_size: usize,
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            input_size: SCRFD_INPUT_SIZE,
            confidence_threshold: SCRFD_CONFIDENCE_THRESHOLD,
            nms_threshold: SCRFD_NMS_THRESHOLD,
        }
    }
}

/// Scale and centering offset applied when fitting an image into the
/// square network input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn fit(width: u32, height: u32, size: usize) -> (Self, u32, u32) {
        let edge = size as f32;
        let scale = (edge / width as f32).min(edge / height as f32);
        let new_w = ((width as f32 * scale).round() as usize).clamp(1, size);
        let new_h = ((height as f32 * scale).round() as usize).clamp(1, size);
        let letterbox = Self {
            scale,
            // Whole pixels, matching where preprocess writes the image.
            pad_x: ((size - new_w) / 2) as f32,
            pad_y: ((size - new_h) / 2) as f32,
        };
        (letterbox, new_w as u32, new_h as u32)
    }

    /// Network-input point back to source-image pixels.
    fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Output tensor positions for one stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OutputSlots {
    score: usize,
    bbox: usize,
    kps: usize,
}

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    config: DetectorConfig,
    /// One entry per stride, in `SCRFD_STRIDES` order.
    slots: [OutputSlots; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(
        model_path: impl AsRef<Path>,
        config: DetectorConfig,
    ) -> Result<Self, DetectorError> {
        let model_path = model_path.as_ref();
        let largest_stride = SCRFD_STRIDES[SCRFD_STRIDES.len() - 1];
        if config.input_size == 0 || config.input_size % largest_stride != 0 {
            return Err(DetectorError::InvalidConfig(format!(
                "input size {} is not a positive multiple of {largest_stride}",
                config.input_size
            )));
        }
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        tracing::info!(
            path = %model_path.display(),
            input_size = config.input_size,
            outputs = ?names,
            "loaded SCRFD model"
        );
        if names.len() < SCRFD_OUTPUTS {
            return Err(DetectorError::InferenceFailed(format!(
                "expected {SCRFD_OUTPUTS} outputs (score/bbox/kps per stride), model has {}",
                names.len()
            )));
        }

        let slots = output_slots(&names);
        tracing::debug!(?slots, "SCRFD output mapping");

        Ok(Self { session, config, slots })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Detect faces in an RGB image, highest confidence first.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }

        let (input, letterbox) = preprocess(image, self.config.input_size);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (slots, &stride) in self.slots.iter().zip(SCRFD_STRIDES.iter()) {
            let mut tensors: [&[f32]; 3] = [&[]; 3];
            let wanted = [(slots.score, "scores"), (slots.bbox, "boxes"), (slots.kps, "landmarks")];
            for (tensor, (index, what)) in tensors.iter_mut().zip(wanted) {
                let (_, data) = outputs[index].try_extract_tensor::<f32>().map_err(|e| {
                    DetectorError::InferenceFailed(format!("{what} at stride {stride}: {e}"))
                })?;
                *tensor = data;
            }
            let [scores, bboxes, kps] = tensors;

            candidates.extend(decode_stride(
                scores,
                bboxes,
                kps,
                stride,
                self.config.input_size,
                &letterbox,
                self.config.confidence_threshold,
            ));
        }

        Ok(nms(candidates, self.config.nms_threshold))
    }
}

/// Letterbox an RGB image into a `(1, 3, size, size)` tensor.
///
/// The image keeps its aspect ratio and is centered; the border is left at
/// 0.0, which is the normalized mean.
fn preprocess(image: &RgbImage, size: usize) -> (Array4<f32>, Letterbox) {
    let (letterbox, new_w, new_h) = Letterbox::fit(image.width(), image.height(), size);
    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let (off_x, off_y) = (letterbox.pad_x as usize, letterbox.pad_y as usize);
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for (c, &value) in pixel.0.iter().enumerate() {
            tensor[[0, c, y as usize + off_y, x as usize + off_x]] =
                (value as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }

    (tensor, letterbox)
}

/// Map outputs named `score_8`, `bbox_16`, `kps_32`, ... to their strides.
///
/// Exports without those names use the conventional layout: scores at
/// 0..3, boxes at 3..6, landmarks at 6..9.
fn output_slots(names: &[String]) -> [OutputSlots; 3] {
    let position = |kind: &str, stride: usize| {
        let wanted = format!("{kind}_{stride}");
        names.iter().position(|n| *n == wanted)
    };
    let by_name = |i: usize| -> Option<OutputSlots> {
        let stride = SCRFD_STRIDES[i];
        Some(OutputSlots {
            score: position("score", stride)?,
            bbox: position("bbox", stride)?,
            kps: position("kps", stride)?,
        })
    };

    match (by_name(0), by_name(1), by_name(2)) {
        (Some(a), Some(b), Some(c)) => [a, b, c],
        _ => {
            tracing::debug!(?names, "unrecognized SCRFD output names, using positional layout");
            std::array::from_fn(|i| OutputSlots { score: i, bbox: i + 3, kps: i + 6 })
        }
    }
}

/// Decode the anchors of one stride whose score reaches `threshold`.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    kps: &[f32],
    stride: usize,
    input_size: usize,
    letterbox: &Letterbox,
    threshold: f32,
) -> Vec<BoundingBox> {
    let grid = input_size / stride;
    let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let s = stride as f32;

    scores
        .iter()
        .zip(bboxes.chunks_exact(4))
        .take(anchors)
        .enumerate()
        .filter(|(_, (&score, _))| score >= threshold)
        .map(|(idx, (&score, dist))| {
            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let cx = (cell % grid) as f32 * s;
            let cy = (cell / grid) as f32 * s;

            // Distances are [left, top, right, bottom] in stride units.
            let (x1, y1) = letterbox.to_source(cx - dist[0] * s, cy - dist[1] * s);
            let (x2, y2) = letterbox.to_source(cx + dist[2] * s, cy + dist[3] * s);

            let landmarks = kps.get(idx * 10..idx * 10 + 10).map(|offsets| {
                std::array::from_fn(|i| {
                    letterbox.to_source(cx + offsets[2 * i] * s, cy + offsets[2 * i + 1] * s)
                })
            });

            BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
                landmarks,
            }
        })
        .collect()
}

/// Greedy non-maximum suppression; the result is sorted by confidence.
fn nms(mut candidates: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<BoundingBox> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if kept.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}
