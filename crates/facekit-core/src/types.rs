use serde::{Deserialize, Serialize};

/// Similarity above which two faces are reported as the same person.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Right edge (x + width).
    pub fn x2(&self) -> f32 {
        self.x + self.width
    }

    /// Bottom edge (y + height).
    pub fn y2(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Intersection over union; 0.0 for disjoint or degenerate boxes.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let overlap_w = (self.x2().min(other.x2()) - self.x.max(other.x)).max(0.0);
        let overlap_h = (self.y2().min(other.y2()) - self.y.max(other.y)).max(0.0);
        let inter = overlap_w * overlap_h;
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values, model_version: None }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Cosine similarity in `[-1, 1]`, computed over the common prefix when
    /// dimensions differ. A zero vector on either side yields 0.0.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let (dot, sq_a, sq_b) = self
            .values
            .iter()
            .zip(&other.values)
            .fold((0.0f32, 0.0f32, 0.0f32), |(dot, sq_a, sq_b), (a, b)| {
                (dot + a * b, sq_a + a * a, sq_b + b * b)
            });

        let norms = sq_a.sqrt() * sq_b.sqrt();
        if norms > 0.0 {
            dot / norms
        } else {
            0.0
        }
    }

    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt()
    }
}

/// A detected face: location, landmarks and (when a recognizer ran) identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Face {
    pub bbox: BoundingBox,
    pub embedding: Option<Embedding>,
}

impl Face {
    pub fn landmarks(&self) -> Option<&[(f32, f32); 5]> {
        self.bbox.landmarks.as_ref()
    }
}

/// Result of comparing two faces.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Cosine similarity [-1, 1].
    pub similarity: f32,
    pub is_match: bool,
}

impl MatchResult {
    /// `is_match` holds only when `similarity` is strictly above `threshold`.
    pub fn from_similarity(similarity: f32, threshold: f32) -> Self {
        Self {
            similarity,
            is_match: similarity > threshold,
        }
    }

    /// Result reported when either side has no usable face.
    pub fn no_match() -> Self {
        Self {
            similarity: 0.0,
            is_match: false,
        }
    }
}
