//! Pairwise face verification by cosine similarity of ArcFace embeddings.

use crate::analyzer::{AnalysisError, FaceAnalysis};
use crate::types::{Embedding, MatchResult, DEFAULT_MATCH_THRESHOLD};
use std::path::Path;

/// Compares the dominant faces of two images.
pub struct FaceMatcher<A> {
    analysis: A,
    threshold: f32,
}

impl<A: FaceAnalysis> FaceMatcher<A> {
    /// `threshold` is exclusive: a pair matches only above it.
    pub fn new(analysis: A, threshold: f32) -> Self {
        Self { analysis, threshold }
    }

    pub fn with_default_threshold(analysis: A) -> Self {
        Self::new(analysis, DEFAULT_MATCH_THRESHOLD)
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Embedding of the highest-confidence face in the image at `path`.
    ///
    /// Returns `Ok(None)` when the image cannot be read, when no face is
    /// found, or when the analysis produced faces without embeddings.
    pub fn extract_embedding(
        &mut self,
        path: impl AsRef<Path>,
    ) -> Result<Option<Embedding>, AnalysisError> {
        let path = path.as_ref();
        let image = match image::open(path) {
            Ok(img) => img.into_rgb8(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "image could not be read");
                return Ok(None);
            }
        };

        let faces = self.analysis.analyze(&image)?;
        let Some(face) = faces.into_iter().next() else {
            tracing::warn!(path = %path.display(), "no face detected");
            return Ok(None);
        };

        match face.embedding {
            Some(embedding) => {
                tracing::info!(
                    path = %path.display(),
                    dim = embedding.dim(),
                    "embedding extracted"
                );
                Ok(Some(embedding))
            }
            None => {
                tracing::warn!(path = %path.display(), "face analysis returned no embedding");
                Ok(None)
            }
        }
    }

    pub fn calculate_similarity(&self, a: &Embedding, b: &Embedding) -> f32 {
        a.similarity(b)
    }

    /// Compare the faces in two images.
    ///
    /// A missing face (or unreadable image) on either side yields
    /// [`MatchResult::no_match`].
    pub fn match_faces(
        &mut self,
        first: impl AsRef<Path>,
        second: impl AsRef<Path>,
    ) -> Result<MatchResult, AnalysisError> {
        let a = self.extract_embedding(first)?;
        let b = self.extract_embedding(second)?;

        let (Some(a), Some(b)) = (a, b) else {
            return Ok(MatchResult::no_match());
        };

        let similarity = self.calculate_similarity(&a, &b);
        let result = MatchResult::from_similarity(similarity, self.threshold);
        tracing::info!(
            similarity = result.similarity,
            threshold = self.threshold,
            is_match = result.is_match,
            "faces compared"
        );
        Ok(result)
    }
}
