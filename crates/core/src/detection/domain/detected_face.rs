use crate::detection::domain::embedding::Embedding;
use crate::shared::region::Region;

/// 5-point face landmarks: left eye, right eye, nose, left and right mouth
/// corner. Points with x <= 0 were not confidently located.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceLandmarks {
    points: [(f64, f64); 5],
}

impl FaceLandmarks {
    pub fn new(points: [(f64, f64); 5]) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[(f64, f64); 5] {
        &self.points
    }

    pub fn visible_count(&self) -> usize {
        self.points.iter().filter(|(x, _)| *x > 0.0).count()
    }
}

/// One face reported by the inference provider for a single frame.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectedFace {
    pub region: Region,
    pub score: f64,
    /// Absent when the provider could locate the face but not describe it.
    pub embedding: Option<Embedding>,
    pub landmarks: Option<FaceLandmarks>,
}

impl DetectedFace {
    pub fn new(region: Region, score: f64, embedding: Option<Embedding>) -> Self {
        Self {
            region,
            score,
            embedding,
            landmarks: None,
        }
    }

    pub fn with_landmarks(mut self, landmarks: FaceLandmarks) -> Self {
        self.landmarks = Some(landmarks);
        self
    }

    /// The embedding, unless it is missing or degenerate.
    pub fn usable_embedding(&self) -> Option<&Embedding> {
        self.embedding.as_ref().filter(|e| !e.is_degenerate())
    }
}
