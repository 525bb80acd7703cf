use chrono::{DateTime, Utc};

use crate::detection::domain::detected_face::DetectedFace;
use crate::detection::domain::embedding::Embedding;

/// The enrolled identity every later frame is compared against.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceFace {
    embedding: Embedding,
    captured_at: DateTime<Utc>,
}

impl ReferenceFace {
    /// Builds a reference from a detected face, or `None` when the face has
    /// no usable embedding.
    pub fn from_face(face: &DetectedFace, captured_at: DateTime<Utc>) -> Option<Self> {
        face.usable_embedding().map(|embedding| Self {
            embedding: embedding.clone(),
            captured_at,
        })
    }

    pub fn embedding(&self) -> &Embedding {
        &self.embedding
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::region::Region;

    #[test]
    fn test_from_face_copies_embedding() {
        let face = DetectedFace::new(
            Region::new(0, 0, 20, 20),
            0.9,
            Some(Embedding::new(vec![0.6, 0.8])),
        );
        let now = Utc::now();
        let reference = ReferenceFace::from_face(&face, now).unwrap();
        assert_eq!(reference.embedding().values(), &[0.6, 0.8]);
        assert_eq!(reference.captured_at(), now);
    }

    #[test]
    fn test_from_face_without_embedding() {
        let face = DetectedFace::new(Region::new(0, 0, 20, 20), 0.9, None);
        assert!(ReferenceFace::from_face(&face, Utc::now()).is_none());

        let zeroed = DetectedFace::new(
            Region::new(0, 0, 20, 20),
            0.9,
            Some(Embedding::new(vec![0.0; 128])),
        );
        assert!(ReferenceFace::from_face(&zeroed, Utc::now()).is_none());
    }
}
