use serde::Serialize;

use crate::detection::domain::detected_face::DetectedFace;
use crate::detection::domain::embedding::Embedding;
use crate::monitoring::domain::reference_face::ReferenceFace;
use crate::monitoring::domain::violation::ViolationType;

/// Classification of one sampled frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct DetectionResult {
    pub face_count: usize,
    pub violation_type: ViolationType,
    /// Present only when exactly one face was compared to a reference.
    pub match_distance: Option<f64>,
}

/// Classifies the faces found in a frame.
///
/// Face count decides first: zero faces is `NoFace` and more than one is
/// `MultipleFaces`, without computing any distance. A single face is
/// compared to the reference (if any) with `distance`; a distance above
/// `threshold`, or one that is not a number, is a mismatch. A single face
/// that carries no usable embedding cannot be compared and is accepted.
pub fn classify(
    faces: &[DetectedFace],
    reference: Option<&ReferenceFace>,
    threshold: f64,
    distance: impl Fn(&Embedding, &Embedding) -> f64,
) -> DetectionResult {
    let face_count = faces.len();
    let violation_type = match face_count {
        0 => ViolationType::NoFace,
        1 => ViolationType::None,
        _ => ViolationType::MultipleFaces,
    };
    if face_count != 1 {
        return DetectionResult {
            face_count,
            violation_type,
            match_distance: None,
        };
    }

    let match_distance = reference
        .zip(faces[0].usable_embedding())
        .map(|(reference, embedding)| distance(reference.embedding(), embedding));
    let violation_type = match match_distance {
        Some(d) if d.is_nan() || d > threshold => ViolationType::FaceMismatch,
        _ => ViolationType::None,
    };

    DetectionResult {
        face_count,
        violation_type,
        match_distance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::region::Region;
    use approx::assert_relative_eq;
    use chrono::Utc;
    use rstest::rstest;
    use std::cell::Cell;

    fn face(embedding: Option<Vec<f32>>) -> DetectedFace {
        DetectedFace::new(Region::new(0, 0, 40, 40), 0.9, embedding.map(Embedding::new))
    }

    fn reference(values: Vec<f32>) -> ReferenceFace {
        ReferenceFace::from_face(&face(Some(values)), Utc::now()).unwrap()
    }

    fn euclidean(a: &Embedding, b: &Embedding) -> f64 {
        a.euclidean_distance(b)
    }

    #[test]
    fn test_zero_faces_is_no_face() {
        let result = classify(&[], Some(&reference(vec![1.0, 0.0])), 0.6, euclidean);
        assert_eq!(result.face_count, 0);
        assert_eq!(result.violation_type, ViolationType::NoFace);
        assert_eq!(result.match_distance, None);
    }

    #[test]
    fn test_multiple_faces_wins_before_any_distance() {
        let calls = Cell::new(0);
        let faces = vec![face(Some(vec![1.0, 0.0])), face(Some(vec![0.0, 1.0]))];
        let result = classify(&faces, Some(&reference(vec![1.0, 0.0])), 0.6, |a, b| {
            calls.set(calls.get() + 1);
            a.euclidean_distance(b)
        });

        assert_eq!(result.face_count, 2);
        assert_eq!(result.violation_type, ViolationType::MultipleFaces);
        assert_eq!(result.match_distance, None);
        assert_eq!(calls.get(), 0);
    }

    #[rstest]
    #[case(0.05, ViolationType::None)]
    #[case(0.6, ViolationType::None)]
    #[case(0.61, ViolationType::FaceMismatch)]
    #[case(1.3, ViolationType::FaceMismatch)]
    fn test_single_face_threshold(#[case] d: f64, #[case] expected: ViolationType) {
        let result = classify(
            &[face(Some(vec![0.2, 0.3]))],
            Some(&reference(vec![0.5, 0.5])),
            0.6,
            |_, _| d,
        );
        assert_eq!(result.violation_type, expected);
        assert_relative_eq!(result.match_distance.unwrap(), d);
    }

    #[rstest]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    fn test_non_finite_distance_is_a_mismatch(#[case] d: f64) {
        let result = classify(
            &[face(Some(vec![0.2, 0.3]))],
            Some(&reference(vec![0.5, 0.5])),
            0.6,
            |_, _| d,
        );
        assert_eq!(result.violation_type, ViolationType::FaceMismatch);
        assert!(result.match_distance.is_some_and(|m| !m.is_finite()));
    }

    #[test]
    fn test_single_face_without_reference_has_no_distance() {
        let result = classify(&[face(Some(vec![0.2, 0.3]))], None, 0.6, euclidean);
        assert_eq!(result.face_count, 1);
        assert_eq!(result.violation_type, ViolationType::None);
        assert_eq!(result.match_distance, None);
    }

    #[test]
    fn test_single_face_without_embedding_is_accepted() {
        let result = classify(&[face(None)], Some(&reference(vec![1.0, 0.0])), 0.6, euclidean);
        assert_eq!(result.violation_type, ViolationType::None);
        assert_eq!(result.match_distance, None);
    }
}
