use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::evidence::domain::snapshot_encoder::Evidence;

/// Outcome of classifying one sampled frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    #[default]
    None,
    NoFace,
    MultipleFaces,
    FaceMismatch,
}

impl ViolationType {
    pub fn is_violation(self) -> bool {
        self != ViolationType::None
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ViolationType::None => "none",
            ViolationType::NoFace => "no_face",
            ViolationType::MultipleFaces => "multiple_faces",
            ViolationType::FaceMismatch => "face_mismatch",
        }
    }
}

/// A recorded rule breach with the frame that showed it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Violation {
    pub timestamp: DateTime<Utc>,
    pub face_count: usize,
    pub kind: ViolationType,
    pub match_distance: Option<f64>,
    pub evidence: Evidence,
}

impl Violation {
    /// Returns `None` for [`ViolationType::None`], which is never recorded.
    pub fn new(
        timestamp: DateTime<Utc>,
        face_count: usize,
        kind: ViolationType,
        match_distance: Option<f64>,
        evidence: Evidence,
    ) -> Option<Self> {
        kind.is_violation().then_some(Self {
            timestamp,
            face_count,
            kind,
            match_distance,
            evidence,
        })
    }
}

/// Per-kind totals over a session's log.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ViolationSummary {
    pub total: usize,
    pub no_face: usize,
    pub multiple_faces: usize,
    pub face_mismatch: usize,
    pub first_at: Option<DateTime<Utc>>,
    pub last_at: Option<DateTime<Utc>>,
}

/// Append-only, chronologically ordered record of violations.
#[derive(Clone, Debug, Default)]
pub struct ViolationLog {
    entries: Vec<Violation>,
}

impl ViolationLog {
    pub(crate) fn append(&mut self, violation: Violation) {
        self.entries.push(violation);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn as_slice(&self) -> &[Violation] {
        &self.entries
    }

    pub fn summary(&self) -> ViolationSummary {
        let mut summary = ViolationSummary {
            total: self.entries.len(),
            first_at: self.entries.first().map(|v| v.timestamp),
            last_at: self.entries.last().map(|v| v.timestamp),
            ..Default::default()
        };
        for violation in &self.entries {
            match violation.kind {
                ViolationType::NoFace => summary.no_face += 1,
                ViolationType::MultipleFaces => summary.multiple_faces += 1,
                ViolationType::FaceMismatch => summary.face_mismatch += 1,
                ViolationType::None => {}
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    fn violation(seconds: i64, kind: ViolationType) -> Violation {
        Violation::new(at(seconds), 0, kind, None, Evidence::empty()).unwrap()
    }

    #[test]
    fn test_none_is_not_recordable() {
        assert!(Violation::new(at(0), 1, ViolationType::None, Some(0.1), Evidence::empty()).is_none());
    }

    #[test]
    fn test_log_keeps_insertion_order() {
        let mut log = ViolationLog::default();
        log.append(violation(0, ViolationType::NoFace));
        log.append(violation(1, ViolationType::FaceMismatch));
        log.append(violation(2, ViolationType::MultipleFaces));

        let kinds: Vec<_> = log.as_slice().iter().map(|v| v.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ViolationType::NoFace,
                ViolationType::FaceMismatch,
                ViolationType::MultipleFaces
            ]
        );
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_summary_counts_each_kind() {
        let mut log = ViolationLog::default();
        log.append(violation(3, ViolationType::NoFace));
        log.append(violation(5, ViolationType::NoFace));
        log.append(violation(9, ViolationType::MultipleFaces));

        let summary = log.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.no_face, 2);
        assert_eq!(summary.multiple_faces, 1);
        assert_eq!(summary.face_mismatch, 0);
        assert_eq!(summary.first_at, Some(at(3)));
        assert_eq!(summary.last_at, Some(at(9)));
    }

    #[test]
    fn test_empty_summary() {
        let summary = ViolationLog::default().summary();
        assert_eq!(summary, ViolationSummary::default());
    }

    #[test]
    fn test_violation_type_serializes_snake_case() {
        let json = serde_json::to_string(&ViolationType::MultipleFaces).unwrap();
        assert_eq!(json, "\"multiple_faces\"");
        assert_eq!(ViolationType::FaceMismatch.as_str(), "face_mismatch");
    }
}
