use serde::Serialize;
use thiserror::Error;

use crate::monitoring::domain::detection_result::DetectionResult;
use crate::monitoring::domain::reference_face::ReferenceFace;
use crate::monitoring::domain::violation::{Violation, ViolationLog};

/// Lifecycle position of a monitoring session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    #[default]
    Idle,
    /// Camera running, no reference enrolled.
    Previewing,
    /// Reference enrolled, not yet monitoring.
    Enrolled,
    Monitoring,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TransitionError {
    #[error("cannot {action} while {from:?}")]
    Invalid {
        from: SessionPhase,
        action: &'static str,
    },
    #[error("no reference face has been captured")]
    NoReference,
}

/// State of one camera session, from `start` until `end`.
///
/// Everything here is cleared when the session ends; nothing outlives it.
#[derive(Clone, Debug, Default)]
pub struct Session {
    id: u64,
    phase: SessionPhase,
    reference: Option<ReferenceFace>,
    log: ViolationLog,
    current_face_count: usize,
    is_violating: bool,
    last_match_distance: Option<f64>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase != SessionPhase::Idle
    }

    pub fn is_monitoring(&self) -> bool {
        self.phase == SessionPhase::Monitoring
    }

    /// True when this is the live session with the given id.
    pub fn is_current(&self, id: u64) -> bool {
        self.is_active() && self.id == id
    }

    pub fn reference(&self) -> Option<&ReferenceFace> {
        self.reference.as_ref()
    }

    pub fn log(&self) -> &ViolationLog {
        &self.log
    }

    pub fn current_face_count(&self) -> usize {
        self.current_face_count
    }

    pub fn is_violating(&self) -> bool {
        self.is_violating
    }

    pub fn last_match_distance(&self) -> Option<f64> {
        self.last_match_distance
    }

    pub fn start(&mut self, id: u64) -> Result<(), TransitionError> {
        if self.phase != SessionPhase::Idle {
            return Err(self.invalid("start"));
        }
        *self = Self {
            id,
            phase: SessionPhase::Previewing,
            ..Self::default()
        };
        Ok(())
    }

    /// Stores `reference`, replacing any earlier one. Enrolling again while
    /// enrolled or monitoring keeps the current phase.
    pub fn enroll(&mut self, reference: ReferenceFace) -> Result<(), TransitionError> {
        match self.phase {
            SessionPhase::Idle => return Err(self.invalid("enroll")),
            SessionPhase::Previewing => self.phase = SessionPhase::Enrolled,
            SessionPhase::Enrolled | SessionPhase::Monitoring => {}
        }
        self.reference = Some(reference);
        Ok(())
    }

    pub fn begin_monitoring(&mut self) -> Result<(), TransitionError> {
        match self.phase {
            SessionPhase::Idle => Err(self.invalid("begin monitoring")),
            SessionPhase::Previewing => Err(TransitionError::NoReference),
            SessionPhase::Enrolled => {
                self.phase = SessionPhase::Monitoring;
                Ok(())
            }
            SessionPhase::Monitoring => Ok(()),
        }
    }

    /// Returns to `Idle`, dropping the reference, the log and the counters.
    pub fn end(&mut self) {
        *self = Self {
            id: self.id,
            ..Self::default()
        };
    }

    /// Folds a completed tick into the observable fields. Returns whether
    /// the frame is a violation that must be recorded.
    pub fn apply(&mut self, result: &DetectionResult) -> bool {
        self.current_face_count = result.face_count;
        self.last_match_distance = result.match_distance;
        self.is_violating = self.is_monitoring() && result.violation_type.is_violation();
        self.is_violating
    }

    pub fn record(&mut self, violation: Violation) -> Result<(), TransitionError> {
        if !self.is_monitoring() {
            return Err(self.invalid("record a violation"));
        }
        self.log.append(violation);
        Ok(())
    }

    fn invalid(&self, action: &'static str) -> TransitionError {
        TransitionError::Invalid {
            from: self.phase,
            action,
        }
    }
}
