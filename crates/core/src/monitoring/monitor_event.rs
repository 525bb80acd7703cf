use serde::Serialize;

use crate::monitoring::domain::session::SessionPhase;
use crate::monitoring::domain::violation::Violation;

/// Point-in-time view of the monitor for consumers.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MonitorSnapshot {
    pub phase: SessionPhase,
    pub active: bool,
    pub monitoring: bool,
    pub models_ready: bool,
    /// Why the last model load failed, while models are not ready.
    pub model_error: Option<String>,
    pub current_face_count: usize,
    pub is_violating: bool,
    pub last_match_distance: Option<f64>,
    pub violation_count: usize,
}

/// Notifications delivered to [`FaceMonitor::subscribe`] receivers.
///
/// [`FaceMonitor::subscribe`]: crate::monitoring::face_monitor::FaceMonitor::subscribe
#[derive(Clone, Debug, PartialEq)]
pub enum MonitorEvent {
    StateChanged(MonitorSnapshot),
    ViolationRecorded(Violation),
    CameraStopped,
}
