use std::sync::{Arc, TryLockError};
use std::thread::{self, JoinHandle};

use chrono::Utc;
use crossbeam_channel::Receiver;

use crate::camera::domain::camera_source::VideoStream;
use crate::evidence::domain::snapshot_encoder::Evidence;
use crate::monitoring::domain::detection_result::{classify, DetectionResult};
use crate::monitoring::domain::violation::Violation;
use crate::monitoring::face_monitor::Shared;
use crate::monitoring::monitor_event::MonitorEvent;
use crate::shared::frame::Frame;

/// Why a sampling tick ended without classifying a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Another tick was still running.
    Busy,
    FrameNotReady,
    ModelsNotReady,
    InferenceFailed,
    /// The session the tick belonged to has ended.
    Stale,
    CameraInactive,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TickOutcome {
    Skipped(SkipReason),
    Completed(DetectionResult),
}

/// Starts the sampling worker of session `id`. It ticks every configured
/// interval until `shutdown` is dropped or the session goes stale.
pub(crate) fn spawn(
    shared: Arc<Shared>,
    id: u64,
    stream: Arc<dyn VideoStream>,
    shutdown: Receiver<()>,
) -> std::io::Result<JoinHandle<()>> {
    let interval = shared.config.sample_interval();
    thread::Builder::new()
        .name("examguard-sampler".into())
        .spawn(move || {
            // A tick channel holds one pending tick; ticks missed during a
            // slow detection are dropped.
            let ticker = crossbeam_channel::tick(interval);
            log::debug!("Sampling session {id} every {interval:?}");
            loop {
                crossbeam_channel::select! {
                    recv(ticker) -> _ => {
                        if run_tick(&shared, id, stream.as_ref()) == TickOutcome::Skipped(SkipReason::Stale) {
                            break;
                        }
                    }
                    recv(shutdown) -> _ => break,
                }
            }
            log::debug!("Sampler for session {id} stopped");
        })
}

/// One sample: read the current frame, detect, classify, and fold the
/// result into session `id`.
pub(crate) fn run_tick(shared: &Shared, id: u64, stream: &dyn VideoStream) -> TickOutcome {
    let _busy = match shared.busy.try_lock() {
        Ok(guard) => guard,
        Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        Err(TryLockError::WouldBlock) => return TickOutcome::Skipped(SkipReason::Busy),
    };

    if !stream.sink().has_usable_frame() {
        return TickOutcome::Skipped(SkipReason::FrameNotReady);
    }
    let Some(frame) = stream.current_frame() else {
        return TickOutcome::Skipped(SkipReason::FrameNotReady);
    };

    {
        let state = shared.lock_state();
        if !state.session.is_current(id) {
            return TickOutcome::Skipped(SkipReason::Stale);
        }
        if !state.models_ready {
            return TickOutcome::Skipped(SkipReason::ModelsNotReady);
        }
    }

    let result = {
        let mut provider = shared.lock_provider();
        let outcome = match shared.ladder.run(&mut **provider, &frame) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("Face detection failed on frame {}: {e}", frame.sequence());
                return TickOutcome::Skipped(SkipReason::InferenceFailed);
            }
        };
        let reference = shared.lock_state().session.reference().cloned();
        classify(
            &outcome.faces,
            reference.as_ref(),
            shared.config.match_threshold,
            |a, b| provider.distance(a, b),
        )
    };

    // Encode outside the state lock when the frame will likely be recorded.
    let mut evidence = (result.violation_type.is_violation()
        && shared.lock_state().session.is_monitoring())
    .then(|| encode_evidence(shared, &frame));

    let mut state = shared.lock_state();
    if !state.session.is_current(id) {
        log::debug!("Discarding tick of ended session {id}");
        return TickOutcome::Skipped(SkipReason::Stale);
    }

    if state.session.apply(&result) {
        let evidence = evidence
            .take()
            .unwrap_or_else(|| encode_evidence(shared, &frame));
        if let Some(violation) = Violation::new(
            Utc::now(),
            result.face_count,
            result.violation_type,
            result.match_distance,
            evidence,
        ) {
            log::info!(
                "Violation recorded: {} ({} face(s){})",
                violation.kind.as_str(),
                violation.face_count,
                violation
                    .match_distance
                    .map(|d| format!(", distance {d:.3}"))
                    .unwrap_or_default()
            );
            if state.session.record(violation.clone()).is_ok() {
                shared.emit(MonitorEvent::ViolationRecorded(violation));
            }
        }
    }
    shared.emit(MonitorEvent::StateChanged(state.snapshot()));

    TickOutcome::Completed(result)
}

fn encode_evidence(shared: &Shared, frame: &Frame) -> Evidence {
    shared.encoder.encode(frame).unwrap_or_else(|e| {
        log::warn!("Could not encode evidence for frame {}: {e}", frame.sequence());
        Evidence::empty()
    })
}
