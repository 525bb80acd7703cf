use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use chrono::Utc;
use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;

use crate::camera::domain::camera_source::{CameraError, CameraSource, VideoStream};
use crate::detection::domain::detector_ladder::DetectorLadder;
use crate::detection::domain::inference_provider::InferenceProvider;
use crate::evidence::domain::snapshot_encoder::SnapshotEncoder;
use crate::monitoring::domain::reference_face::ReferenceFace;
use crate::monitoring::domain::session::{Session, TransitionError};
use crate::monitoring::domain::violation::{Violation, ViolationSummary};
use crate::monitoring::monitor_config::{ConfigError, MonitorConfig};
use crate::monitoring::monitor_event::{MonitorEvent, MonitorSnapshot};
use crate::monitoring::sampler::{self, SkipReason, TickOutcome};

/// Outcome of a reference capture attempt that reached the detector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReferenceCapture {
    /// Exactly one face with a usable embedding; it is now the reference.
    Captured,
    NoFace,
    MultipleFaces { count: usize },
    /// One face was found but the provider could not describe it.
    MissingEmbedding,
    FrameNotReady,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MonitorError {
    #[error("camera is not active")]
    CameraInactive,
    #[error("face models are not loaded")]
    ModelsNotReady,
    #[error("no reference face has been captured")]
    NoReferenceFace,
    #[error("face detection failed: {0}")]
    Inference(String),
}

/// Fields guarded by the state lock.
#[derive(Default)]
pub(crate) struct MonitorState {
    pub(crate) session: Session,
    pub(crate) models_ready: bool,
    pub(crate) model_error: Option<String>,
}

impl MonitorState {
    pub(crate) fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            phase: self.session.phase(),
            active: self.session.is_active(),
            monitoring: self.session.is_monitoring(),
            models_ready: self.models_ready,
            model_error: self.model_error.clone(),
            current_face_count: self.session.current_face_count(),
            is_violating: self.session.is_violating(),
            last_match_distance: self.session.last_match_distance(),
            violation_count: self.session.log().len(),
        }
    }
}

/// Everything the sampling worker needs, shared with the controller.
///
/// Lock order: provider before state. The subscriber list is a leaf lock.
pub(crate) struct Shared {
    pub(crate) config: MonitorConfig,
    pub(crate) ladder: DetectorLadder,
    pub(crate) provider: Mutex<Box<dyn InferenceProvider>>,
    pub(crate) encoder: Box<dyn SnapshotEncoder>,
    pub(crate) state: Mutex<MonitorState>,
    /// Held for the duration of a tick; a tick that cannot take it is dropped.
    pub(crate) busy: Mutex<()>,
    subscribers: Mutex<Vec<Sender<MonitorEvent>>>,
}

impl Shared {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lock_provider(&self) -> MutexGuard<'_, Box<dyn InferenceProvider>> {
        self.provider.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delivers `event` to every live subscriber, forgetting those whose
    /// receiver was dropped.
    pub(crate) fn emit(&self, event: MonitorEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// The live camera of one session. Dropping it releases the device and
/// tells the sampling worker to exit.
struct CameraSession {
    id: u64,
    stream: Arc<dyn VideoStream>,
    shutdown: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.shutdown.take();
        self.stream.stop();
        // The worker exits on its own; a tick still in flight is discarded
        // by its session id.
        self.worker.take();
    }
}

/// Face-presence monitoring controller.
///
/// Owns the camera session, the periodic detection loop, the reference
/// face and the violation log. All methods take `&self`; the monitor can be
/// shared between threads.
pub struct FaceMonitor {
    shared: Arc<Shared>,
    camera: Mutex<Box<dyn CameraSource>>,
    /// Lock order: active, then camera, then provider, then state.
    active: Mutex<Option<CameraSession>>,
    next_session_id: AtomicU64,
}

impl FaceMonitor {
    pub fn new(
        config: MonitorConfig,
        provider: Box<dyn InferenceProvider>,
        camera: Box<dyn CameraSource>,
        encoder: Box<dyn SnapshotEncoder>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let ladder = config.detector_ladder()?;
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                ladder,
                provider: Mutex::new(provider),
                encoder,
                state: Mutex::new(MonitorState::default()),
                busy: Mutex::new(()),
                subscribers: Mutex::new(Vec::new()),
            }),
            camera: Mutex::new(camera),
            active: Mutex::new(None),
            next_session_id: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.shared.config
    }

    /// Loads the face models, trying each configured source in order.
    ///
    /// Returns whether models are ready. Failure is never an error: it is
    /// reported through [`MonitorSnapshot::model_error`] and the monitor
    /// keeps working in preview-only mode.
    pub fn initialize(&self) -> bool {
        let mut provider = self.shared.lock_provider();
        if self.shared.lock_state().models_ready {
            return true;
        }

        let mut failures = Vec::new();
        for source in self.shared.config.models.candidates() {
            match provider.load_models(source) {
                Ok(()) => {
                    log::info!("Face models ready ({source})");
                    let mut state = self.shared.lock_state();
                    state.models_ready = true;
                    state.model_error = None;
                    self.shared.emit(MonitorEvent::StateChanged(state.snapshot()));
                    return true;
                }
                Err(e) => {
                    log::warn!("Could not load face models from {source}: {e}");
                    failures.push(format!("{source}: {e}"));
                }
            }
        }

        let mut state = self.shared.lock_state();
        state.model_error = Some(failures.join("; "));
        self.shared.emit(MonitorEvent::StateChanged(state.snapshot()));
        false
    }

    /// Opens the camera and starts sampling. Does nothing when a session is
    /// already running.
    pub fn start_camera(&self) -> Result<(), CameraError> {
        let mut active = self.lock_active();
        if active.is_some() {
            log::debug!("Camera already active");
            return Ok(());
        }

        if !self.models_ready() && !self.initialize() {
            log::warn!("Starting camera without face models; detection is disabled");
        }

        let stream = self
            .camera
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .request_stream(&self.shared.config.stream)?;

        let id = self.next_session_id.fetch_add(1, Ordering::SeqCst) + 1;
        if let Err(e) = self.shared.lock_state().session.start(id) {
            stream.stop();
            return Err(CameraError::Other(e.to_string()));
        }

        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(0);
        let spawned = sampler::spawn(Arc::clone(&self.shared), id, Arc::clone(&stream), shutdown_rx);
        let worker = match spawned {
            Ok(worker) => worker,
            Err(e) => {
                stream.stop();
                self.shared.lock_state().session.end();
                return Err(CameraError::Other(format!("failed to start sampler: {e}")));
            }
        };

        *active = Some(CameraSession {
            id,
            stream,
            shutdown: Some(shutdown_tx),
            worker: Some(worker),
        });
        log::info!("Camera session {id} started");

        let state = self.shared.lock_state();
        self.shared.emit(MonitorEvent::StateChanged(state.snapshot()));
        Ok(())
    }

    /// Releases the camera and clears the session: reference, log and
    /// counters. Does nothing when idle.
    pub fn stop_camera(&self) {
        let mut active = self.lock_active();
        let Some(session) = active.take() else {
            return;
        };
        let id = session.id;
        drop(session);

        let mut state = self.shared.lock_state();
        state.session.end();
        self.shared.emit(MonitorEvent::CameraStopped);
        self.shared.emit(MonitorEvent::StateChanged(state.snapshot()));
        log::info!("Camera session {id} stopped");
    }

    /// Runs one detection pass on the current frame and enrolls the face
    /// as the reference when exactly one is found.
    pub fn capture_reference_face(&self) -> Result<ReferenceCapture, MonitorError> {
        let (id, stream) = self.current_stream().ok_or(MonitorError::CameraInactive)?;
        if !self.models_ready() {
            return Err(MonitorError::ModelsNotReady);
        }
        if !stream.sink().has_usable_frame() {
            return Ok(ReferenceCapture::FrameNotReady);
        }
        let Some(frame) = stream.current_frame() else {
            return Ok(ReferenceCapture::FrameNotReady);
        };

        let outcome = {
            let mut provider = self.shared.lock_provider();
            self.shared
                .ladder
                .run(&mut **provider, &frame)
                .map_err(|e| MonitorError::Inference(e.to_string()))?
        };

        let face = match outcome.faces.as_slice() {
            [] => return Ok(ReferenceCapture::NoFace),
            [face] => face,
            faces => {
                return Ok(ReferenceCapture::MultipleFaces {
                    count: faces.len(),
                })
            }
        };
        let Some(reference) = ReferenceFace::from_face(face, Utc::now()) else {
            log::warn!("Detected a face but the provider returned no usable embedding");
            return Ok(ReferenceCapture::MissingEmbedding);
        };

        let mut state = self.shared.lock_state();
        if !state.session.is_current(id) {
            return Err(MonitorError::CameraInactive);
        }
        state
            .session
            .enroll(reference)
            .map_err(|_| MonitorError::CameraInactive)?;
        log::info!(
            "Reference face captured (score {:.2}, {}-d embedding)",
            face.score,
            state
                .session
                .reference()
                .map_or(0, |r| r.embedding().dimension())
        );
        self.shared.emit(MonitorEvent::StateChanged(state.snapshot()));
        Ok(ReferenceCapture::Captured)
    }

    /// Starts recording violations. Requires an active camera, loaded
    /// models and a reference face.
    pub fn start_monitoring(&self) -> Result<(), MonitorError> {
        let active = self.lock_active();
        if active.is_none() {
            return Err(MonitorError::CameraInactive);
        }
        let mut state = self.shared.lock_state();
        if !state.models_ready {
            return Err(MonitorError::ModelsNotReady);
        }
        state.session.begin_monitoring().map_err(|e| match e {
            TransitionError::NoReference => MonitorError::NoReferenceFace,
            TransitionError::Invalid { .. } => MonitorError::CameraInactive,
        })?;
        log::info!("Monitoring started");
        self.shared.emit(MonitorEvent::StateChanged(state.snapshot()));
        Ok(())
    }

    /// Runs a sampling tick on the calling thread. Skipped if the worker is
    /// in the middle of one.
    pub fn sample_once(&self) -> TickOutcome {
        match self.current_stream() {
            Some((id, stream)) => sampler::run_tick(&self.shared, id, stream.as_ref()),
            None => TickOutcome::Skipped(SkipReason::CameraInactive),
        }
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        self.shared.lock_state().snapshot()
    }

    pub fn models_ready(&self) -> bool {
        self.shared.lock_state().models_ready
    }

    /// Violations of the current session, oldest first.
    pub fn violations(&self) -> Vec<Violation> {
        self.shared.lock_state().session.log().as_slice().to_vec()
    }

    pub fn violation_summary(&self) -> ViolationSummary {
        self.shared.lock_state().session.log().summary()
    }

    /// Receives every event published from now on.
    pub fn subscribe(&self) -> Receiver<MonitorEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.shared
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<CameraSession>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_stream(&self) -> Option<(u64, Arc<dyn VideoStream>)> {
        self.lock_active()
            .as_ref()
            .map(|session| (session.id, Arc::clone(&session.stream)))
    }
}

impl Drop for FaceMonitor {
    fn drop(&mut self) {
        self.stop_camera();
    }
}
