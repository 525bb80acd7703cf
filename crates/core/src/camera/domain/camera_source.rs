use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::{DEFAULT_CAMERA_HEIGHT, DEFAULT_CAMERA_WIDTH};
use crate::shared::frame::Frame;

/// Which camera the stream should come from, where a device offers a choice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    #[default]
    User,
    Environment,
}

/// Requested stream shape. Sources treat the size as a preference and
/// report the size they actually deliver through [`SinkState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConstraints {
    pub width: u32,
    pub height: u32,
    pub facing_mode: FacingMode,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self {
            width: DEFAULT_CAMERA_WIDTH,
            height: DEFAULT_CAMERA_HEIGHT,
            facing_mode: FacingMode::User,
        }
    }
}

/// How much media data a sink holds, ordered from nothing to enough to play.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

/// Playback state of the element that renders a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SinkState {
    pub width: u32,
    pub height: u32,
    pub ready_state: ReadyState,
    pub paused: bool,
    pub ended: bool,
}

impl SinkState {
    pub const NOT_READY: SinkState = SinkState {
        width: 0,
        height: 0,
        ready_state: ReadyState::HaveNothing,
        paused: false,
        ended: false,
    };

    /// True when the current frame can be fed to inference: known non-zero
    /// dimensions, current data available, still playing.
    pub fn has_usable_frame(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.ready_state >= ReadyState::HaveCurrentData
            && !self.paused
            && !self.ended
    }
}

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("no camera found: {0}")]
    NotFound(String),
    #[error("camera unavailable: {0}")]
    Other(String),
}

/// A live camera stream. Shared between the controller and its sampling
/// worker, so every method takes `&self`.
pub trait VideoStream: Send + Sync {
    fn sink(&self) -> SinkState;

    /// Latest decoded frame, if any has arrived yet.
    fn current_frame(&self) -> Option<Frame>;

    /// Releases the underlying device. Safe to call more than once.
    fn stop(&self);
}

/// Hands out camera streams.
pub trait CameraSource: Send {
    fn request_stream(
        &mut self,
        constraints: &StreamConstraints,
    ) -> Result<Arc<dyn VideoStream>, CameraError>;
}
