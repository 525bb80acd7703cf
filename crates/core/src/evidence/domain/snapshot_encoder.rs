use serde::Serialize;

use crate::shared::frame::Frame;

/// An encoded still image captured when a violation was recorded.
///
/// The bytes are left out of serialized output; consumers export them
/// separately (for example as one image file per violation).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Evidence {
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl Evidence {
    /// Placeholder for a violation whose frame could not be encoded.
    pub fn empty() -> Self {
        Self {
            mime_type: "",
            width: 0,
            height: 0,
            bytes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Encodes a camera frame into a self-contained image.
pub trait SnapshotEncoder: Send + Sync {
    fn encode(&self, frame: &Frame) -> Result<Evidence, Box<dyn std::error::Error>>;
}
