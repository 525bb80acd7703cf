pub const DETECTOR_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const EMBEDDING_MODEL_NAME: &str = "w600k_r50.onnx";

/// Release location the remote model source downloads from by default.
pub const MODEL_RELEASE_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0";

/// Directory searched by the default local model source, relative to the
/// working directory.
pub const BUNDLED_MODEL_DIR: &str = "models";

pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 1000;

/// Maximum embedding distance still accepted as the enrolled person.
/// Higher values are more tolerant.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.6;

pub const DEFAULT_CAMERA_WIDTH: u32 = 640;
pub const DEFAULT_CAMERA_HEIGHT: u32 = 480;

pub const DEFAULT_EVIDENCE_QUALITY: u8 = 80;
