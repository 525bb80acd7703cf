use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::camera::domain::camera_source::StreamConstraints;
use crate::detection::domain::detector_ladder::{DetectorLadder, DetectorOptions, DEFAULT_LADDER};
use crate::detection::domain::inference_provider::ModelSources;
use crate::shared::constants::{
    DEFAULT_EVIDENCE_QUALITY, DEFAULT_MATCH_THRESHOLD, DEFAULT_SAMPLE_INTERVAL_MS,
};

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("sample interval must be at least 1 ms")]
    ZeroInterval,
    #[error("match threshold must be a positive number, got {0}")]
    InvalidThreshold(f64),
    #[error("detector ladder needs at least one configuration")]
    EmptyLadder,
    #[error("ladder rung {index} is invalid: {reason}")]
    InvalidRung { index: usize, reason: String },
    #[error("stream size must be non-zero, got {width}x{height}")]
    InvalidStreamSize { width: u32, height: u32 },
    #[error("evidence quality must be within 1-100, got {0}")]
    InvalidQuality(u8),
}

/// Tunables of a [`FaceMonitor`](crate::monitoring::face_monitor::FaceMonitor).
///
/// Every field has a default, so a JSON config only needs the keys it
/// changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub sample_interval_ms: u64,
    /// Maximum embedding distance accepted as the enrolled person.
    ///
    /// The default suits 128-d descriptors. Providers with L2-normalized
    /// embeddings need a larger value, e.g.
    /// [`ARCFACE_MATCH_THRESHOLD`](crate::detection::infrastructure::onnx_inference_provider::ARCFACE_MATCH_THRESHOLD)
    /// for `OnnxInferenceProvider`.
    pub match_threshold: f64,
    pub ladder: Vec<DetectorOptions>,
    pub stream: StreamConstraints,
    pub models: ModelSources,
    pub evidence_quality: u8,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            ladder: DEFAULT_LADDER.to_vec(),
            stream: StreamConstraints::default(),
            models: ModelSources::default(),
            evidence_quality: DEFAULT_EVIDENCE_QUALITY,
        }
    }
}

impl MonitorConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if !(self.match_threshold.is_finite() && self.match_threshold > 0.0) {
            return Err(ConfigError::InvalidThreshold(self.match_threshold));
        }
        if self.ladder.is_empty() {
            return Err(ConfigError::EmptyLadder);
        }
        for (index, rung) in self.ladder.iter().enumerate() {
            if rung.input_size == 0 {
                return Err(ConfigError::InvalidRung {
                    index,
                    reason: "input size is zero".into(),
                });
            }
            if !(0.0..=1.0).contains(&rung.score_threshold) {
                return Err(ConfigError::InvalidRung {
                    index,
                    reason: format!("score threshold {} is outside 0-1", rung.score_threshold),
                });
            }
        }
        if self.stream.width == 0 || self.stream.height == 0 {
            return Err(ConfigError::InvalidStreamSize {
                width: self.stream.width,
                height: self.stream.height,
            });
        }
        if !(1..=100).contains(&self.evidence_quality) {
            return Err(ConfigError::InvalidQuality(self.evidence_quality));
        }
        Ok(())
    }

    /// The configured rungs as a ladder. Call after [`MonitorConfig::validate`].
    pub fn detector_ladder(&self) -> Result<DetectorLadder, ConfigError> {
        DetectorLadder::new(self.ladder.clone()).map_err(|_| ConfigError::EmptyLadder)
    }
}
