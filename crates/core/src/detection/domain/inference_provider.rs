use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::domain::detected_face::DetectedFace;
use crate::detection::domain::detector_ladder::DetectorOptions;
use crate::detection::domain::embedding::Embedding;
use crate::shared::constants::{BUNDLED_MODEL_DIR, MODEL_RELEASE_URL};
use crate::shared::frame::Frame;

/// Where an inference provider loads its model files from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "location", rename_all = "lowercase")]
pub enum ModelSource {
    /// Directory containing the model files.
    Local(PathBuf),
    /// Base URL the model files are downloaded from.
    Remote(String),
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSource::Local(dir) => write!(f, "local:{}", dir.display()),
            ModelSource::Remote(url) => write!(f, "remote:{url}"),
        }
    }
}

/// Primary source plus at most one fallback, tried in that order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSources {
    pub primary: ModelSource,
    #[serde(default)]
    pub fallback: Option<ModelSource>,
}

impl ModelSources {
    pub fn candidates(&self) -> impl Iterator<Item = &ModelSource> {
        std::iter::once(&self.primary).chain(self.fallback.as_ref())
    }
}

impl Default for ModelSources {
    fn default() -> Self {
        Self {
            primary: ModelSource::Local(PathBuf::from(BUNDLED_MODEL_DIR)),
            fallback: Some(ModelSource::Remote(MODEL_RELEASE_URL.to_string())),
        }
    }
}

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("model file not found: {0}")]
    Missing(PathBuf),
    #[error("could not fetch model from {source_desc}: {reason}")]
    Unavailable { source_desc: String, reason: String },
    #[error("failed to initialise inference runtime: {0}")]
    Runtime(String),
}

/// Face detection and recognition capability consumed by the monitor.
///
/// Implementations may keep per-session state (runtime sessions, caches),
/// hence `&mut self` on the inference methods.
pub trait InferenceProvider: Send {
    /// Loads all models needed by [`InferenceProvider::detect_faces`].
    /// Calling it again after a success may reload from the new source.
    fn load_models(&mut self, source: &ModelSource) -> Result<(), ModelLoadError>;

    /// Detects faces in `frame` using the given tuning options. Different
    /// options may legitimately yield different face counts on one frame.
    fn detect_faces(
        &mut self,
        frame: &Frame,
        options: &DetectorOptions,
    ) -> Result<Vec<DetectedFace>, Box<dyn std::error::Error>>;

    /// Symmetric dissimilarity between two embeddings; zero for identical
    /// vectors.
    fn distance(&self, a: &Embedding, b: &Embedding) -> f64 {
        a.euclidean_distance(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sources_are_local_then_remote() {
        let sources = ModelSources::default();
        let candidates: Vec<_> = sources.candidates().collect();
        assert_eq!(candidates.len(), 2);
        assert!(matches!(candidates[0], ModelSource::Local(_)));
        assert!(matches!(candidates[1], ModelSource::Remote(_)));
    }

    #[test]
    fn test_candidates_without_fallback() {
        let sources = ModelSources {
            primary: ModelSource::Remote("https://example.com/models".into()),
            fallback: None,
        };
        assert_eq!(sources.candidates().count(), 1);
    }

    #[test]
    fn test_model_source_json_shape() {
        let json = serde_json::to_string(&ModelSource::Remote("https://x".into())).unwrap();
        assert_eq!(json, r#"{"kind":"remote","location":"https://x"}"#);
        let parsed: ModelSource =
            serde_json::from_str(r#"{"kind":"local","location":"/opt/models"}"#).unwrap();
        assert_eq!(parsed, ModelSource::Local(PathBuf::from("/opt/models")));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ModelSource::Local(PathBuf::from("models")).to_string(),
            "local:models"
        );
    }
}
