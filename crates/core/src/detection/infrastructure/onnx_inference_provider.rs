use std::path::PathBuf;
use std::sync::Arc;

use crate::detection::domain::detected_face::DetectedFace;
use crate::detection::domain::detector_ladder::DetectorOptions;
use crate::detection::domain::inference_provider::{
    InferenceProvider, ModelLoadError, ModelSource,
};
use crate::detection::infrastructure::model_resolver::{self, ModelResolveError, ProgressFn};
use crate::detection::infrastructure::onnx_face_detector::OnnxFaceDetector;
use crate::detection::infrastructure::onnx_face_embedder::OnnxFaceEmbedder;
use crate::shared::constants::{DETECTOR_MODEL_NAME, EMBEDDING_MODEL_NAME};
use crate::shared::frame::Frame;

/// Context added around each face box before embedding, as a fraction of
/// the box size. ArcFace was trained on loosely cropped faces.
const EMBED_PADDING: f64 = 0.1;

/// Match threshold suited to this provider. ArcFace embeddings are
/// L2-normalized, so Euclidean distances lie in `[0, 2]` and the 128-d
/// default in [`DEFAULT_MATCH_THRESHOLD`] rejects most genuine matches.
///
/// [`DEFAULT_MATCH_THRESHOLD`]: crate::shared::constants::DEFAULT_MATCH_THRESHOLD
pub const ARCFACE_MATCH_THRESHOLD: f64 = 1.0;

/// Inference provider backed by a YOLO face detector and an ArcFace
/// embedder, both running on ONNX Runtime.
///
/// Pair it with [`ARCFACE_MATCH_THRESHOLD`] in `MonitorConfig::match_threshold`.
pub struct OnnxInferenceProvider {
    detector: Option<OnnxFaceDetector>,
    embedder: Option<OnnxFaceEmbedder>,
    progress: Option<Arc<ProgressFn>>,
}

impl OnnxInferenceProvider {
    pub fn new() -> Self {
        Self {
            detector: None,
            embedder: None,
            progress: None,
        }
    }

    /// Reports `(downloaded, total)` bytes while a remote source downloads.
    pub fn with_download_progress(mut self, progress: Arc<ProgressFn>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn is_loaded(&self) -> bool {
        self.detector.is_some() && self.embedder.is_some()
    }

    fn resolve(&self, source: &ModelSource, name: &str) -> Result<PathBuf, ModelLoadError> {
        let resolved = match source {
            ModelSource::Local(dir) => model_resolver::resolve_local(dir, name),
            ModelSource::Remote(base_url) => {
                model_resolver::resolve_remote(name, base_url, self.progress.as_deref())
            }
        };
        resolved.map_err(|e| match e {
            ModelResolveError::Missing(path) => ModelLoadError::Missing(path),
            other => ModelLoadError::Unavailable {
                source_desc: source.to_string(),
                reason: other.to_string(),
            },
        })
    }
}

impl Default for OnnxInferenceProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceProvider for OnnxInferenceProvider {
    fn load_models(&mut self, source: &ModelSource) -> Result<(), ModelLoadError> {
        let detector_path = self.resolve(source, DETECTOR_MODEL_NAME)?;
        let embedder_path = self.resolve(source, EMBEDDING_MODEL_NAME)?;

        let detector = OnnxFaceDetector::new(&detector_path)
            .map_err(|e| ModelLoadError::Runtime(format!("{}: {e}", detector_path.display())))?;
        let embedder = OnnxFaceEmbedder::new(&embedder_path)
            .map_err(|e| ModelLoadError::Runtime(format!("{}: {e}", embedder_path.display())))?;

        log::info!(
            "Loaded face models from {source} ({}, {})",
            detector_path.display(),
            embedder_path.display()
        );
        self.detector = Some(detector);
        self.embedder = Some(embedder);
        Ok(())
    }

    fn detect_faces(
        &mut self,
        frame: &Frame,
        options: &DetectorOptions,
    ) -> Result<Vec<DetectedFace>, Box<dyn std::error::Error>> {
        let (Some(detector), Some(embedder)) = (self.detector.as_mut(), self.embedder.as_mut())
        else {
            return Err("face models are not loaded".into());
        };

        let raw_faces = detector.detect(frame, options)?;
        let mut faces = Vec::with_capacity(raw_faces.len());
        for raw in raw_faces {
            let crop = frame.crop(&raw.region.padded(EMBED_PADDING));
            let embedding = if crop.is_empty() {
                None
            } else {
                Some(embedder.embed(&crop)?)
            };
            let mut face = DetectedFace::new(raw.region, raw.confidence, embedding);
            if let Some(landmarks) = raw.landmarks {
                face = face.with_landmarks(landmarks);
            }
            faces.push(face);
        }
        Ok(faces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_arcface_threshold_separates_normalized_embeddings() {
        use crate::detection::domain::embedding::Embedding;
        use crate::shared::constants::DEFAULT_MATCH_THRESHOLD;
        use std::f32::consts::FRAC_1_SQRT_2;

        let provider = OnnxInferenceProvider::new();
        let reference = Embedding::new(vec![1.0, 0.0]);
        // 45 degrees apart: same person under different lighting.
        let similar = Embedding::new(vec![FRAC_1_SQRT_2, FRAC_1_SQRT_2]);
        let orthogonal = Embedding::new(vec![0.0, 1.0]);

        let d_similar = provider.distance(&reference, &similar);
        assert!(d_similar <= ARCFACE_MATCH_THRESHOLD);
        assert!(d_similar > DEFAULT_MATCH_THRESHOLD);
        assert!(provider.distance(&reference, &orthogonal) > ARCFACE_MATCH_THRESHOLD);
    }

    #[test]
    fn test_detect_before_load_is_an_error() {
        let mut provider = OnnxInferenceProvider::new();
        let frame = Frame::new(vec![0u8; 4 * 4 * 3], 4, 4, 3, 0);
        let result = provider.detect_faces(&frame, &DetectorOptions::new(224, 0.3));
        assert!(result.is_err());
        assert!(!provider.is_loaded());
    }

    #[test]
    fn test_local_source_without_models_reports_missing() {
        let tmp = TempDir::new().unwrap();
        let mut provider = OnnxInferenceProvider::new();
        let err = provider
            .load_models(&ModelSource::Local(tmp.path().to_path_buf()))
            .unwrap_err();
        assert!(matches!(err, ModelLoadError::Missing(p) if p.ends_with(DETECTOR_MODEL_NAME)));
        assert!(!provider.is_loaded());
    }

    #[test]
    fn test_local_source_with_corrupt_model_reports_runtime_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(DETECTOR_MODEL_NAME), b"not an onnx graph").unwrap();
        fs::write(tmp.path().join(EMBEDDING_MODEL_NAME), b"not an onnx graph").unwrap();

        let mut provider = OnnxInferenceProvider::new();
        let err = provider
            .load_models(&ModelSource::Local(tmp.path().to_path_buf()))
            .unwrap_err();
        assert!(matches!(err, ModelLoadError::Runtime(_)));
        assert!(!provider.is_loaded());
    }
}
