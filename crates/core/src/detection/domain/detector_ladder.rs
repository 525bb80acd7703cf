use serde::{Deserialize, Serialize};

use crate::detection::domain::detected_face::DetectedFace;
use crate::detection::domain::inference_provider::InferenceProvider;
use crate::shared::frame::Frame;

/// Tuning knobs for a single detection pass.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectorOptions {
    /// Square network input resolution in pixels.
    pub input_size: u32,
    /// Minimum detection confidence (0.0-1.0).
    pub score_threshold: f64,
}

impl DetectorOptions {
    pub const fn new(input_size: u32, score_threshold: f64) -> Self {
        Self {
            input_size,
            score_threshold,
        }
    }
}

/// Rungs tried in order: cheapest and most sensitive first, then larger
/// inputs with stricter thresholds for poorly lit or low quality frames.
///
/// Reference capture and periodic sampling share this one ladder, so a face
/// that enrolls is found by ticks with the same settings.
pub const DEFAULT_LADDER: [DetectorOptions; 3] = [
    DetectorOptions::new(224, 0.3),
    DetectorOptions::new(320, 0.4),
    DetectorOptions::new(416, 0.5),
];

/// Result of running a ladder: the faces from the first rung that found
/// any, and that rung's position.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LadderOutcome {
    pub faces: Vec<DetectedFace>,
    pub rung: Option<usize>,
}

impl LadderOutcome {
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }
}

/// Ordered list of detector configurations with a first-success-wins policy.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectorLadder {
    rungs: Vec<DetectorOptions>,
}

impl DetectorLadder {
    pub fn new(rungs: Vec<DetectorOptions>) -> Result<Self, &'static str> {
        if rungs.is_empty() {
            return Err("detector ladder needs at least one configuration");
        }
        Ok(Self { rungs })
    }

    pub fn rungs(&self) -> &[DetectorOptions] {
        &self.rungs
    }

    /// Runs each rung until one returns at least one face. An exhausted
    /// ladder yields zero faces. Provider errors abort the run.
    pub fn run(
        &self,
        provider: &mut dyn InferenceProvider,
        frame: &Frame,
    ) -> Result<LadderOutcome, Box<dyn std::error::Error>> {
        for (rung, options) in self.rungs.iter().enumerate() {
            let faces = provider.detect_faces(frame, options)?;
            if !faces.is_empty() {
                if rung > 0 {
                    log::debug!(
                        "Detected {} face(s) on ladder rung {rung} (input {}, threshold {})",
                        faces.len(),
                        options.input_size,
                        options.score_threshold
                    );
                }
                return Ok(LadderOutcome {
                    faces,
                    rung: Some(rung),
                });
            }
        }
        Ok(LadderOutcome::default())
    }
}

impl Default for DetectorLadder {
    fn default() -> Self {
        Self {
            rungs: DEFAULT_LADDER.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::inference_provider::{ModelLoadError, ModelSource};
    use crate::shared::region::Region;

    /// Returns `counts[i]` faces for the i-th call and records the options.
    struct ScriptedProvider {
        counts: Vec<usize>,
        seen: Vec<DetectorOptions>,
        fail_on_call: Option<usize>,
    }

    impl ScriptedProvider {
        fn new(counts: Vec<usize>) -> Self {
            Self {
                counts,
                seen: Vec::new(),
                fail_on_call: None,
            }
        }
    }

    impl InferenceProvider for ScriptedProvider {
        fn load_models(&mut self, _source: &ModelSource) -> Result<(), ModelLoadError> {
            Ok(())
        }

        fn detect_faces(
            &mut self,
            _frame: &Frame,
            options: &DetectorOptions,
        ) -> Result<Vec<DetectedFace>, Box<dyn std::error::Error>> {
            let call = self.seen.len();
            self.seen.push(*options);
            if self.fail_on_call == Some(call) {
                return Err("inference backend crashed".into());
            }
            let n = self.counts.get(call).copied().unwrap_or(0);
            Ok((0..n)
                .map(|i| DetectedFace::new(Region::new(i as i32 * 50, 0, 40, 40), 0.9, None))
                .collect())
        }
    }

    fn frame() -> Frame {
        Frame::new(vec![0u8; 8 * 8 * 3], 8, 8, 3, 0)
    }

    #[test]
    fn test_empty_ladder_rejected() {
        assert!(DetectorLadder::new(Vec::new()).is_err());
    }

    #[test]
    fn test_default_ladder_escalates() {
        let ladder = DetectorLadder::default();
        let rungs = ladder.rungs();
        assert_eq!(rungs.len(), 3);
        for pair in rungs.windows(2) {
            assert!(pair[0].input_size < pair[1].input_size);
            assert!(pair[0].score_threshold < pair[1].score_threshold);
        }
    }

    #[test]
    fn test_first_rung_success_stops_ladder() {
        let mut provider = ScriptedProvider::new(vec![1, 2, 2]);
        let outcome = DetectorLadder::default().run(&mut provider, &frame()).unwrap();

        assert_eq!(outcome.face_count(), 1);
        assert_eq!(outcome.rung, Some(0));
        assert_eq!(provider.seen.len(), 1);
    }

    #[test]
    fn test_later_rung_used_when_earlier_find_nothing() {
        let mut provider = ScriptedProvider::new(vec![0, 0, 2]);
        let outcome = DetectorLadder::default().run(&mut provider, &frame()).unwrap();

        assert_eq!(outcome.face_count(), 2);
        assert_eq!(outcome.rung, Some(2));
        assert_eq!(provider.seen, DEFAULT_LADDER.to_vec());
    }

    #[test]
    fn test_exhausted_ladder_reports_zero_faces() {
        let mut provider = ScriptedProvider::new(vec![0, 0, 0]);
        let outcome = DetectorLadder::default().run(&mut provider, &frame()).unwrap();

        assert_eq!(outcome.face_count(), 0);
        assert_eq!(outcome.rung, None);
        assert_eq!(provider.seen.len(), 3);
    }

    #[test]
    fn test_provider_error_aborts_run() {
        let mut provider = ScriptedProvider::new(vec![0, 1]);
        provider.fail_on_call = Some(1);
        assert!(DetectorLadder::default().run(&mut provider, &frame()).is_err());
        assert_eq!(provider.seen.len(), 2);
    }
}
