//! YOLO-pose face detector using ONNX Runtime via `ort`.
//!
//! Handles letterbox preprocessing, inference, confidence filtering, NMS and
//! landmark decoding. Thresholds and (for dynamic-shape models) the input
//! resolution come from the per-call [`DetectorOptions`].
use std::path::Path;

use crate::detection::domain::detected_face::FaceLandmarks;
use crate::detection::domain::detector_ladder::DetectorOptions;
use crate::detection::infrastructure::execution_provider::build_session;
use crate::detection::infrastructure::math;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

/// Number of keypoints per detection (5 landmarks × 3 values each: x, y, conf).
const NUM_KEYPOINT_VALUES: usize = 15;

/// Minimum keypoint confidence to treat a landmark as visible.
const KEYPOINT_CONF_THRESH: f64 = 0.5;

/// Input sizes are rounded to the network stride.
const STRIDE: u32 = 32;

/// A face box in original frame coordinates, before embedding.
#[derive(Clone, Debug, PartialEq)]
pub struct RawFace {
    pub region: Region,
    pub confidence: f64,
    pub landmarks: Option<FaceLandmarks>,
}

pub struct OnnxFaceDetector {
    session: ort::session::Session,
    /// Set when the model was exported with a static input shape; per-call
    /// input sizes are then ignored.
    fixed_input_size: Option<u32>,
}

impl OnnxFaceDetector {
    /// Load a YOLO face ONNX model.
    ///
    /// The input resolution is read from the model's input shape (expecting
    /// NCHW). A dynamic shape lets every call pick its own resolution.
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let session = build_session(model_path)?;

        let fixed_input_size = session.inputs().first().and_then(|input| {
            if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                if shape.len() >= 4 && shape[2] > 0 {
                    Some(shape[2] as u32)
                } else {
                    None
                }
            } else {
                None
            }
        });

        Ok(Self {
            session,
            fixed_input_size,
        })
    }

    pub fn detect(
        &mut self,
        frame: &Frame,
        options: &DetectorOptions,
    ) -> Result<Vec<RawFace>, Box<dyn std::error::Error>> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }
        let input_size = self
            .fixed_input_size
            .unwrap_or_else(|| align_to_stride(options.input_size));

        let (input_tensor, scale, pad_x, pad_y) = letterbox(frame, input_size);

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("face detector produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape().to_vec();
        if shape.len() != 3 {
            return Err(format!("Unexpected detector output shape: {shape:?}").into());
        }

        // Output is [1, features, detections] or [1, detections, features].
        let transposed = shape[1] < shape[2];
        let (num_dets, num_feats) = if transposed {
            (shape[2], shape[1])
        } else {
            (shape[1], shape[2])
        };
        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;

        let letterbox = Letterbox {
            scale,
            pad_x: pad_x as f64,
            pad_y: pad_y as f64,
        };
        let mut boxes = Vec::new();
        let mut scores = Vec::new();
        let mut landmarks = Vec::new();
        for i in 0..num_dets {
            let row: Vec<f32> = if transposed {
                (0..num_feats).map(|f| data[f * num_dets + i]).collect()
            } else {
                data[i * num_feats..(i + 1) * num_feats].to_vec()
            };
            let Some((bbox, conf, kps)) = parse_row(&row, &letterbox) else {
                continue;
            };
            if conf < options.score_threshold {
                continue;
            }
            boxes.push(bbox);
            scores.push(conf);
            landmarks.push(kps);
        }

        let faces = math::nms(&boxes, &scores, NMS_IOU_THRESH)
            .into_iter()
            .map(|i| RawFace {
                region: Region::from_corners(boxes[i][0], boxes[i][1], boxes[i][2], boxes[i][3])
                    .clamped(frame.width(), frame.height()),
                confidence: scores[i],
                landmarks: landmarks[i].clone(),
            })
            .filter(|face| face.region.area() > 0)
            .collect();

        Ok(faces)
    }
}

/// Maps letterboxed network coordinates back to the source frame.
struct Letterbox {
    scale: f64,
    pad_x: f64,
    pad_y: f64,
}

impl Letterbox {
    fn to_frame(&self, x: f64, y: f64) -> (f64, f64) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Decodes `[cx, cy, w, h, conf, kp0_x, kp0_y, kp0_conf, ...]`.
fn parse_row(
    row: &[f32],
    letterbox: &Letterbox,
) -> Option<([f64; 4], f64, Option<FaceLandmarks>)> {
    if row.len() < 5 {
        return None;
    }
    let (cx, cy, w, h) = (row[0] as f64, row[1] as f64, row[2] as f64, row[3] as f64);
    let conf = row[4] as f64;

    let (x1, y1) = letterbox.to_frame(cx - w / 2.0, cy - h / 2.0);
    let (x2, y2) = letterbox.to_frame(cx + w / 2.0, cy + h / 2.0);

    let landmarks = if row.len() >= 5 + NUM_KEYPOINT_VALUES {
        let mut pts = [(0.0f64, 0.0f64); 5];
        for (k, pt) in pts.iter_mut().enumerate() {
            let base = 5 + k * 3;
            if row[base + 2] as f64 >= KEYPOINT_CONF_THRESH {
                *pt = letterbox.to_frame(row[base] as f64, row[base + 1] as f64);
            }
        }
        Some(FaceLandmarks::new(pts))
    } else {
        None
    };

    Some(([x1, y1, x2, y2], conf, landmarks))
}

fn align_to_stride(size: u32) -> u32 {
    size.max(STRIDE).div_ceil(STRIDE) * STRIDE
}

/// Letterbox-resize a frame to `target_size` × `target_size`.
///
/// Returns `(NCHW float32 tensor, scale, pad_x, pad_y)`.
fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, f64, u32, u32) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // Padding is 114/255 gray, the YOLO training convention.
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    (tensor, scale, pad_x, pad_y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_letterbox_preserves_aspect_ratio() {
        // 640x480 camera frame → 320: scale 0.5, new 320x240, pad_y 40
        let frame = Frame::new(vec![128u8; 640 * 480 * 3], 640, 480, 3, 0);
        let (tensor, scale, pad_x, pad_y) = letterbox(&frame, 320);

        assert_eq!(tensor.shape(), &[1, 3, 320, 320]);
        assert_relative_eq!(scale, 0.5);
        assert_eq!(pad_x, 0);
        assert_eq!(pad_y, 40);
    }

    #[test]
    fn test_letterbox_values_normalized() {
        let frame = Frame::new(vec![255u8; 100 * 50 * 3], 100, 50, 3, 0);
        let (tensor, _, pad_x, pad_y) = letterbox(&frame, 224);
        assert!(pad_y > 0);

        let y = pad_y as usize + 1;
        let x = pad_x as usize + 1;
        assert!((tensor[[0, 0, y, x]] - 1.0).abs() < 0.01);
        assert!((tensor[[0, 0, 0, 0]] - 114.0 / 255.0).abs() < 0.01);
    }

    #[rstest]
    #[case(224, 224)]
    #[case(300, 320)]
    #[case(416, 416)]
    #[case(1, 32)]
    fn test_align_to_stride(#[case] requested: u32, #[case] expected: u32) {
        assert_eq!(align_to_stride(requested), expected);
    }

    #[test]
    fn test_parse_row_maps_back_to_frame() {
        let lb = Letterbox {
            scale: 0.5,
            pad_x: 0.0,
            pad_y: 40.0,
        };
        // Box centered at (100, 140) in network space, 40x40.
        let row = [100.0, 140.0, 40.0, 40.0, 0.8];
        let (bbox, conf, kps) = parse_row(&row, &lb).unwrap();

        assert_relative_eq!(conf, 0.8, epsilon = 1e-6);
        assert_relative_eq!(bbox[0], 160.0);
        assert_relative_eq!(bbox[1], 160.0);
        assert_relative_eq!(bbox[2], 240.0);
        assert_relative_eq!(bbox[3], 240.0);
        assert!(kps.is_none());
    }

    #[test]
    fn test_parse_row_hides_low_confidence_keypoints() {
        let lb = Letterbox {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        };
        let mut row = vec![50.0, 50.0, 20.0, 20.0, 0.9];
        for k in 0..5 {
            let conf = if k == 2 { 0.1 } else { 0.9 };
            row.extend_from_slice(&[10.0 + k as f32, 20.0, conf]);
        }
        let (_, _, kps) = parse_row(&row, &lb).unwrap();
        let kps = kps.unwrap();

        assert_eq!(kps.visible_count(), 4);
        assert_eq!(kps.points()[2], (0.0, 0.0));
        assert_eq!(kps.points()[0], (10.0, 20.0));
    }

    #[test]
    fn test_parse_row_too_short() {
        let lb = Letterbox {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        };
        assert!(parse_row(&[1.0, 2.0, 3.0], &lb).is_none());
    }
}
