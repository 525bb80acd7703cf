//! ArcFace face embedder using ONNX Runtime.
//!
//! Produces L2-normalized 512-d identity embeddings from face crops, so the
//! Euclidean distance between two of them lies in `[0, 2]`.
use std::path::Path;

use crate::detection::domain::embedding::Embedding;
use crate::detection::infrastructure::execution_provider::build_session;
use crate::shared::frame::Frame;

const INPUT_SIZE: usize = 112;
const NORM_MEAN: f32 = 127.5;
const NORM_STD: f32 = 127.5;

pub struct OnnxFaceEmbedder {
    session: ort::session::Session,
}

impl OnnxFaceEmbedder {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            session: build_session(model_path)?,
        })
    }

    pub fn embed(&mut self, crop: &Frame) -> Result<Embedding, Box<dyn std::error::Error>> {
        if crop.is_empty() || crop.channels() != 3 {
            return Err(format!(
                "cannot embed a {}x{}x{} crop",
                crop.width(),
                crop.height(),
                crop.channels()
            )
            .into());
        }
        let tensor = preprocess(crop.data(), crop.width(), crop.height());
        let input_value = ort::value::Tensor::from_array(tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        let embedding_array = outputs[0].try_extract_array::<f32>()?;
        let embedding_slice = embedding_array
            .as_slice()
            .ok_or("Cannot get embedding slice")?;

        let mut values = embedding_slice.to_vec();
        l2_normalize(&mut values);
        Ok(Embedding::new(values))
    }
}

/// Resize crop to 112x112, normalize, NCHW layout.
fn preprocess(rgb_data: &[u8], width: u32, height: u32) -> ndarray::Array4<f32> {
    let src_w = width as usize;
    let src_h = height as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));

    for y in 0..INPUT_SIZE {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / INPUT_SIZE as f64) as usize).min(src_h - 1);
        for x in 0..INPUT_SIZE {
            let src_x =
                (((x as f64 + 0.5) * src_w as f64 / INPUT_SIZE as f64) as usize).min(src_w - 1);
            let offset = (src_y * src_w + src_x) * 3;
            if offset + 2 < rgb_data.len() {
                for c in 0..3 {
                    tensor[[0, c, y, x]] = (rgb_data[offset + c] as f32 - NORM_MEAN) / NORM_STD;
                }
            }
        }
    }

    tensor
}

pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize_unit_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        let mut v = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_normalized_distance_bounded_by_two() {
        let mut a = vec![1.0, 2.0, 3.0];
        let mut b = vec![-1.0, -2.0, -3.0];
        l2_normalize(&mut a);
        l2_normalize(&mut b);
        let d = Embedding::new(a).euclidean_distance(&Embedding::new(b));
        assert!((d - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_shape() {
        let data = vec![128u8; 50 * 50 * 3];
        let tensor = preprocess(&data, 50, 50);
        assert_eq!(tensor.shape(), &[1, 3, 112, 112]);
    }

    #[test]
    fn test_preprocess_normalization_range() {
        let white = preprocess(&vec![255u8; 10 * 10 * 3], 10, 10);
        let black = preprocess(&vec![0u8; 10 * 10 * 3], 10, 10);
        assert!((white[[0, 0, 0, 0]] - 1.0).abs() < 0.01);
        assert!((black[[0, 2, 111, 111]] + 1.0).abs() < 0.01);
    }

    #[test]
    fn test_preprocess_non_square_crop() {
        // Left half red, right half blue; the resize must keep that layout.
        let (w, h) = (20usize, 10usize);
        let mut data = Vec::with_capacity(w * h * 3);
        for _ in 0..h {
            for x in 0..w {
                if x < w / 2 {
                    data.extend_from_slice(&[255, 0, 0]);
                } else {
                    data.extend_from_slice(&[0, 0, 255]);
                }
            }
        }
        let tensor = preprocess(&data, w as u32, h as u32);
        assert!(tensor[[0, 0, 56, 10]] > 0.9);
        assert!(tensor[[0, 2, 56, 100]] > 0.9);
    }
}
