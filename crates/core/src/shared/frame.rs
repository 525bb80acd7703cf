use ndarray::ArrayView3;

use crate::shared::region::Region;

/// A single camera frame: contiguous RGB bytes in row-major order.
///
/// Pixel format conversion happens inside the camera source; everything
/// downstream treats the data as packed `height x width x channels`.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    sequence: u64,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, sequence: u64) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            sequence,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Position of this frame in its capture stream.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Copies the part of the frame covered by `region`, clamped to the frame
    /// bounds. A region entirely outside the frame yields an empty frame.
    pub fn crop(&self, region: &Region) -> Frame {
        let clamped = region.clamped(self.width, self.height);
        let channels = self.channels as usize;
        let (x1, y1) = (clamped.x as usize, clamped.y as usize);
        let (w, h) = (clamped.width as usize, clamped.height as usize);

        let src = self.as_ndarray();
        let mut data = Vec::with_capacity(w * h * channels);
        for row in y1..y1 + h {
            for col in x1..x1 + w {
                for c in 0..channels {
                    data.push(src[[row, col, c]]);
                }
            }
        }

        Frame::new(data, w as u32, h as u32, self.channels, self.sequence)
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 4x3 RGB frame where each pixel's red channel holds `row * 10 + col`.
    fn gradient_frame() -> Frame {
        let mut data = Vec::new();
        for row in 0..3u8 {
            for col in 0..4u8 {
                data.extend_from_slice(&[row * 10 + col, 0, 0]);
            }
        }
        Frame::new(data, 4, 3, 3, 7)
    }

    #[test]
    fn test_construction_and_accessors() {
        let data = vec![0u8; 12]; // 2x2x3
        let frame = Frame::new(data.clone(), 2, 2, 3, 5);
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.sequence(), 5);
        assert_eq!(frame.data(), &data[..]);
        assert!(!frame.is_empty());
    }

    #[test]
    #[should_panic(expected = "data length must equal width * height * channels")]
    fn test_mismatched_data_length_panics_in_debug() {
        Frame::new(vec![0u8; 10], 2, 2, 3, 0);
    }

    #[test]
    fn test_as_ndarray_shape() {
        let frame = Frame::new(vec![0u8; 24], 4, 2, 3, 0);
        assert_eq!(frame.as_ndarray().shape(), &[2, 4, 3]);
    }

    #[test]
    fn test_crop_copies_covered_pixels() {
        let frame = gradient_frame();
        let crop = frame.crop(&Region::new(1, 1, 2, 2));

        assert_eq!((crop.width(), crop.height()), (2, 2));
        assert_eq!(crop.sequence(), 7);
        let arr = crop.as_ndarray();
        assert_eq!(arr[[0, 0, 0]], 11);
        assert_eq!(arr[[0, 1, 0]], 12);
        assert_eq!(arr[[1, 0, 0]], 21);
        assert_eq!(arr[[1, 1, 0]], 22);
    }

    #[test]
    fn test_crop_clamps_to_frame_bounds() {
        let frame = gradient_frame();
        let crop = frame.crop(&Region::new(-2, 2, 10, 10));

        assert_eq!((crop.width(), crop.height()), (4, 1));
        assert_eq!(crop.as_ndarray()[[0, 3, 0]], 23);
    }

    #[test]
    fn test_crop_outside_frame_is_empty() {
        let frame = gradient_frame();
        let crop = frame.crop(&Region::new(50, 50, 10, 10));
        assert!(crop.is_empty());
        assert!(crop.data().is_empty());
    }
}
