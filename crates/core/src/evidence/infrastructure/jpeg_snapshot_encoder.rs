use crate::evidence::domain::snapshot_encoder::{Evidence, SnapshotEncoder};
use crate::shared::constants::DEFAULT_EVIDENCE_QUALITY;
use crate::shared::frame::Frame;

pub const JPEG_MIME_TYPE: &str = "image/jpeg";

/// Encodes RGB frames as baseline JPEG using the `image` crate.
pub struct JpegSnapshotEncoder {
    quality: u8,
}

impl JpegSnapshotEncoder {
    /// `quality` is clamped to the encoder's 1-100 range.
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Default for JpegSnapshotEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_EVIDENCE_QUALITY)
    }
}

impl SnapshotEncoder for JpegSnapshotEncoder {
    fn encode(&self, frame: &Frame) -> Result<Evidence, Box<dyn std::error::Error>> {
        if frame.is_empty() {
            return Err("cannot encode an empty frame".into());
        }
        let color = match frame.channels() {
            3 => image::ExtendedColorType::Rgb8,
            1 => image::ExtendedColorType::L8,
            n => return Err(format!("unsupported channel count for JPEG: {n}").into()),
        };

        let mut bytes = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, self.quality).encode(
            frame.data(),
            frame.width(),
            frame.height(),
            color,
        )?;

        Ok(Evidence {
            mime_type: JPEG_MIME_TYPE,
            width: frame.width(),
            height: frame.height(),
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    fn solid_frame(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take((width * height * 3) as usize)
            .collect();
        Frame::new(data, width, height, 3, 0)
    }

    #[test]
    fn test_encode_produces_decodable_jpeg() {
        let encoder = JpegSnapshotEncoder::default();
        let evidence = encoder.encode(&solid_frame(64, 48, [40, 120, 200])).unwrap();

        assert_eq!(evidence.mime_type, "image/jpeg");
        assert_eq!((evidence.width, evidence.height), (64, 48));
        assert_eq!(&evidence.bytes[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&evidence.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (64, 48));
        let px = decoded.to_rgb8().get_pixel(32, 24).0;
        for (got, want) in px.iter().zip([40u8, 120, 200]) {
            assert!((*got as i32 - want as i32).abs() <= 8, "{px:?}");
        }
    }

    #[test]
    fn test_lower_quality_is_smaller() {
        // Noise compresses poorly, so quality differences show up in size.
        let mut seed = 12345u32;
        let data = (0..128 * 128 * 3)
            .map(|_| {
                seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
                (seed >> 16) as u8
            })
            .collect();
        let frame = Frame::new(data, 128, 128, 3, 0);

        let low = JpegSnapshotEncoder::new(20).encode(&frame).unwrap();
        let high = JpegSnapshotEncoder::new(95).encode(&frame).unwrap();
        assert!(low.bytes.len() < high.bytes.len());
    }

    #[test]
    fn test_quality_is_clamped() {
        assert_eq!(JpegSnapshotEncoder::new(0).quality(), 1);
        assert_eq!(JpegSnapshotEncoder::new(250).quality(), 100);
    }

    #[test]
    fn test_empty_frame_is_rejected() {
        let frame = Frame::new(Vec::new(), 0, 0, 3, 0);
        assert!(JpegSnapshotEncoder::default().encode(&frame).is_err());
    }

    #[test]
    fn test_empty_evidence_serializes_without_bytes() {
        let json = serde_json::to_value(Evidence::empty()).unwrap();
        assert!(json.get("bytes").is_none());
        assert_eq!(json["width"], 0);
        assert!(Evidence::empty().is_empty());
    }
}
