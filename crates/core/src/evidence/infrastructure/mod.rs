pub mod jpeg_snapshot_encoder;
