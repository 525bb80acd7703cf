pub mod execution_provider;
pub mod math;
pub mod model_resolver;
pub mod onnx_face_detector;
pub mod onnx_face_embedder;
pub mod onnx_inference_provider;
