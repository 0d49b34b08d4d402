//! ONNX Runtime 检测器 (YOLOv8 风格输出)
//! ONNX Runtime backed `ObjectDetector`, enabled with the `onnx` feature

use anyhow::{Context, Result};
use ndarray::{Array4, ArrayD};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;

use super::neural::ObjectDetector;
use crate::error::EngineError;

/// ONNX 检测器
pub struct OnnxDetector {
    session: Session,
    input_name: String,
    output_name: String,
    input_size: (u32, u32),
}

impl OnnxDetector {
    /// 加载模型; the input size is read from the model when it is static
    pub fn load(model_path: &str, fallback_size: u32) -> Result<Self, EngineError> {
        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.commit_from_file(model_path))
            .map_err(|e| EngineError::DetectorLoad(format!("{model_path}: {e}")))?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| EngineError::DetectorLoad(format!("{model_path}: model has no inputs")))?;
        let output = session
            .outputs
            .first()
            .ok_or_else(|| EngineError::DetectorLoad(format!("{model_path}: model has no outputs")))?;

        let dims = input.input_type.tensor_shape().map(|s| s.to_vec()).unwrap_or_default();
        let size = |i: usize| match dims.get(i) {
            Some(&d) if d > 0 => d as u32,
            _ => fallback_size,
        };
        let input_size = (size(3), size(2));

        tracing::info!(
            model = model_path,
            input = %input.name,
            output = %output.name,
            width = input_size.0,
            height = input_size.1,
            "detector loaded"
        );

        Ok(Self {
            input_name: input.name.clone(),
            output_name: output.name.clone(),
            session,
            input_size,
        })
    }
}

impl ObjectDetector for OnnxDetector {
    fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    fn infer(&mut self, input: Array4<f32>) -> Result<ArrayD<f32>> {
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .context("detector inference failed")?;
        let output: ndarray::ArrayViewD<f32> = outputs[self.output_name.as_str()]
            .try_extract_array()
            .context("failed to extract detector output")?;
        Ok(output.to_owned())
    }
}
