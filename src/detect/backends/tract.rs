#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::InferenceBackend;
use crate::detect::output::{OutputLayout, OutputShape, RawOutput};
use crate::tensor::InputTensor;

/// Tract-based backend for ONNX detection models.
///
/// Loads a local model file with a fixed `[1, 3, S, S]` f32 input and returns
/// the first output tensor flattened. No network I/O.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
    layout: OutputLayout,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn load<P: AsRef<Path>>(model_path: P, input_size: u32, layout: OutputLayout) -> Result<Self> {
        let model_path = model_path.as_ref();
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            layout,
        })
    }

    fn build_input(&self, input: &InputTensor) -> Result<Tensor> {
        if input.size() != self.input_size {
            return Err(anyhow!(
                "tensor size {} does not match model input {}",
                input.size(),
                self.input_size
            ));
        }
        Tensor::from_shape(&input.shape(), input.as_slice()).context("failed to build input tensor")
    }

    fn extract_output(&self, outputs: TVec<TValue>) -> Result<RawOutput> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let shape = OutputShape::from_dims(output.shape(), self.layout)?;
        let values = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        RawOutput::new(values.iter().copied().collect(), shape)
    }
}

impl InferenceBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn run(&mut self, input: &InputTensor) -> Result<RawOutput> {
        let tensor = self.build_input(input)?;
        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .context("ONNX inference failed")?;
        self.extract_output(outputs)
    }

    fn warm_up(&mut self) -> Result<()> {
        let side = self.input_size as usize;
        let zeros = Tensor::zero::<f32>(&[1, 3, side, side]).context("allocate warm-up tensor")?;
        self.model
            .run(tvec!(zeros.into()))
            .context("ONNX warm-up inference failed")?;
        Ok(())
    }
}
