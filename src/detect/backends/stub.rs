use anyhow::Result;

use crate::detect::backend::InferenceBackend;
use crate::detect::output::{OutputLayout, OutputShape, RawOutput, DEFAULT_CANDIDATES};
use crate::tensor::InputTensor;

/// Stub backend for demos and tests. No model file is involved.
///
/// Reports a single full-frame candidate in slot 0 whose target-class score is
/// the mean intensity of the input, so a dark scene scores near zero and a
/// bright one near one. Every other slot stays zero.
pub struct StubBackend {
    shape: OutputShape,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::with_shape(OutputShape::new(
            DEFAULT_CANDIDATES,
            1,
            OutputLayout::AttributeMajor,
        ))
    }

    pub fn with_shape(shape: OutputShape) -> Self {
        Self { shape }
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn run(&mut self, input: &InputTensor) -> Result<RawOutput> {
        let mut output = RawOutput::empty(self.shape);
        if self.shape.candidates == 0 || input.is_empty() {
            return Ok(output);
        }
        let values = input.as_slice();
        let mean = values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64;
        let side = input.size() as f32;
        output.set_candidate(
            0,
            [side / 2.0, side / 2.0, side, side],
            0,
            mean.clamp(0.0, 1.0) as f32,
        )?;
        Ok(output)
    }
}
