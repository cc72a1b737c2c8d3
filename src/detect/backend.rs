use anyhow::Result;

use crate::detect::output::RawOutput;
use crate::tensor::InputTensor;

/// Inference backend trait.
///
/// A backend owns one loaded detection model. It receives a normalized
/// `[1, 3, S, S]` tensor and returns the raw per-candidate output, unfiltered.
/// Thresholding, selection and smoothing belong to the detection engine.
///
/// Backends run on the engine's inference worker thread, hence `Send`.
pub trait InferenceBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run the model on one input tensor.
    ///
    /// Implementations must treat the tensor as read-only and must not retain
    /// it beyond the call.
    fn run(&mut self, input: &InputTensor) -> Result<RawOutput>;

    /// Optional warm-up hook, called once while the engine loads the model.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<B: InferenceBackend + ?Sized> InferenceBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn run(&mut self, input: &InputTensor) -> Result<RawOutput> {
        (**self).run(input)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
