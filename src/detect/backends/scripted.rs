use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::detect::backend::InferenceBackend;
use crate::detect::output::{OutputShape, RawOutput};
use crate::tensor::InputTensor;

/// One scripted inference response.
#[derive(Clone, Debug)]
pub enum ScriptStep {
    /// Best target-class score for the frame, placed at slot 0. `None` means
    /// nothing scored.
    Best(Option<f32>),
    /// Explicit `(slot, score)` pairs for the target class.
    Scores(Vec<(usize, f32)>),
    /// Full output buffer.
    Raw(Vec<f32>),
    /// The backend fails this call.
    Fail(String),
}

#[derive(Default)]
struct ScriptState {
    steps: VecDeque<ScriptStep>,
    held: bool,
    calls: usize,
    waiting: usize,
}

type Shared = Arc<(Mutex<ScriptState>, Condvar)>;

/// Backend that replays scripted outputs, for exercising the detection loop
/// without a model.
///
/// Calls past the end of the script yield an all-zero output. The paired
/// [`ScriptHandle`] can hold the backend inside `run` to keep an inference
/// outstanding.
pub struct ScriptedBackend {
    shape: OutputShape,
    shared: Shared,
}

/// Test-side controller for a [`ScriptedBackend`] that has moved to the
/// worker thread.
#[derive(Clone)]
pub struct ScriptHandle {
    shared: Shared,
}

impl ScriptedBackend {
    pub fn new(shape: OutputShape) -> (Self, ScriptHandle) {
        let shared: Shared = Arc::new((Mutex::new(ScriptState::default()), Condvar::new()));
        let handle = ScriptHandle {
            shared: shared.clone(),
        };
        (Self { shape, shared }, handle)
    }

    fn render(&self, step: ScriptStep) -> Result<RawOutput> {
        let mut output = RawOutput::empty(self.shape);
        match step {
            ScriptStep::Best(None) => {}
            ScriptStep::Best(Some(score)) => {
                output.set_candidate(0, [320.0, 320.0, 120.0, 80.0], 0, score)?;
            }
            ScriptStep::Scores(scores) => {
                for (slot, score) in scores {
                    output.set_candidate(slot, [320.0, 320.0, 120.0, 80.0], 0, score)?;
                }
            }
            ScriptStep::Raw(data) => return RawOutput::new(data, self.shape),
            ScriptStep::Fail(message) => return Err(anyhow!(message)),
        }
        Ok(output)
    }
}

impl InferenceBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn run(&mut self, _input: &InputTensor) -> Result<RawOutput> {
        let step = {
            let (lock, cvar) = &*self.shared;
            let mut state = lock
                .lock()
                .map_err(|_| anyhow!("script state lock poisoned"))?;
            state.waiting += 1;
            cvar.notify_all();
            while state.held {
                state = cvar
                    .wait(state)
                    .map_err(|_| anyhow!("script state lock poisoned"))?;
            }
            state.waiting -= 1;
            state.calls += 1;
            state.steps.pop_front()
        };
        match step {
            Some(step) => self.render(step),
            None => Ok(RawOutput::empty(self.shape)),
        }
    }
}

impl ScriptHandle {
    pub fn push(&self, step: ScriptStep) {
        self.with_state(|state| state.steps.push_back(step));
    }

    /// Queue one `Best` step per entry.
    pub fn push_best<I>(&self, scores: I)
    where
        I: IntoIterator<Item = Option<f32>>,
    {
        self.with_state(|state| {
            state
                .steps
                .extend(scores.into_iter().map(ScriptStep::Best))
        });
    }

    /// Block future `run` calls until [`ScriptHandle::release`].
    pub fn hold(&self) {
        self.with_state(|state| state.held = true);
    }

    pub fn release(&self) {
        self.with_state(|state| state.held = false);
    }

    /// Completed `run` calls.
    pub fn calls(&self) -> usize {
        self.with_state(|state| state.calls)
    }

    /// Wait until a `run` call is parked on the hold. Returns false on timeout.
    pub fn wait_until_parked(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.shared;
        let Ok(state) = lock.lock() else {
            return false;
        };
        match cvar.wait_timeout_while(state, timeout, |state| state.waiting == 0) {
            Ok((state, _)) => state.waiting > 0,
            Err(_) => false,
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ScriptState) -> T) -> T {
        let (lock, cvar) = &*self.shared;
        let mut state = match lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let out = f(&mut state);
        cvar.notify_all();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::output::OutputLayout;
    use crate::frame::Frame;

    #[test]
    fn replays_steps_in_order_then_goes_quiet() -> Result<()> {
        let (mut backend, handle) =
            ScriptedBackend::new(OutputShape::new(16, 1, OutputLayout::AttributeMajor));
        handle.push_best([Some(0.9), None]);
        handle.push(ScriptStep::Fail("boom".into()));
        let tensor = InputTensor::from_frame(&Frame::black(4, 4)?)?;

        assert_eq!(backend.run(&tensor)?.select_best(0, 0.5)?.confidence(), Some(0.9));
        assert!(!backend.run(&tensor)?.select_best(0, 0.5)?.qualified());
        assert!(backend.run(&tensor).is_err());
        assert!(!backend.run(&tensor)?.select_best(0, 0.01)?.qualified());
        assert_eq!(handle.calls(), 4);
        Ok(())
    }
}
