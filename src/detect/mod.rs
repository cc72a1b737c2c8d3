mod backend;
pub mod backends;
mod loader;
mod output;
mod result;

pub use backend::InferenceBackend;
pub use backends::{ScriptHandle, ScriptStep, ScriptedBackend, StubBackend};
pub use loader::{load_backend, model_digest};
pub use output::{OutputLayout, OutputShape, RawOutput, BOX_ATTRS, DEFAULT_CANDIDATES};
pub use result::{Candidate, Selection};
