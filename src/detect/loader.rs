use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use crate::config::{BackendKind, ModelSettings};
use crate::detect::backend::InferenceBackend;
use crate::detect::backends::StubBackend;
use crate::detect::output::OutputShape;

/// Build the configured backend. Any error here is fatal for engine start-up.
pub fn load_backend(model: &ModelSettings, input_size: u32) -> Result<Box<dyn InferenceBackend>> {
    match model.backend {
        BackendKind::Stub => {
            log::info!("using stub backend (no model file)");
            let shape = OutputShape::new(model.candidates, model.num_classes, model.layout);
            Ok(Box::new(StubBackend::with_shape(shape)))
        }
        BackendKind::Tract => load_tract(model, input_size),
    }
}

#[cfg(feature = "backend-tract")]
fn load_tract(model: &ModelSettings, input_size: u32) -> Result<Box<dyn InferenceBackend>> {
    let digest = model_digest(&model.path)?;
    log::info!(
        "loading model {} (sha256 {})",
        model.path.display(),
        digest
    );
    let backend = crate::detect::backends::TractBackend::load(&model.path, input_size, model.layout)?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn load_tract(model: &ModelSettings, _input_size: u32) -> Result<Box<dyn InferenceBackend>> {
    anyhow::bail!(
        "model {} requires the backend-tract feature",
        model.path.display()
    )
}

/// Hex SHA-256 of the model file, logged so deployments can tell models apart.
pub fn model_digest(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("failed to open model {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut chunk = vec![0u8; 64 * 1024];
    loop {
        let read = file
            .read(&mut chunk)
            .with_context(|| format!("failed to read model {}", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&chunk[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}
