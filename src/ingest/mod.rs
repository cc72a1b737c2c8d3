//! Frame sources.
//!
//! A source is pulled once per tick for a snapshot of whatever it is
//! currently showing. It does not queue frames; a slow consumer simply sees
//! later ones. Supported sources:
//! - `stub://<name>`: synthetic scene with periodic bright "fall" phases
//! - a local image file or a directory of JPEG/PNG stills
//!
//! Camera lifecycle (permissions, device open) belongs to whoever builds the
//! source. The engine only calls `current_frame` and `release`.

pub mod file;
pub mod synthetic;

use anyhow::{anyhow, Result};

use crate::config::SourceSettings;
use crate::frame::Frame;

pub use file::FileSource;
pub use synthetic::SyntheticSource;

/// Pull-based snapshot source.
pub trait FrameSource {
    fn name(&self) -> &str;

    /// Snapshot of the current frame. `Ok(None)` means the source is not
    /// ready yet and the caller should try again next tick.
    fn current_frame(&mut self) -> Result<Option<Frame>>;

    /// Release the underlying device. Further calls may return `None`.
    fn release(&mut self) {}

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub not_ready: u64,
    pub name: String,
}

/// Build the source described by the settings.
pub fn open_source(settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    let url = settings.url.trim();
    if url.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(settings)));
    }
    if !is_local_file_path(url) {
        return Err(anyhow!(
            "unsupported source '{}': only stub:// and local image paths are available",
            url
        ));
    }
    Ok(Box::new(FileSource::open(settings)?))
}

pub(crate) fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}
