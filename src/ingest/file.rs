//! Local still-image source.
//!
//! Reads one JPEG/PNG file or every JPEG/PNG in a directory (sorted by file
//! name) and presents them as a slow video at the configured fps. Local paths
//! only; URL schemes are rejected before this module is reached.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use zeroize::Zeroizing;

use super::{FrameSource, SourceStats};
use crate::config::SourceSettings;
use crate::frame::Frame;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

struct Decoded {
    index: usize,
    pixels: Zeroizing<Vec<u8>>,
    width: u32,
    height: u32,
}

pub struct FileSource {
    name: String,
    paths: Vec<PathBuf>,
    fps: u32,
    warmup_frames: u64,
    loop_playback: bool,
    started: Instant,
    cached: Option<Decoded>,
    exhausted: bool,
    released: bool,
    stats: SourceStats,
}

impl FileSource {
    pub fn open(settings: &SourceSettings) -> Result<Self> {
        let root = Path::new(settings.url.trim());
        let paths = collect_images(root)?;
        if paths.is_empty() {
            return Err(anyhow!("no JPEG or PNG images under {}", root.display()));
        }
        log::info!(
            "file source {} ({} images @ {} fps, loop {})",
            root.display(),
            paths.len(),
            settings.fps,
            settings.loop_playback
        );
        let name = root.display().to_string();
        Ok(Self {
            name: name.clone(),
            paths,
            fps: settings.fps.max(1),
            warmup_frames: u64::from(settings.warmup_frames),
            loop_playback: settings.loop_playback,
            started: Instant::now(),
            cached: None,
            exhausted: false,
            released: false,
            stats: SourceStats {
                name,
                ..SourceStats::default()
            },
        })
    }

    /// Decode image `index` directly, bypassing the clock.
    pub fn frame_at(&mut self, index: usize) -> Result<Frame> {
        let fresh = match &self.cached {
            Some(cached) => cached.index != index,
            None => true,
        };
        if fresh {
            let path = self
                .paths
                .get(index)
                .ok_or_else(|| anyhow!("image index {} out of range", index))?;
            let bytes = Zeroizing::new(
                fs::read(path).with_context(|| format!("read {}", path.display()))?,
            );
            let frame = Frame::decode(&bytes).with_context(|| format!("decode {}", path.display()))?;
            self.cached = Some(Decoded {
                index,
                pixels: Zeroizing::new(frame.rgb().to_vec()),
                width: frame.width,
                height: frame.height,
            });
        }
        match &self.cached {
            Some(cached) => Frame::from_rgb(cached.pixels.to_vec(), cached.width, cached.height),
            None => Err(anyhow!("image cache empty")),
        }
    }

    fn clock_index(&self) -> u64 {
        (self.started.elapsed().as_secs_f64() * f64::from(self.fps)) as u64
    }
}

impl FrameSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn current_frame(&mut self) -> Result<Option<Frame>> {
        if self.released || self.exhausted {
            return Ok(None);
        }
        let tick = self.clock_index();
        if tick < self.warmup_frames {
            self.stats.not_ready += 1;
            return Ok(None);
        }
        let position = usize::try_from(tick - self.warmup_frames)?;
        let index = if self.loop_playback {
            position % self.paths.len()
        } else if position < self.paths.len() {
            position
        } else {
            log::info!("file source {} reached the last image", self.name);
            self.exhausted = true;
            return Ok(None);
        };
        let frame = self.frame_at(index)?;
        self.stats.frames_captured += 1;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        self.released = true;
        self.cached = None;
    }

    fn is_healthy(&self) -> bool {
        !self.released && !self.exhausted
    }

    fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}

fn collect_images(root: &Path) -> Result<Vec<PathBuf>> {
    let meta = fs::metadata(root).with_context(|| format!("stat {}", root.display()))?;
    if meta.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    let mut paths = Vec::new();
    for entry in fs::read_dir(root).with_context(|| format!("list {}", root.display()))? {
        let path = entry?.path();
        if path.is_file() && has_image_extension(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}
