//! Camera frames.
//!
//! A `Frame` is an RGB8 snapshot produced once per sampling tick. Frames are
//! ephemeral: the detection loop converts one into an `InputTensor` and drops it.
//! Pixel storage is private and zeroized on drop.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ExtendedColorType, RgbImage};
use zeroize::Zeroize;

/// Bytes per RGB8 pixel.
pub const CHANNELS: usize = 3;

/// RGB8 frame with interleaved channels. No `Clone`; pass by reference.
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    /// Wrap interleaved RGB8 pixels. Fails when the buffer length does not
    /// match the dimensions.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// All-zero frame.
    pub fn black(width: u32, height: u32) -> Result<Self> {
        let len = rgb_len(width, height)?;
        Self::from_rgb(vec![0u8; len], width, height)
    }

    /// Decode an encoded image (JPEG/PNG) into an RGB8 frame.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes).context("decode image")?;
        let rgb = image.into_rgb8();
        let (width, height) = rgb.dimensions();
        Self::from_rgb(rgb.into_raw(), width, height)
    }

    pub fn rgb(&self) -> &[u8] {
        &self.data
    }

    pub fn is_square_of(&self, size: u32) -> bool {
        self.width == size && self.height == size
    }

    /// Scale to `size × size`. Frames already at that size pass through untouched.
    ///
    /// The whole source image is stretched onto the square, the same way a
    /// video element is drawn onto a fixed-size canvas.
    pub fn fit_square(mut self, size: u32) -> Result<Self> {
        if size == 0 {
            return Err(anyhow!("target frame size must be > 0"));
        }
        if self.is_square_of(size) {
            return Ok(self);
        }
        if self.width == 0 || self.height == 0 {
            return Err(anyhow!("cannot scale an empty frame"));
        }
        let (width, height) = (self.width, self.height);
        let pixels = std::mem::take(&mut self.data);
        let source = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", width, height))?;
        let resized = image::imageops::resize(&source, size, size, FilterType::Triangle);
        let mut source_pixels = source.into_raw();
        source_pixels.zeroize();
        Self::from_rgb(resized.into_raw(), size, size)
    }

    /// Encode as baseline JPEG. `quality` is clamped to 1..=100.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        {
            let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
            encoder
                .encode(&self.data, self.width, self.height, ExtendedColorType::Rgb8)
                .context("encode jpeg")?;
        }
        Ok(out)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print pixels.
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

fn rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(CHANNELS))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}
