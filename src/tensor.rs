use anyhow::{anyhow, Result};

use crate::frame::{Frame, CHANNELS};

/// Normalized, channel-planar model input: all red values, then all green,
/// then all blue, each `byte / 255`. Shape `[1, 3, size, size]`.
pub struct InputTensor {
    data: Vec<f32>,
    size: u32,
}

impl InputTensor {
    /// Build the tensor from a square frame. Callers scale with
    /// [`Frame::fit_square`] first.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        if frame.width != frame.height {
            return Err(anyhow!(
                "tensor input must be square, got {}x{}",
                frame.width,
                frame.height
            ));
        }
        let size = frame.width;
        let plane = (size as usize)
            .checked_mul(size as usize)
            .ok_or_else(|| anyhow!("tensor dimensions overflow"))?;
        let mut data = vec![0f32; plane * CHANNELS];
        let (red, rest) = data.split_at_mut(plane);
        let (green, blue) = rest.split_at_mut(plane);
        for (i, px) in frame.rgb().chunks_exact(CHANNELS).enumerate() {
            red[i] = px[0] as f32 / 255.0;
            green[i] = px[1] as f32 / 255.0;
            blue[i] = px[2] as f32 / 255.0;
        }
        Ok(Self { data, size })
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn shape(&self) -> [usize; 4] {
        let s = self.size as usize;
        [1, CHANNELS, s, s]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for InputTensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputTensor")
            .field("shape", &self.shape())
            .finish_non_exhaustive()
    }
}
