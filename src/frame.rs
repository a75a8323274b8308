//! Ephemeral detection frames.
//!
//! A `Frame` is drawn from the live video source for exactly one inference
//! and dropped as soon as the classifier returns. The loop never retains it.
//!
//! - Pixel bytes are private: no `Clone`, no `AsRef<[u8]>`, no serialization.
//! - Classifiers read pixels through `Frame::pixels` for the duration of a
//!   `classify` call only.
//! - Bytes are zeroized on drop.

use anyhow::{anyhow, Result};
use std::fmt;
use zeroize::Zeroize;

/// Bytes per pixel for the packed RGB layout every source produces.
pub const RGB_CHANNELS: usize = 3;

/// One sampled RGB frame. Width-major, packed, 8 bits per channel.
pub struct Frame {
    /// Private pixel data. MUST NOT be exposed beyond `pixels()`.
    data: Vec<u8>,

    pub width: u32,
    pub height: u32,

    /// Monotonic sample number assigned by the source.
    pub sequence: u64,
}

// Explicitly NOT implementing Clone or any byte-exposing trait.

impl Frame {
    /// Wrap packed RGB pixels. Fails when the buffer length does not match
    /// `width * height * 3`.
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        let expected = expected_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "frame {}x{} expects {} RGB bytes, received {}",
                width,
                height,
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            sequence,
        })
    }

    /// Borrow the pixel data for inference.
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

pub(crate) fn expected_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(RGB_CHANNELS))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}
