//! Live video capabilities.
//!
//! The detection loop talks to the camera through two traits:
//! - `FrameSource`: readiness and single-frame sampling for inference
//! - `Recorder`: encoded fragment capture for evidence clips
//!
//! One device usually implements both. The loop enforces that only one side
//! is in use at a time: frames are sampled only while no capture is open.
//!
//! Sources MUST NOT:
//! - Retain sampled frames after handing them out
//! - Log frame or fragment content

#[cfg(feature = "ingest-file-ffmpeg")]
mod file_ffmpeg;
mod synthetic;
mod video;

#[cfg(feature = "ingest-file-ffmpeg")]
pub use file_ffmpeg::MATROSKA_MIME_TYPE;
pub use synthetic::{CameraStats, SyntheticCamera, SyntheticConfig};
pub use video::{SourceConfig, VideoSource};

use anyhow::Result;

use crate::frame::Frame;

/// Frame sampling side of a live video source.
pub trait FrameSource: Send {
    /// True once the device delivers frames. Polling may advance warm-up.
    fn is_ready(&mut self) -> bool;

    /// Draw the current frame.
    fn grab_frame(&mut self) -> Result<Frame>;
}

/// Recording side of a live video source.
///
/// Fragments are opaque encoded chunks (e.g. WebM clusters) in stream order.
/// A recorder may hold everything back and return the whole clip from
/// `stop_recording`.
pub trait Recorder: Send {
    fn start_recording(&mut self) -> Result<()>;

    /// Fragments produced since the last drain.
    fn drain_fragments(&mut self) -> Result<Vec<Vec<u8>>>;

    /// Stop and flush the trailing fragments.
    fn stop_recording(&mut self) -> Result<Vec<Vec<u8>>>;

    /// Stop and discard anything buffered.
    fn abort_recording(&mut self);
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn is_ready(&mut self) -> bool {
        (**self).is_ready()
    }

    fn grab_frame(&mut self) -> Result<Frame> {
        (**self).grab_frame()
    }
}

impl<T: Recorder + ?Sized> Recorder for Box<T> {
    fn start_recording(&mut self) -> Result<()> {
        (**self).start_recording()
    }

    fn drain_fragments(&mut self) -> Result<Vec<Vec<u8>>> {
        (**self).drain_fragments()
    }

    fn stop_recording(&mut self) -> Result<Vec<Vec<u8>>> {
        (**self).stop_recording()
    }

    fn abort_recording(&mut self) {
        (**self).abort_recording()
    }
}
