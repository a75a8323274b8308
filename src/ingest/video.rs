//! Video source selection.
//!
//! `stub://` URLs open the synthetic camera. Anything else is a local video
//! file, given as a plain path or a `file://` URL, played back as a live
//! camera; that backend needs the `ingest-file-ffmpeg` feature. Network
//! schemes are rejected.

use anyhow::{anyhow, Result};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::{FfmpegFileCamera, MATROSKA_MIME_TYPE};
use super::synthetic::{SyntheticCamera, SyntheticConfig};
use super::{FrameSource, Recorder};
use crate::frame::Frame;

/// Where frames come from and the size they are delivered at.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// `stub://name`, a local path, or a `file://` URL.
    pub url: String,
    pub width: u32,
    pub height: u32,
    /// Synthetic camera only: polls answered "not ready" first.
    pub warmup_polls: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        let synthetic = SyntheticConfig::default();
        Self {
            url: synthetic.url,
            width: synthetic.width,
            height: synthetic.height,
            warmup_polls: synthetic.warmup_polls,
        }
    }
}

/// The video device the daemon drives, whichever backend opened it.
pub struct VideoSource {
    backend: VideoBackend,
}

enum VideoBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "ingest-file-ffmpeg")]
    File(FfmpegFileCamera),
}

impl VideoSource {
    pub fn open(config: SourceConfig) -> Result<Self> {
        if config.url.starts_with("stub://") {
            let camera = SyntheticCamera::new(SyntheticConfig {
                url: config.url,
                width: config.width,
                height: config.height,
                warmup_polls: config.warmup_polls,
                ..SyntheticConfig::default()
            })?;
            return Ok(Self {
                backend: VideoBackend::Synthetic(camera),
            });
        }

        let path = local_path(&config.url)?;
        #[cfg(feature = "ingest-file-ffmpeg")]
        {
            Ok(Self {
                backend: VideoBackend::File(FfmpegFileCamera::open(
                    path,
                    config.width,
                    config.height,
                )?),
            })
        }
        #[cfg(not(feature = "ingest-file-ffmpeg"))]
        {
            Err(anyhow!(
                "video file '{}' requires the ingest-file-ffmpeg feature",
                path
            ))
        }
    }

    pub fn kind(&self) -> &'static str {
        match &self.backend {
            VideoBackend::Synthetic(_) => "synthetic",
            #[cfg(feature = "ingest-file-ffmpeg")]
            VideoBackend::File(_) => "file",
        }
    }

    /// Container the recorder produces, when it is fixed by the backend.
    pub fn mime_type(&self) -> Option<&'static str> {
        match &self.backend {
            VideoBackend::Synthetic(_) => None,
            #[cfg(feature = "ingest-file-ffmpeg")]
            VideoBackend::File(_) => Some(MATROSKA_MIME_TYPE),
        }
    }
}

impl FrameSource for VideoSource {
    fn is_ready(&mut self) -> bool {
        match &mut self.backend {
            VideoBackend::Synthetic(camera) => camera.is_ready(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            VideoBackend::File(camera) => camera.is_ready(),
        }
    }

    fn grab_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            VideoBackend::Synthetic(camera) => camera.grab_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            VideoBackend::File(camera) => camera.grab_frame(),
        }
    }
}

impl Recorder for VideoSource {
    fn start_recording(&mut self) -> Result<()> {
        match &mut self.backend {
            VideoBackend::Synthetic(camera) => camera.start_recording(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            VideoBackend::File(camera) => camera.start_recording(),
        }
    }

    fn drain_fragments(&mut self) -> Result<Vec<Vec<u8>>> {
        match &mut self.backend {
            VideoBackend::Synthetic(camera) => camera.drain_fragments(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            VideoBackend::File(camera) => camera.drain_fragments(),
        }
    }

    fn stop_recording(&mut self) -> Result<Vec<Vec<u8>>> {
        match &mut self.backend {
            VideoBackend::Synthetic(camera) => camera.stop_recording(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            VideoBackend::File(camera) => camera.stop_recording(),
        }
    }

    fn abort_recording(&mut self) {
        match &mut self.backend {
            VideoBackend::Synthetic(camera) => camera.abort_recording(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            VideoBackend::File(camera) => camera.abort_recording(),
        }
    }
}

/// Local filesystem path named by a source URL.
fn local_path(url: &str) -> Result<&str> {
    let path = match url.strip_prefix("file://") {
        Some(path) => path,
        None if url.contains("://") => {
            return Err(anyhow!(
                "unsupported video source '{}': use stub:// or a local file",
                url
            ))
        }
        None => url,
    };
    if path.trim().is_empty() {
        return Err(anyhow!("video source path is empty"));
    }
    Ok(path)
}
