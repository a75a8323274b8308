use anyhow::{anyhow, Result};
use rand::RngCore;

use super::{FrameSource, Recorder};
use crate::frame::{expected_len, Frame};

/// EBML magic that opens every WebM stream.
const WEBM_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

/// Configuration for the synthetic camera.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Source URL, must use the `stub://` scheme (e.g. "stub://webcam").
    pub url: String,
    pub width: u32,
    pub height: u32,
    /// Readiness polls answered "not ready" before the device comes up.
    pub warmup_polls: u32,
    /// Size of each recorded fragment.
    pub fragment_bytes: usize,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            url: "stub://webcam".to_string(),
            width: 640,
            height: 480,
            warmup_polls: 0,
            fragment_bytes: 4096,
        }
    }
}

/// Deterministic in-process camera for demos and tests.
///
/// Frames are a moving gradient; recorded fragments are random bytes behind
/// a WebM header, one fragment per drain.
pub struct SyntheticCamera {
    config: SyntheticConfig,
    polls: u32,
    frame_count: u64,
    recording: bool,
    recorded_fragments: u64,
    stats: CameraStats,
}

/// Counters for a synthetic camera.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CameraStats {
    pub frames_sampled: u64,
    pub recordings_started: u64,
    pub fragments_emitted: u64,
    pub recordings_aborted: u64,
}

impl SyntheticCamera {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        if !config.url.starts_with("stub://") {
            return Err(anyhow!(
                "unsupported video source '{}': only stub:// sources are built in",
                config.url
            ));
        }
        if config.fragment_bytes < WEBM_MAGIC.len() {
            return Err(anyhow!(
                "fragment_bytes must be at least {}",
                WEBM_MAGIC.len()
            ));
        }
        expected_len(config.width, config.height)?;
        log::info!(
            "SyntheticCamera: opened {} ({}x{})",
            config.url,
            config.width,
            config.height
        );
        Ok(Self {
            config,
            polls: 0,
            frame_count: 0,
            recording: false,
            recorded_fragments: 0,
            stats: CameraStats::default(),
        })
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn stats(&self) -> CameraStats {
        self.stats.clone()
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let len = (self.config.width as usize) * (self.config.height as usize) * 3;
        let mut pixels = vec![0u8; len];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count) % 256) as u8;
        }
        pixels
    }

    fn next_fragment(&mut self) -> Vec<u8> {
        let mut fragment = vec![0u8; self.config.fragment_bytes];
        rand::thread_rng().fill_bytes(&mut fragment);
        if self.recorded_fragments == 0 {
            fragment[..WEBM_MAGIC.len()].copy_from_slice(&WEBM_MAGIC);
        }
        self.recorded_fragments += 1;
        self.stats.fragments_emitted += 1;
        fragment
    }
}

impl FrameSource for SyntheticCamera {
    fn is_ready(&mut self) -> bool {
        if self.polls < self.config.warmup_polls {
            self.polls += 1;
            return false;
        }
        true
    }

    fn grab_frame(&mut self) -> Result<Frame> {
        if self.polls < self.config.warmup_polls {
            return Err(anyhow!("camera {} still warming up", self.config.url));
        }
        self.frame_count += 1;
        self.stats.frames_sampled += 1;
        Frame::new(
            self.generate_pixels(),
            self.config.width,
            self.config.height,
            self.frame_count,
        )
    }
}

impl Recorder for SyntheticCamera {
    fn start_recording(&mut self) -> Result<()> {
        if self.recording {
            return Err(anyhow!("recording already in progress"));
        }
        self.recording = true;
        self.recorded_fragments = 0;
        self.stats.recordings_started += 1;
        Ok(())
    }

    fn drain_fragments(&mut self) -> Result<Vec<Vec<u8>>> {
        if !self.recording {
            return Ok(Vec::new());
        }
        Ok(vec![self.next_fragment()])
    }

    fn stop_recording(&mut self) -> Result<Vec<Vec<u8>>> {
        if !self.recording {
            return Err(anyhow!("no recording in progress"));
        }
        let trailing = self.next_fragment();
        self.recording = false;
        Ok(vec![trailing])
    }

    fn abort_recording(&mut self) {
        if self.recording {
            self.recording = false;
            self.stats.recordings_aborted += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> SyntheticConfig {
        SyntheticConfig {
            width: 8,
            height: 6,
            fragment_bytes: 64,
            ..SyntheticConfig::default()
        }
    }

    #[test]
    fn rejects_non_stub_urls() {
        let cfg = SyntheticConfig {
            url: "rtsp://camera-1".to_string(),
            ..small()
        };
        assert!(SyntheticCamera::new(cfg).is_err());
    }

    #[test]
    fn warms_up_before_ready() {
        let mut camera = SyntheticCamera::new(SyntheticConfig {
            warmup_polls: 2,
            ..small()
        })
        .unwrap();
        assert!(!camera.is_ready());
        assert!(camera.grab_frame().is_err());
        assert!(!camera.is_ready());
        assert!(camera.is_ready());

        let frame = camera.grab_frame().unwrap();
        assert_eq!(frame.byte_len(), 8 * 6 * 3);
        assert_eq!(frame.sequence, 1);
    }

    #[test]
    fn recording_emits_webm_stream() {
        let mut camera = SyntheticCamera::new(small()).unwrap();
        assert!(camera.drain_fragments().unwrap().is_empty());

        camera.start_recording().unwrap();
        assert!(camera.start_recording().is_err());
        let first = camera.drain_fragments().unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(&first[0][..4], &WEBM_MAGIC);
        assert_eq!(first[0].len(), 64);

        let trailing = camera.stop_recording().unwrap();
        assert_eq!(trailing.len(), 1);
        assert!(!camera.is_recording());
        assert!(camera.stop_recording().is_err());
        assert_eq!(camera.stats().fragments_emitted, 2);
    }

    #[test]
    fn abort_discards_recording() {
        let mut camera = SyntheticCamera::new(small()).unwrap();
        camera.start_recording().unwrap();
        camera.abort_recording();
        assert!(!camera.is_recording());
        assert_eq!(camera.stats().recordings_aborted, 1);
        camera.start_recording().unwrap();
    }
}
