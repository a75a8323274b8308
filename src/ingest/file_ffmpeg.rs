//! Local video file played back as a live camera, using FFmpeg.
//!
//! Playback starts on the first readiness poll and follows the wall clock:
//! a sample taken 3 s later sees the frame 3 s further into the file.
//! Recording remuxes the compressed packets, without re-encoding, into a
//! Matroska clip in the temp directory. The finished clip is read back as
//! one trailing fragment and deleted.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use rand::Rng;

use super::{FrameSource, Recorder};
use crate::frame::Frame;

pub const MATROSKA_MIME_TYPE: &str = "video/x-matroska";

pub(crate) struct FfmpegFileCamera {
    path: String,
    width: u32,
    height: u32,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    time_base: ffmpeg::Rational,
    decoder: ffmpeg::codec::decoder::Video,
    started_at: Option<Instant>,
    first_ts_ms: Option<i64>,
    pending: Option<ffmpeg::Packet>,
    frame_count: u64,
    need_keyframe: bool,
    ended: bool,
    clip: Option<ClipWriter>,
}

impl FfmpegFileCamera {
    /// Open `path`; decoded frames are scaled to `width` x `height` RGB.
    pub(crate) fn open(path: &str, width: u32, height: u32) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open video file '{}' with ffmpeg", path))?;
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("video file '{}' has no video track", path))?;
        let stream_index = stream.index();
        let time_base = stream.time_base();
        let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        log::info!(
            "FfmpegFileCamera: opened {} ({}x{} -> {}x{})",
            path,
            decoder.width(),
            decoder.height(),
            width,
            height
        );
        Ok(Self {
            path: path.to_string(),
            width,
            height,
            input,
            stream_index,
            time_base,
            decoder,
            started_at: None,
            first_ts_ms: None,
            pending: None,
            frame_count: 0,
            need_keyframe: false,
            ended: false,
            clip: None,
        })
    }

    fn playhead_ms(&self) -> i64 {
        self.started_at
            .map(|started| i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }

    /// Packet time relative to the first packet of the file.
    fn packet_ms(&mut self, packet: &ffmpeg::Packet) -> i64 {
        let ts = packet.dts().or(packet.pts()).unwrap_or(0);
        let ms = (ts as f64 * f64::from(self.time_base) * 1000.0) as i64;
        let first = *self.first_ts_ms.get_or_insert(ms);
        ms - first
    }

    fn read_packet(&mut self) -> Result<Option<ffmpeg::Packet>> {
        if let Some(packet) = self.pending.take() {
            return Ok(Some(packet));
        }
        if self.ended {
            return Ok(None);
        }
        loop {
            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) if packet.stream() == self.stream_index => return Ok(Some(packet)),
                Ok(()) => continue,
                Err(ffmpeg::Error::Eof) => {
                    self.ended = true;
                    log::info!("FfmpegFileCamera: reached the end of {}", self.path);
                    return Ok(None);
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("failed to read {}", self.path))
                }
            }
        }
    }

    /// Next packet at or before the playhead; later packets are held back.
    fn next_due_packet(&mut self, playhead_ms: i64) -> Result<Option<ffmpeg::Packet>> {
        let Some(packet) = self.read_packet()? else {
            return Ok(None);
        };
        if self.packet_ms(&packet) > playhead_ms {
            self.pending = Some(packet);
            return Ok(None);
        }
        Ok(Some(packet))
    }

    fn decode(&mut self, packet: &ffmpeg::Packet) -> Result<Option<ffmpeg::frame::Video>> {
        if self.need_keyframe {
            if !packet.is_key() {
                return Ok(None);
            }
            self.need_keyframe = false;
        }
        self.decoder
            .send_packet(packet)
            .context("send packet to ffmpeg decoder")?;
        let mut latest = None;
        loop {
            let mut decoded = ffmpeg::frame::Video::empty();
            if self.decoder.receive_frame(&mut decoded).is_err() {
                break;
            }
            latest = Some(decoded);
        }
        Ok(latest)
    }

    fn to_frame(&self, decoded: &ffmpeg::frame::Video) -> Result<Frame> {
        let mut scaler = ffmpeg::software::scaling::Context::get(
            decoded.format(),
            decoded.width(),
            decoded.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            self.width,
            self.height,
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;
        let mut rgb = ffmpeg::frame::Video::empty();
        scaler.run(decoded, &mut rgb).context("scale frame to RGB")?;
        Frame::new(
            rgb_pixels(&rgb)?,
            self.width,
            self.height,
            self.frame_count,
        )
    }
}

impl FrameSource for FfmpegFileCamera {
    fn is_ready(&mut self) -> bool {
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
            log::info!("FfmpegFileCamera: playback of {} started", self.path);
        }
        !self.ended || self.pending.is_some()
    }

    fn grab_frame(&mut self) -> Result<Frame> {
        if self.clip.is_some() {
            return Err(anyhow!("camera {} is recording", self.path));
        }
        let playhead = self.playhead_ms();
        let mut latest = None;
        while let Some(packet) = self.read_packet()? {
            let due = self.packet_ms(&packet) <= playhead;
            if !due && latest.is_some() {
                self.pending = Some(packet);
                break;
            }
            if let Some(decoded) = self.decode(&packet)? {
                latest = Some(decoded);
                // nothing due decoded yet, settle for the first frame past the playhead
                if !due {
                    break;
                }
            }
        }
        let decoded = latest.ok_or_else(|| anyhow!("video file {} has no more frames", self.path))?;
        self.frame_count += 1;
        self.to_frame(&decoded)
    }
}

impl Recorder for FfmpegFileCamera {
    fn start_recording(&mut self) -> Result<()> {
        if self.clip.is_some() {
            return Err(anyhow!("recording already in progress"));
        }
        if self.ended && self.pending.is_none() {
            return Err(anyhow!("video file {} has ended", self.path));
        }
        let parameters = self
            .input
            .stream(self.stream_index)
            .ok_or_else(|| anyhow!("video stream {} disappeared", self.stream_index))?
            .parameters();
        self.clip = Some(ClipWriter::create(parameters)?);
        // the decoder misses every packet that goes into the clip
        self.decoder.flush();
        self.need_keyframe = true;
        Ok(())
    }

    fn drain_fragments(&mut self) -> Result<Vec<Vec<u8>>> {
        if self.clip.is_none() {
            return Ok(Vec::new());
        }
        let playhead = self.playhead_ms();
        let time_base = self.time_base;
        while let Some(packet) = self.next_due_packet(playhead)? {
            if let Some(clip) = self.clip.as_mut() {
                clip.write(packet, time_base)?;
            }
        }
        Ok(Vec::new())
    }

    fn stop_recording(&mut self) -> Result<Vec<Vec<u8>>> {
        if self.clip.is_none() {
            return Err(anyhow!("no recording in progress"));
        }
        let drained = self.drain_fragments();
        let clip = self
            .clip
            .take()
            .ok_or_else(|| anyhow!("no recording in progress"))?;
        if let Err(err) = drained {
            clip.discard();
            return Err(err);
        }
        let bytes = clip.finish()?;
        Ok(if bytes.is_empty() { Vec::new() } else { vec![bytes] })
    }

    fn abort_recording(&mut self) {
        if let Some(clip) = self.clip.take() {
            clip.discard();
        }
    }
}

impl Drop for FfmpegFileCamera {
    fn drop(&mut self) {
        self.abort_recording();
    }
}

/// Stream-copy muxer for one clip.
struct ClipWriter {
    path: PathBuf,
    output: ffmpeg::format::context::Output,
    time_base: ffmpeg::Rational,
    packets: u64,
}

impl ClipWriter {
    fn create(parameters: ffmpeg::codec::Parameters) -> Result<Self> {
        let path = std::env::temp_dir().join(format!(
            "cidroy-clip-{:016x}.mkv",
            rand::thread_rng().gen::<u64>()
        ));
        let mut output = ffmpeg::format::output_as(&path, "matroska")
            .with_context(|| format!("failed to create clip {}", path.display()))?;
        {
            let mut stream = output
                .add_stream(ffmpeg::encoder::find(ffmpeg::codec::Id::None))
                .context("add clip stream")?;
            stream.set_parameters(parameters);
            // the source container's codec tag may be invalid in Matroska
            unsafe {
                (*stream.parameters().as_mut_ptr()).codec_tag = 0;
            }
        }
        output.write_header().context("write clip header")?;
        let time_base = output
            .stream(0)
            .ok_or_else(|| anyhow!("clip stream missing after header"))?
            .time_base();
        Ok(Self {
            path,
            output,
            time_base,
            packets: 0,
        })
    }

    fn write(&mut self, mut packet: ffmpeg::Packet, source: ffmpeg::Rational) -> Result<()> {
        // a clip has to open on a keyframe to be playable
        if self.packets == 0 && !packet.is_key() {
            return Ok(());
        }
        packet.rescale_ts(source, self.time_base);
        packet.set_position(-1);
        packet.set_stream(0);
        packet
            .write_interleaved(&mut self.output)
            .context("write clip packet")?;
        self.packets += 1;
        Ok(())
    }

    /// Close the clip and return its bytes; empty when no packet made it in.
    fn finish(mut self) -> Result<Vec<u8>> {
        let trailer = self.output.write_trailer().context("write clip trailer");
        let Self { path, output, packets, .. } = self;
        drop(output);
        let bytes = trailer.and_then(|()| {
            std::fs::read(&path).with_context(|| format!("failed to read clip {}", path.display()))
        });
        remove_clip(&path);
        let bytes = bytes?;
        Ok(if packets == 0 { Vec::new() } else { bytes })
    }

    fn discard(self) {
        let Self { path, output, .. } = self;
        drop(output);
        remove_clip(&path);
    }
}

fn remove_clip(path: &std::path::Path) {
    if let Err(err) = std::fs::remove_file(path) {
        log::warn!("failed to remove clip {}: {}", path.display(), err);
    }
}

fn rgb_pixels(frame: &ffmpeg::frame::Video) -> Result<Vec<u8>> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let row_bytes = width * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return data
            .get(..row_bytes * height)
            .map(|pixels| pixels.to_vec())
            .ok_or_else(|| anyhow!("ffmpeg frame is shorter than its dimensions"));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height);
    for row in 0..height {
        let start = row * stride;
        pixels.extend_from_slice(
            data.get(start..start + row_bytes)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }
    Ok(pixels)
}
