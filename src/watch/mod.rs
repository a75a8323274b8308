//! Detection-capture loop.
//!
//! `DetectionLoop` owns the video device, classifier, evidence store and
//! clock, and holds the only piece of mutable state: `Idle` or
//! `Capturing(CaptureSession)`. At most one capture is open at a time and
//! sampling is suppressed while it is.
//!
//! `step` is the scheduler entry point; `Runner` calls it from a dedicated
//! thread. Tests drive it directly with a `ManualClock`.

mod runner;

pub use runner::{Runner, RunnerHandle};

use serde::Serialize;

use crate::capture::{CaptureSession, EvidenceRecord, DEFAULT_MIME_TYPE};
use crate::clock::Clock;
use crate::detect::{Classifier, LabelSet};
use crate::ingest::{FrameSource, Recorder};
use crate::rule::CaptureRule;
use crate::store::{EvidenceStore, SaveAck};

pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 3_000;
pub const DEFAULT_CAPTURE_MS: u64 = 5_000;

/// Timing and hand-off settings for one loop.
#[derive(Clone, Debug)]
pub struct LoopSettings {
    pub sample_interval_ms: u64,
    pub capture_ms: u64,
    pub mime_type: String,
    /// Extra save attempts after a failed one.
    pub save_retries: u32,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            capture_ms: DEFAULT_CAPTURE_MS,
            mime_type: DEFAULT_MIME_TYPE.to_string(),
            save_retries: 0,
        }
    }
}

#[derive(Debug)]
pub enum LoopState {
    Idle,
    Capturing(CaptureSession),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ClassifierState {
    NotLoaded,
    Ready,
    Failed,
}

/// Why a sampling tick did nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    ClassifierUnavailable,
    SourceNotReady,
    CaptureInProgress,
    InferenceFailed,
    RecorderFailed,
}

/// What one call into the loop did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// Nothing was due.
    Waiting,
    Skipped(SkipReason),
    /// Frame classified, rule did not fire.
    NoMatch,
    CaptureStarted {
        started_at_ms: u64,
        object: String,
    },
    Collected {
        fragments: usize,
    },
    Saved {
        ack: SaveAck,
        timestamp: u64,
        byte_len: u64,
    },
    SaveFailed {
        timestamp: u64,
        error: String,
    },
    /// The capture produced no fragments; nothing was persisted.
    Discarded {
        timestamp: u64,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LoopStats {
    pub ticks: u64,
    pub inferences: u64,
    pub inference_failures: u64,
    pub classifier_failures: u64,
    pub captures_started: u64,
    pub clips_saved: u64,
    pub save_failures: u64,
    pub captures_discarded: u64,
    pub captures_abandoned: u64,
}

pub struct DetectionLoop<V, C, S> {
    video: V,
    classifier: C,
    store: S,
    clock: Box<dyn Clock>,
    rule: CaptureRule,
    settings: LoopSettings,
    state: LoopState,
    classifier_state: ClassifierState,
    next_sample_ms: u64,
    stats: LoopStats,
}

impl<V, C, S> DetectionLoop<V, C, S>
where
    V: FrameSource + Recorder,
    C: Classifier,
    S: EvidenceStore,
{
    /// Build an idle loop. The first sample is due one interval from now.
    pub fn new(
        video: V,
        classifier: C,
        store: S,
        clock: Box<dyn Clock>,
        rule: CaptureRule,
        settings: LoopSettings,
    ) -> Self {
        let next_sample_ms = clock.now_ms().saturating_add(settings.sample_interval_ms);
        Self {
            video,
            classifier,
            store,
            clock,
            rule,
            settings,
            state: LoopState::Idle,
            classifier_state: ClassifierState::NotLoaded,
            next_sample_ms,
            stats: LoopStats::default(),
        }
    }

    /// Load the classifier once. On failure every later tick is a no-op.
    pub fn load_classifier(&mut self) -> anyhow::Result<()> {
        match self.classifier.load() {
            Ok(()) => {
                self.classifier_state = ClassifierState::Ready;
                log::info!("classifier '{}' loaded", self.classifier.name());
                Ok(())
            }
            Err(err) => {
                self.classifier_state = ClassifierState::Failed;
                self.stats.classifier_failures += 1;
                log::error!(
                    "classifier '{}' unavailable, detection disabled: {:#}",
                    self.classifier.name(),
                    err
                );
                Err(err.context("classifier load failed"))
            }
        }
    }

    pub fn classifier_ready(&self) -> bool {
        self.classifier_state == ClassifierState::Ready
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self.state, LoopState::Capturing(_))
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    pub fn stats(&self) -> LoopStats {
        self.stats.clone()
    }

    pub fn video(&self) -> &V {
        &self.video
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Earliest instant something is due: the capture deadline while
    /// capturing, the next sample otherwise.
    pub fn next_wakeup_ms(&self) -> u64 {
        match &self.state {
            LoopState::Capturing(session) => session.deadline_ms(),
            LoopState::Idle => self.next_sample_ms,
        }
    }

    /// Do whatever is due now.
    pub fn step(&mut self) -> StepOutcome {
        let now = self.clock.now_ms();
        let capture_due = match &self.state {
            LoopState::Capturing(session) => Some(session.is_due(now)),
            LoopState::Idle => None,
        };
        match capture_due {
            Some(true) => self.finalize(),
            Some(false) => self.collect(),
            None if now >= self.next_sample_ms => {
                self.next_sample_ms = now.saturating_add(self.settings.sample_interval_ms);
                self.sample()
            }
            None => StepOutcome::Waiting,
        }
    }

    /// One sampling tick: classify a frame and open a capture if the rule fires.
    pub fn sample(&mut self) -> StepOutcome {
        self.stats.ticks += 1;
        if self.is_capturing() {
            return StepOutcome::Skipped(SkipReason::CaptureInProgress);
        }
        if !self.classifier_ready() {
            return StepOutcome::Skipped(SkipReason::ClassifierUnavailable);
        }
        if !self.video.is_ready() {
            log::debug!("video source not ready, skipping tick");
            return StepOutcome::Skipped(SkipReason::SourceNotReady);
        }

        let labels = match self.classify_frame() {
            Ok(labels) => labels,
            Err(err) => {
                self.stats.inference_failures += 1;
                log::warn!("inference failed: {:#}", err);
                return StepOutcome::Skipped(SkipReason::InferenceFailed);
            }
        };
        self.stats.inferences += 1;

        let Some(object) = self.rule.matched_object(&labels).map(str::to_string) else {
            return StepOutcome::NoMatch;
        };
        self.start_capture(object)
    }

    fn classify_frame(&mut self) -> anyhow::Result<LabelSet> {
        let frame = self.video.grab_frame()?;
        let labels = self.classifier.classify(&frame)?;
        drop(frame);
        Ok(labels)
    }

    fn start_capture(&mut self, object: String) -> StepOutcome {
        if let Err(err) = self.video.start_recording() {
            log::error!("recorder failed to start: {:#}", err);
            return StepOutcome::Skipped(SkipReason::RecorderFailed);
        }
        let started_at_ms = self.clock.now_ms();
        self.state = LoopState::Capturing(CaptureSession::new(
            started_at_ms,
            self.settings.capture_ms,
        ));
        self.stats.captures_started += 1;
        log::warn!(
            "possible littering detected ({} + {}), recording {} ms",
            self.rule.person_class(),
            object,
            self.settings.capture_ms
        );
        StepOutcome::CaptureStarted {
            started_at_ms,
            object,
        }
    }

    /// Pull pending fragments into the open capture.
    pub fn collect(&mut self) -> StepOutcome {
        let LoopState::Capturing(session) = &mut self.state else {
            return StepOutcome::Waiting;
        };
        match self.video.drain_fragments() {
            Ok(fragments) => StepOutcome::Collected {
                fragments: session.push_fragments(fragments),
            },
            Err(err) => {
                log::warn!("fragment drain failed: {:#}", err);
                StepOutcome::Collected { fragments: 0 }
            }
        }
    }

    /// Close the open capture and hand the clip to the store. The loop is
    /// idle again afterwards whatever the store answers.
    pub fn finalize(&mut self) -> StepOutcome {
        let LoopState::Capturing(mut session) =
            std::mem::replace(&mut self.state, LoopState::Idle)
        else {
            return StepOutcome::Waiting;
        };
        let now = self.clock.now_ms();
        self.next_sample_ms = now.saturating_add(self.settings.sample_interval_ms);

        match self.video.stop_recording() {
            Ok(trailing) => {
                session.push_fragments(trailing);
            }
            Err(err) => log::warn!("recorder stop failed: {:#}", err),
        }

        let timestamp = session.started_at_ms();
        if session.is_empty() {
            self.stats.captures_discarded += 1;
            log::warn!("capture started at {} produced no video, discarded", timestamp);
            return StepOutcome::Discarded { timestamp };
        }

        let record = session.finish(&self.settings.mime_type);
        match self.save_with_retry(&record) {
            Ok(ack) => {
                self.stats.clips_saved += 1;
                log::info!(
                    "evidence saved to {} as {} ({} bytes, captured_at={})",
                    self.store.name(),
                    ack.id,
                    record.byte_len,
                    record.timestamp
                );
                StepOutcome::Saved {
                    ack,
                    timestamp,
                    byte_len: record.byte_len,
                }
            }
            Err(err) => {
                self.stats.save_failures += 1;
                log::error!(
                    "evidence save to {} failed, clip dropped: {:#}",
                    self.store.name(),
                    err
                );
                StepOutcome::SaveFailed {
                    timestamp,
                    error: format!("{:#}", err),
                }
            }
        }
    }

    fn save_with_retry(&mut self, record: &EvidenceRecord) -> anyhow::Result<SaveAck> {
        let attempts = self.settings.save_retries.saturating_add(1);
        let mut attempt = 1;
        loop {
            match self.store.save(record) {
                Ok(ack) => return Ok(ack),
                Err(err) if attempt < attempts => {
                    log::warn!(
                        "evidence save attempt {}/{} failed: {:#}",
                        attempt,
                        attempts,
                        err
                    );
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Drop an open capture without persisting it. Returns true when one was open.
    pub fn abandon(&mut self) -> bool {
        let LoopState::Capturing(session) = std::mem::replace(&mut self.state, LoopState::Idle)
        else {
            return false;
        };
        self.video.abort_recording();
        self.stats.captures_abandoned += 1;
        log::warn!(
            "capture started at {} abandoned ({} fragments dropped)",
            session.started_at_ms(),
            session.fragment_count()
        );
        true
    }
}
