//! CIDROY littering-evidence detector
//!
//! Watches a live video source, samples it at a fixed interval, runs an
//! object classifier over each sample and, when a person shows up together
//! with a handheld/disposable object, records a short clip and hands it to
//! an evidence store.
//!
//! # Architecture
//!
//! - `frame`: Ephemeral frames (private bytes, zeroized on drop)
//! - `detect`: Labels, the `Classifier` capability, registry and backends
//! - `rule`: The person + disposable-object capture heuristic
//! - `ingest`: `FrameSource` / `Recorder` capabilities, the synthetic camera
//!   and the FFmpeg video-file camera
//! - `capture`: Capture sessions and evidence records
//! - `store`: `EvidenceStore` persistence (SQLite, memory, HTTP)
//! - `watch`: The detection-capture loop and its runner thread
//! - `config`: File + environment configuration for `cidroyd`
//!
//! The capture rule is a heuristic, not ground truth: it cannot tell a
//! person throwing a bottle away from one drinking from it.

pub mod capture;
pub mod clock;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod rule;
pub mod store;
pub mod watch;

pub use capture::{CaptureSession, EvidenceRecord};
pub use clock::{Clock, ManualClock, SystemClock};
pub use detect::{Classifier, ClassifierRegistry, Label, LabelSet, ScriptedClassifier};
pub use frame::Frame;
pub use ingest::{
    FrameSource, Recorder, SourceConfig, SyntheticCamera, SyntheticConfig, VideoSource,
};
pub use rule::CaptureRule;
pub use store::{EvidenceStore, MemoryEvidenceStore, SaveAck, SqliteEvidenceStore};
pub use watch::{
    DetectionLoop, LoopSettings, LoopState, LoopStats, Runner, RunnerHandle, SkipReason,
    StepOutcome,
};
