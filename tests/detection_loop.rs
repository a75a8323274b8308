//! End-to-end detection loop scenarios with a fake camera and a manual clock.

use anyhow::{anyhow, Result};
use cidroy::{
    CaptureRule, Clock, DetectionLoop, EvidenceStore, Frame, FrameSource, LabelSet, LoopSettings,
    ManualClock, MemoryEvidenceStore, Recorder, ScriptedClassifier, SkipReason, StepOutcome,
};

const T0: u64 = 1_700_000_000_000;

/// Camera that yields tiny frames and numbered fragments.
#[derive(Default)]
struct FakeCamera {
    not_ready: bool,
    recording: bool,
    fragment_seq: u32,
    recordings: u32,
    fail_start: bool,
}

impl FakeCamera {
    fn fragment(&mut self) -> Vec<u8> {
        self.fragment_seq += 1;
        format!("frag-{};", self.fragment_seq).into_bytes()
    }
}

impl FrameSource for FakeCamera {
    fn is_ready(&mut self) -> bool {
        !self.not_ready
    }

    fn grab_frame(&mut self) -> Result<Frame> {
        Frame::new(vec![0u8; 12], 2, 2, 1)
    }
}

impl Recorder for FakeCamera {
    fn start_recording(&mut self) -> Result<()> {
        if self.fail_start {
            return Err(anyhow!("camera busy"));
        }
        if self.recording {
            return Err(anyhow!("overlapping recording"));
        }
        self.recording = true;
        self.recordings += 1;
        Ok(())
    }

    fn drain_fragments(&mut self) -> Result<Vec<Vec<u8>>> {
        if !self.recording {
            return Ok(Vec::new());
        }
        Ok(vec![self.fragment()])
    }

    fn stop_recording(&mut self) -> Result<Vec<Vec<u8>>> {
        self.recording = false;
        Ok(vec![self.fragment()])
    }

    fn abort_recording(&mut self) {
        self.recording = false;
    }
}

fn detection<S: EvidenceStore>(
    camera: FakeCamera,
    script: Vec<LabelSet>,
    store: S,
    clock: &ManualClock,
) -> DetectionLoop<FakeCamera, ScriptedClassifier, S> {
    let mut detection = DetectionLoop::new(
        camera,
        ScriptedClassifier::new(script),
        store,
        Box::new(clock.clone()),
        CaptureRule::default(),
        LoopSettings::default(),
    );
    detection.load_classifier().expect("load classifier");
    detection
}

/// Advance in 500 ms slices, stepping each time, until `until_ms`.
fn run_until<S: EvidenceStore>(
    detection: &mut DetectionLoop<FakeCamera, ScriptedClassifier, S>,
    clock: &ManualClock,
    until_ms: u64,
) -> Vec<(u64, StepOutcome)> {
    let mut outcomes = Vec::new();
    while clock.now_ms() < until_ms {
        clock.advance(500);
        let outcome = detection.step();
        if outcome != StepOutcome::Waiting {
            outcomes.push((clock.now_ms(), outcome));
        }
    }
    outcomes
}

#[test]
fn person_with_bottle_captures_and_saves_once() {
    let clock = ManualClock::new(T0);
    let store = MemoryEvidenceStore::new();
    let mut detection = detection(
        FakeCamera::default(),
        vec![LabelSet::from_classes(&["person", "bottle"])],
        store.clone(),
        &clock,
    );

    let outcomes = run_until(&mut detection, &clock, T0 + 12_000);

    let (fired_at, first) = &outcomes[0];
    assert_eq!(*fired_at, T0 + 3_000);
    assert!(matches!(first, StepOutcome::CaptureStarted { object, .. } if object == "bottle"));

    let saved: Vec<_> = outcomes
        .iter()
        .filter(|(_, outcome)| matches!(outcome, StepOutcome::Saved { .. }))
        .collect();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].0, T0 + 8_000, "finalize exactly 5 s after firing");

    let records = store.records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert!(record.timestamp >= T0 + 3_000);
    assert_eq!(record.timestamp, T0 + 3_000);
    let payload = record.decode_payload().unwrap();
    assert!(!payload.is_empty());
    assert!(payload.starts_with(b"frag-1;"));
    assert!(record.video.starts_with("data:video/webm;base64,"));
    assert!(!detection.is_capturing());
}

#[test]
fn objects_without_person_never_capture() {
    let clock = ManualClock::new(T0);
    let store = MemoryEvidenceStore::new();
    let mut detection = detection(
        FakeCamera::default(),
        vec![
            LabelSet::from_classes(&["bottle", "cup"]),
            LabelSet::from_classes(&["fork", "knife", "spoon"]),
        ],
        store.clone(),
        &clock,
    );

    let outcomes = run_until(&mut detection, &clock, T0 + 10_000);
    assert!(outcomes
        .iter()
        .all(|(_, outcome)| *outcome == StepOutcome::NoMatch));
    assert_eq!(outcomes.len(), 3);
    assert_eq!(store.attempts(), 0);
    assert_eq!(detection.stats().captures_started, 0);
}

#[test]
fn qualifying_detections_during_capture_are_ignored() {
    let clock = ManualClock::new(T0);
    let store = MemoryEvidenceStore::new();
    let mut detection = detection(
        FakeCamera::default(),
        vec![
            LabelSet::from_classes(&["person", "bottle"]),
            LabelSet::from_classes(&["person", "cup"]),
        ],
        store.clone(),
        &clock,
    );

    clock.advance(3_000);
    assert!(matches!(detection.step(), StepOutcome::CaptureStarted { .. }));

    // a second qualifying frame one second later must not open another capture
    clock.advance(1_000);
    assert_eq!(
        detection.sample(),
        StepOutcome::Skipped(SkipReason::CaptureInProgress)
    );
    assert_eq!(detection.video().recordings, 1);

    clock.advance(4_000);
    assert!(matches!(detection.step(), StepOutcome::Saved { .. }));
    assert_eq!(store.records().len(), 1);
    assert_eq!(detection.stats().captures_started, 1);
}

#[test]
fn save_failure_still_returns_to_idle() {
    let clock = ManualClock::new(T0);
    let store = MemoryEvidenceStore::always_failing();
    let mut detection = detection(
        FakeCamera::default(),
        vec![
            LabelSet::from_classes(&["person", "cup"]),
            LabelSet::default(),
            LabelSet::from_classes(&["person", "spoon"]),
        ],
        store.clone(),
        &clock,
    );

    let outcomes = run_until(&mut detection, &clock, T0 + 20_000);
    let failures = outcomes
        .iter()
        .filter(|(_, outcome)| matches!(outcome, StepOutcome::SaveFailed { .. }))
        .count();
    assert_eq!(failures, 2, "second capture proves the loop was not locked up");
    assert_eq!(detection.stats().save_failures, 2);
    assert_eq!(detection.video().recordings, 2);
    assert!(!detection.is_capturing());
}

#[test]
fn bounded_retry_recovers_transient_store_failure() {
    let clock = ManualClock::new(T0);
    let store = MemoryEvidenceStore::failing_next(2);
    let mut detection = DetectionLoop::new(
        FakeCamera::default(),
        ScriptedClassifier::new(vec![LabelSet::from_classes(&["person", "fork"])]),
        store.clone(),
        Box::new(clock.clone()),
        CaptureRule::default(),
        LoopSettings {
            save_retries: 2,
            ..LoopSettings::default()
        },
    );
    detection.load_classifier().unwrap();

    let outcomes = run_until(&mut detection, &clock, T0 + 9_000);
    assert!(outcomes
        .iter()
        .any(|(_, outcome)| matches!(outcome, StepOutcome::Saved { .. })));
    assert_eq!(store.attempts(), 3);
    assert_eq!(store.records().len(), 1);
}

#[test]
fn classifier_load_failure_disables_detection() {
    let clock = ManualClock::new(T0);
    let store = MemoryEvidenceStore::new();
    let mut detection = DetectionLoop::new(
        FakeCamera::default(),
        ScriptedClassifier::cycling(vec![LabelSet::from_classes(&["person", "bottle"])])
            .with_load_failure(),
        store.clone(),
        Box::new(clock.clone()),
        CaptureRule::default(),
        LoopSettings::default(),
    );
    assert!(detection.load_classifier().is_err());
    assert!(!detection.classifier_ready());

    let outcomes = run_until(&mut detection, &clock, T0 + 30_000);
    assert!(!outcomes.is_empty());
    assert!(outcomes.iter().all(|(_, outcome)| *outcome
        == StepOutcome::Skipped(SkipReason::ClassifierUnavailable)));
    assert_eq!(store.attempts(), 0);
    assert_eq!(detection.stats().classifier_failures, 1);
}

#[test]
fn source_not_ready_is_a_no_op() {
    let clock = ManualClock::new(T0);
    let mut detection = detection(
        FakeCamera {
            not_ready: true,
            ..FakeCamera::default()
        },
        vec![LabelSet::from_classes(&["person", "bottle"])],
        MemoryEvidenceStore::new(),
        &clock,
    );
    assert_eq!(
        detection.sample(),
        StepOutcome::Skipped(SkipReason::SourceNotReady)
    );
    assert_eq!(detection.stats().inferences, 0);
}

#[test]
fn recorder_start_failure_keeps_loop_idle() {
    let clock = ManualClock::new(T0);
    let mut detection = detection(
        FakeCamera {
            fail_start: true,
            ..FakeCamera::default()
        },
        vec![LabelSet::from_classes(&["person", "bottle"])],
        MemoryEvidenceStore::new(),
        &clock,
    );
    assert_eq!(
        detection.sample(),
        StepOutcome::Skipped(SkipReason::RecorderFailed)
    );
    assert!(!detection.is_capturing());
}

#[test]
fn abandoned_capture_is_never_saved() {
    let clock = ManualClock::new(T0);
    let store = MemoryEvidenceStore::new();
    let mut detection = detection(
        FakeCamera::default(),
        vec![LabelSet::from_classes(&["person", "knife"])],
        store.clone(),
        &clock,
    );
    clock.advance(3_000);
    assert!(matches!(detection.step(), StepOutcome::CaptureStarted { .. }));
    clock.advance(2_000);
    detection.step();

    assert!(detection.abandon());
    assert!(!detection.video().recording);

    let outcomes = run_until(&mut detection, &clock, T0 + 12_000);
    assert!(outcomes
        .iter()
        .all(|(_, outcome)| !matches!(outcome, StepOutcome::Saved { .. })));
    assert_eq!(store.attempts(), 0);
}
