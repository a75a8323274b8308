use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};

use super::{DetectionLoop, LoopStats, StepOutcome};
use crate::detect::Classifier;
use crate::ingest::{FrameSource, Recorder};
use crate::store::EvidenceStore;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Drives a `DetectionLoop` until shutdown.
///
/// Sleeps until the loop's next wakeup, never longer than the poll interval,
/// so fragments are drained during captures and shutdown is noticed quickly.
/// An open capture is abandoned on shutdown, never saved half-way.
pub struct Runner<V, C, S> {
    detection: DetectionLoop<V, C, S>,
    poll_interval: Duration,
}

impl<V, C, S> Runner<V, C, S>
where
    V: FrameSource + Recorder + 'static,
    C: Classifier + 'static,
    S: EvidenceStore + 'static,
{
    pub fn new(detection: DetectionLoop<V, C, S>) -> Self {
        Self {
            detection,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run on the current thread until `shutdown` is set.
    pub fn run(mut self, shutdown: &AtomicBool) -> LoopStats {
        log::info!("detection loop running");
        loop {
            if shutdown.load(Ordering::SeqCst) {
                self.detection.abandon();
                break;
            }

            match self.detection.step() {
                StepOutcome::Waiting | StepOutcome::Collected { .. } => {}
                outcome => log::debug!("detection step: {:?}", outcome),
            }

            let now = self.detection.now_ms();
            let wait_ms = self.detection.next_wakeup_ms().saturating_sub(now);
            let pause = Duration::from_millis(wait_ms).min(self.poll_interval);
            if !pause.is_zero() {
                std::thread::sleep(pause);
            }
        }
        let stats = self.detection.stats();
        log::info!(
            "detection loop stopped: ticks={} captures={} saved={} save_failures={} abandoned={}",
            stats.ticks,
            stats.captures_started,
            stats.clips_saved,
            stats.save_failures,
            stats.captures_abandoned
        );
        stats
    }

    /// Run on a dedicated thread.
    pub fn spawn(self) -> Result<RunnerHandle> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let join = std::thread::Builder::new()
            .name("cidroy-watch".to_string())
            .spawn(move || self.run(&shutdown_thread))?;
        Ok(RunnerHandle {
            shutdown,
            join: Some(join),
        })
    }
}

#[derive(Debug)]
pub struct RunnerHandle {
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<LoopStats>>,
}

impl RunnerHandle {
    pub fn is_finished(&self) -> bool {
        self.join
            .as_ref()
            .map(|join| join.is_finished())
            .unwrap_or(true)
    }

    /// Signal shutdown and wait for the loop thread.
    pub fn stop(mut self) -> Result<LoopStats> {
        self.shutdown.store(true, Ordering::SeqCst);
        let join = self
            .join
            .take()
            .ok_or_else(|| anyhow!("detection loop already joined"))?;
        join.join()
            .map_err(|_| anyhow!("detection loop thread panicked"))
    }
}

/// A dropped handle stops the loop too; an open capture is abandoned.
impl Drop for RunnerHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::error!("detection loop thread panicked");
            }
        }
    }
}
