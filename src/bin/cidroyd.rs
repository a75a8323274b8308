//! cidroyd - littering-evidence detection daemon
//!
//! This daemon:
//! 1. Opens the configured video source (stub:// or a local video file)
//! 2. Loads the configured classifier once
//! 3. Samples a frame every interval and evaluates the capture rule
//! 4. Records a fixed-length clip when the rule fires
//! 5. Hands each finished clip to the evidence store
//! 6. Abandons any open capture on shutdown (Ctrl-C or --max-runtime-secs)

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cidroy::config::{DetectorConfig, StoreKind};
use cidroy::{
    ClassifierRegistry, DetectionLoop, EvidenceStore, LabelSet, Runner, ScriptedClassifier,
    SqliteEvidenceStore, SystemClock, VideoSource,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON config file (falls back to CIDROY_CONFIG).
    #[arg(long, env = "CIDROY_CONFIG")]
    config: Option<PathBuf>,
    /// Stop after this many seconds.
    #[arg(long)]
    max_runtime_secs: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cfg = DetectorConfig::load_from(args.config.as_deref())?;

    let video = VideoSource::open(cfg.video_source())?;
    let classifier = build_classifiers(&cfg)?.take_default()?;
    let store = open_store(&cfg)?;
    let rule = cfg.capture_rule()?;

    log::info!(
        "cidroyd {} watching {} ({} source, classifier={}, store={})",
        env!("CARGO_PKG_VERSION"),
        cfg.source.url,
        video.kind(),
        classifier.name(),
        store.name()
    );
    log::info!(
        "sampling every {:?}, capturing {:?}, objects={:?}",
        cfg.timing.sample_interval,
        cfg.timing.capture,
        cfg.rule.object_classes
    );

    let mut settings = cfg.loop_settings();
    if let Some(mime_type) = video.mime_type() {
        settings.mime_type = mime_type.to_string();
    }
    let mut detection = DetectionLoop::new(
        video,
        classifier,
        store,
        Box::new(SystemClock),
        rule,
        settings,
    );
    // A failed load leaves the loop running with every tick a no-op.
    if let Err(err) = detection.load_classifier() {
        log::error!("continuing without detection: {:#}", err);
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_signal = shutdown.clone();
    ctrlc::set_handler(move || shutdown_signal.store(true, Ordering::SeqCst))
        .map_err(|e| anyhow!("failed to install Ctrl-C handler: {}", e))?;

    let handle = Runner::new(detection).spawn()?;

    let started = Instant::now();
    let deadline = args.max_runtime_secs.map(Duration::from_secs);
    while !shutdown.load(Ordering::SeqCst) && !handle.is_finished() {
        if deadline.is_some_and(|limit| started.elapsed() >= limit) {
            log::info!("max runtime reached");
            break;
        }
        std::thread::sleep(Duration::from_millis(200));
    }

    let stats = handle.stop()?;
    log::info!("final stats: {}", serde_json::to_string(&stats)?);
    Ok(())
}

fn build_classifiers(cfg: &DetectorConfig) -> Result<ClassifierRegistry> {
    let mut registry = ClassifierRegistry::new();

    let scripted = match &cfg.classifier.script_path {
        Some(path) => ScriptedClassifier::from_json_file(path, true)?,
        None => ScriptedClassifier::cycling(demo_script()),
    };
    registry.register(scripted);

    register_model(&mut registry, cfg);

    registry.set_default(&cfg.classifier.backend).map_err(|e| {
        anyhow!(
            "{} (available: {})",
            e,
            registry.list().join(", ")
        )
    })?;
    Ok(registry)
}

#[cfg(feature = "backend-tract")]
fn register_model(registry: &mut ClassifierRegistry, cfg: &DetectorConfig) {
    if let Some(model_path) = &cfg.classifier.model_path {
        registry.register(
            cidroy::detect::TractClassifier::new(
                model_path,
                cfg.classifier.model_width,
                cfg.classifier.model_height,
            )
            .with_threshold(cfg.classifier.threshold),
        );
    }
}

#[cfg(not(feature = "backend-tract"))]
fn register_model(_registry: &mut ClassifierRegistry, cfg: &DetectorConfig) {
    if cfg.classifier.model_path.is_some() {
        log::warn!("classifier.model_path ignored: built without the backend-tract feature");
    }
}

/// Quiet scene for a few samples, then one qualifying frame.
fn demo_script() -> Vec<LabelSet> {
    vec![
        LabelSet::from_classes(&["person"]),
        LabelSet::from_classes(&["bench", "bottle"]),
        LabelSet::default(),
        LabelSet::from_classes(&["person", "bottle"]),
    ]
}

fn open_store(cfg: &DetectorConfig) -> Result<Box<dyn EvidenceStore>> {
    match cfg.store.kind {
        StoreKind::Sqlite => Ok(Box::new(SqliteEvidenceStore::open(&cfg.db_path)?)),
        #[cfg(feature = "remote-store")]
        StoreKind::Http => {
            let endpoint = cfg
                .store
                .endpoint
                .as_deref()
                .ok_or_else(|| anyhow!("http store requires store.endpoint"))?;
            Ok(Box::new(cidroy::store::HttpEvidenceStore::new(
                endpoint,
                cfg.store.timeout,
            )?))
        }
        #[cfg(not(feature = "remote-store"))]
        StoreKind::Http => Err(anyhow!(
            "http store requires the remote-store feature"
        )),
    }
}
