use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::DEFAULT_MIME_TYPE;
use crate::ingest::SourceConfig;
use crate::rule::{CaptureRule, DEFAULT_OBJECT_CLASSES, DEFAULT_PERSON_CLASS};
use crate::watch::{LoopSettings, DEFAULT_CAPTURE_MS, DEFAULT_SAMPLE_INTERVAL_MS};

const DEFAULT_DB_PATH: &str = "cidroy.db";
const DEFAULT_SOURCE_URL: &str = "stub://webcam";
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_CLASSIFIER: &str = "scripted";
const DEFAULT_CLASSIFIER_THRESHOLD: f32 = 0.35;
const DEFAULT_MODEL_SIZE: u32 = 640;
const DEFAULT_STORE_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    db_path: Option<String>,
    source: Option<SourceConfigFile>,
    classifier: Option<ClassifierConfigFile>,
    rule: Option<RuleConfigFile>,
    timing: Option<TimingConfigFile>,
    store: Option<StoreConfigFile>,
    capture: Option<CaptureConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    warmup_polls: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ClassifierConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    script_path: Option<PathBuf>,
    threshold: Option<f32>,
    model_width: Option<u32>,
    model_height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct RuleConfigFile {
    person_class: Option<String>,
    object_classes: Option<Vec<String>>,
    min_confidence: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct TimingConfigFile {
    sample_interval_ms: Option<u64>,
    capture_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct StoreConfigFile {
    kind: Option<String>,
    endpoint: Option<String>,
    save_retries: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    mime_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub db_path: String,
    pub source: SourceSettings,
    pub classifier: ClassifierSettings,
    pub rule: RuleSettings,
    pub timing: TimingSettings,
    pub store: StoreSettings,
    pub mime_type: String,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub warmup_polls: u32,
}

#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub script_path: Option<PathBuf>,
    pub threshold: f32,
    /// Network input size; frames are letterboxed into it.
    pub model_width: u32,
    pub model_height: u32,
}

#[derive(Debug, Clone)]
pub struct RuleSettings {
    pub person_class: String,
    pub object_classes: Vec<String>,
    pub min_confidence: f32,
}

#[derive(Debug, Clone)]
pub struct TimingSettings {
    pub sample_interval: Duration,
    pub capture: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Sqlite,
    Http,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub kind: StoreKind,
    pub endpoint: Option<String>,
    pub save_retries: u32,
    pub timeout: Duration,
}

impl DetectorConfig {
    /// Defaults, then the JSON file named by `CIDROY_CONFIG`, then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CIDROY_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Like `load`, with an explicit config file path.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DetectorConfigFile) -> Result<Self> {
        let db_path = file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let source = file.source.unwrap_or_default();
        let classifier = file.classifier.unwrap_or_default();
        let rule = file.rule.unwrap_or_default();
        let timing = file.timing.unwrap_or_default();
        let store = file.store.unwrap_or_default();
        let kind = match store.kind.as_deref() {
            Some(kind) => parse_store_kind(kind)?,
            None => StoreKind::Sqlite,
        };
        Ok(Self {
            db_path,
            source: SourceSettings {
                url: source
                    .url
                    .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
                width: source.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
                height: source.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
                warmup_polls: source.warmup_polls.unwrap_or(0),
            },
            classifier: ClassifierSettings {
                backend: classifier
                    .backend
                    .unwrap_or_else(|| DEFAULT_CLASSIFIER.to_string()),
                model_path: classifier.model_path,
                script_path: classifier.script_path,
                threshold: classifier
                    .threshold
                    .unwrap_or(DEFAULT_CLASSIFIER_THRESHOLD),
                model_width: classifier.model_width.unwrap_or(DEFAULT_MODEL_SIZE),
                model_height: classifier.model_height.unwrap_or(DEFAULT_MODEL_SIZE),
            },
            rule: RuleSettings {
                person_class: rule
                    .person_class
                    .unwrap_or_else(|| DEFAULT_PERSON_CLASS.to_string()),
                object_classes: rule.object_classes.unwrap_or_else(|| {
                    DEFAULT_OBJECT_CLASSES
                        .iter()
                        .map(|class| class.to_string())
                        .collect()
                }),
                min_confidence: rule.min_confidence.unwrap_or(0.0),
            },
            timing: TimingSettings {
                sample_interval: Duration::from_millis(
                    timing
                        .sample_interval_ms
                        .unwrap_or(DEFAULT_SAMPLE_INTERVAL_MS),
                ),
                capture: Duration::from_millis(timing.capture_ms.unwrap_or(DEFAULT_CAPTURE_MS)),
            },
            store: StoreSettings {
                kind,
                endpoint: store.endpoint,
                save_retries: store.save_retries.unwrap_or(0),
                timeout: Duration::from_secs(
                    store.timeout_secs.unwrap_or(DEFAULT_STORE_TIMEOUT_SECS),
                ),
            },
            mime_type: file
                .capture
                .and_then(|capture| capture.mime_type)
                .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("CIDROY_DB_PATH") {
            if !path.trim().is_empty() {
                self.db_path = path;
            }
        }
        if let Ok(url) = std::env::var("CIDROY_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(classes) = std::env::var("CIDROY_OBJECT_CLASSES") {
            let parsed = split_csv(&classes);
            if !parsed.is_empty() {
                self.rule.object_classes = parsed;
            }
        }
        if let Ok(endpoint) = std::env::var("CIDROY_STORE_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                self.store.endpoint = Some(endpoint);
                self.store.kind = StoreKind::Http;
            }
        }
        if let Ok(interval) = std::env::var("CIDROY_SAMPLE_INTERVAL_MS") {
            let ms: u64 = interval.parse().map_err(|_| {
                anyhow!("CIDROY_SAMPLE_INTERVAL_MS must be an integer number of milliseconds")
            })?;
            self.timing.sample_interval = Duration::from_millis(ms);
        }
        if let Ok(capture) = std::env::var("CIDROY_CAPTURE_MS") {
            let ms: u64 = capture.parse().map_err(|_| {
                anyhow!("CIDROY_CAPTURE_MS must be an integer number of milliseconds")
            })?;
            self.timing.capture = Duration::from_millis(ms);
        }
        if let Ok(retries) = std::env::var("CIDROY_SAVE_RETRIES") {
            self.store.save_retries = retries
                .parse()
                .map_err(|_| anyhow!("CIDROY_SAVE_RETRIES must be a non-negative integer"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.timing.sample_interval.is_zero() {
            return Err(anyhow!("sample interval must be greater than zero"));
        }
        if self.timing.capture.is_zero() {
            return Err(anyhow!("capture duration must be greater than zero"));
        }
        if self.classifier.model_width == 0 || self.classifier.model_height == 0 {
            return Err(anyhow!("classifier model size must be non-zero"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source size must be non-zero"));
        }
        if !(0.0..=1.0).contains(&self.classifier.threshold) {
            return Err(anyhow!("classifier threshold must be within 0..=1"));
        }
        if self.store.kind == StoreKind::Http && self.store.endpoint.is_none() {
            return Err(anyhow!("http store requires store.endpoint"));
        }
        if self.mime_type.trim().is_empty() {
            return Err(anyhow!("capture mime_type must not be empty"));
        }
        // builds and discards the rule so bad class lists fail at startup
        self.capture_rule()?;
        Ok(())
    }

    pub fn capture_rule(&self) -> Result<CaptureRule> {
        CaptureRule::new(&self.rule.person_class, self.rule.object_classes.clone())?
            .with_min_confidence(self.rule.min_confidence)
    }

    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            sample_interval_ms: duration_ms(self.timing.sample_interval),
            capture_ms: duration_ms(self.timing.capture),
            mime_type: self.mime_type.clone(),
            save_retries: self.store.save_retries,
        }
    }

    pub fn video_source(&self) -> SourceConfig {
        SourceConfig {
            url: self.source.url.clone(),
            width: self.source.width,
            height: self.source.height,
            warmup_polls: self.source.warmup_polls,
        }
    }
}

fn read_config_file(path: &Path) -> Result<DetectorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn parse_store_kind(kind: &str) -> Result<StoreKind> {
    match kind.trim().to_ascii_lowercase().as_str() {
        "sqlite" => Ok(StoreKind::Sqlite),
        "http" => Ok(StoreKind::Http),
        other => Err(anyhow!("unknown store kind '{}'", other)),
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
