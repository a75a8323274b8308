use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use cidroy::config::{DetectorConfig, StoreKind};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "CIDROY_CONFIG",
        "CIDROY_DB_PATH",
        "CIDROY_SOURCE_URL",
        "CIDROY_SAMPLE_INTERVAL_MS",
        "CIDROY_CAPTURE_MS",
        "CIDROY_OBJECT_CLASSES",
        "CIDROY_STORE_ENDPOINT",
        "CIDROY_SAVE_RETRIES",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "db_path": "clips_prod.db",
            "source": {
                "url": "stub://lobby",
                "width": 320,
                "height": 240,
                "warmup_polls": 2
            },
            "classifier": {
                "backend": "scripted",
                "threshold": 0.5
            },
            "rule": {
                "object_classes": ["bottle", "can"],
                "min_confidence": 0.4
            },
            "timing": {
                "sample_interval_ms": 2000,
                "capture_ms": 4000
            },
            "store": {
                "save_retries": 1
            }
        }"#,
    );

    std::env::set_var("CIDROY_CONFIG", file.path());
    std::env::set_var("CIDROY_CAPTURE_MS", "6000");
    std::env::set_var("CIDROY_OBJECT_CLASSES", "cup, wrapper");
    std::env::set_var("CIDROY_SAVE_RETRIES", "3");

    let cfg = DetectorConfig::load().expect("load config");

    assert_eq!(cfg.db_path, "clips_prod.db");
    assert_eq!(cfg.source.url, "stub://lobby");
    assert_eq!(cfg.source.width, 320);
    assert_eq!(cfg.source.height, 240);
    assert_eq!(cfg.source.warmup_polls, 2);
    assert_eq!(cfg.classifier.threshold, 0.5);
    assert_eq!(cfg.rule.object_classes, vec!["cup", "wrapper"]);
    assert_eq!(cfg.rule.min_confidence, 0.4);
    assert_eq!(cfg.timing.sample_interval, Duration::from_millis(2000));
    assert_eq!(cfg.timing.capture, Duration::from_millis(6000));
    assert_eq!(cfg.store.kind, StoreKind::Sqlite);
    assert_eq!(cfg.store.save_retries, 3);

    let settings = cfg.loop_settings();
    assert_eq!(settings.sample_interval_ms, 2000);
    assert_eq!(settings.capture_ms, 6000);
    let rule = cfg.capture_rule().expect("rule");
    let objects: Vec<&str> = rule.object_classes().collect();
    assert_eq!(objects, vec!["cup", "wrapper"]);

    clear_env();
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = DetectorConfig::load().expect("load defaults");
    assert_eq!(cfg.db_path, "cidroy.db");
    assert_eq!(cfg.source.url, "stub://webcam");
    assert_eq!(cfg.classifier.backend, "scripted");
    assert_eq!(cfg.timing.sample_interval, Duration::from_secs(3));
    assert_eq!(cfg.timing.capture, Duration::from_secs(5));
    assert_eq!(cfg.store.kind, StoreKind::Sqlite);
    assert_eq!(cfg.mime_type, "video/webm");
}

#[test]
fn store_endpoint_env_selects_http_store() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("CIDROY_STORE_ENDPOINT", "https://clips.example.org/upload");
    let cfg = DetectorConfig::load().expect("load config");
    assert_eq!(cfg.store.kind, StoreKind::Http);
    assert_eq!(
        cfg.store.endpoint.as_deref(),
        Some("https://clips.example.org/upload")
    );

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("CIDROY_SAMPLE_INTERVAL_MS", "soon");
    assert!(DetectorConfig::load().is_err());
    clear_env();

    std::env::set_var("CIDROY_CAPTURE_MS", "0");
    assert!(DetectorConfig::load().is_err());
    clear_env();

    let http_without_endpoint = write_config(r#"{"store": {"kind": "http"}}"#);
    assert!(DetectorConfig::load_from(Some(http_without_endpoint.path())).is_err());

    let empty_objects = write_config(r#"{"rule": {"object_classes": []}}"#);
    assert!(DetectorConfig::load_from(Some(empty_objects.path())).is_err());

    let malformed = write_config("{ not json");
    assert!(DetectorConfig::load_from(Some(malformed.path())).is_err());

    clear_env();
}
