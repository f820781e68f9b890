use dataprobe_core::{load_config, DataProbeError, ProbeConfig};
use std::env;
use std::fs;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::tempdir;

// Every load reads the process environment, so loads must not overlap with
// tests that set DATAPROBE_* variables
static ENV_MUTEX: Mutex<()> = Mutex::new(());

#[test]
fn test_defaults_without_file() {
    let _guard = ENV_MUTEX.lock().unwrap();

    let cfg = load_config(None).unwrap();
    assert_eq!(cfg, ProbeConfig::default());
    assert_eq!(cfg.poll_interval(), Duration::from_millis(1000));
    assert_eq!(cfg.max_poll_attempts, Some(3600));
}

#[test]
fn test_file_overrides_defaults() {
    let _guard = ENV_MUTEX.lock().unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("dataprobe.toml");
    fs::write(
        &path,
        r#"
base_url = "http://analysis.internal:9000"
poll_interval_ms = 250
preview_page_size = 25
"#,
    )
    .unwrap();

    let cfg = load_config(Some(&path)).unwrap();
    assert_eq!(cfg.base_url, "http://analysis.internal:9000");
    assert_eq!(cfg.poll_interval(), Duration::from_millis(250));
    assert_eq!(cfg.preview_page_size, 25);
    // Untouched keys keep their defaults
    assert_eq!(cfg.request_timeout(), Duration::from_secs(30));
}

#[test]
fn test_missing_file_is_configuration_error() {
    let _guard = ENV_MUTEX.lock().unwrap();

    let dir = tempdir().unwrap();
    let err = load_config(Some(&dir.path().join("absent.toml"))).unwrap_err();
    assert!(matches!(err, DataProbeError::Configuration(ref m) if m.contains("not found")));
}

#[test]
fn test_invalid_values_rejected() {
    let _guard = ENV_MUTEX.lock().unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("dataprobe.toml");
    fs::write(&path, "preview_page_size = 0\n").unwrap();

    let err = load_config(Some(&path)).unwrap_err();
    assert!(matches!(err, DataProbeError::Configuration(_)));
}

#[test]
fn test_environment_overrides_file() {
    let _guard = ENV_MUTEX.lock().unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("dataprobe.toml");
    fs::write(&path, "poll_interval_ms = 250\n").unwrap();

    env::set_var("DATAPROBE_POLL_INTERVAL_MS", "500");
    env::set_var("DATAPROBE_LOG_JSON", "true");
    let result = load_config(Some(&path));
    env::remove_var("DATAPROBE_POLL_INTERVAL_MS");
    env::remove_var("DATAPROBE_LOG_JSON");

    let cfg = result.unwrap();
    assert_eq!(cfg.poll_interval_ms, 500);
    assert!(cfg.log_json);
}
