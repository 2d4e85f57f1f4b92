//! Tests for sync configuration loading.

use super::*;
use serial_test::serial;
use tempfile::TempDir;

fn write_config(dir: &TempDir, yaml: &str) -> PathBuf {
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, yaml).expect("write config");
    path
}

#[test]
fn test_defaults() {
    let config = SyncConfig::default();
    assert_eq!(config.retry.max_retries, 3);
    assert_eq!(config.retry.backoff_base_ms, 500);
    assert_eq!(config.remote.timeout_secs, 15);
    assert!(config.journal.path.is_none());
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_yaml_fills_defaults() {
    let yaml = r#"
retry:
  backoff_base_ms: 50
remote:
  base_url: "https://sync.example.test"
"#;
    let config: SyncConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.retry.backoff_base_ms, 50);
    assert_eq!(config.retry.max_retries, 3);
    assert_eq!(config.remote.base_url, "https://sync.example.test");
    assert_eq!(config.remote.timeout_secs, 15);
}

#[test]
fn test_unknown_top_level_key_fails_to_parse() {
    let yaml = r#"
retries:
  max_retries: 2
"#;
    let result: Result<SyncConfig, _> = serde_yaml::from_str(yaml);
    assert!(result.is_err());
}

#[test]
fn test_load_validates() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_config(
        &dir,
        r#"
retry:
  jitter: 2.0
"#,
    );
    let err = SyncConfig::load(&path).expect_err("invalid jitter");
    assert!(err.to_string().contains("jitter"));
}

#[test]
fn test_load_reports_missing_file() {
    let err = SyncConfig::load(Path::new("/nonexistent/workout-sync.yaml"))
        .expect_err("missing file");
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn test_zero_timeout_rejected() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_config(
        &dir,
        r#"
remote:
  timeout_secs: 0
"#,
    );
    assert!(SyncConfig::load(&path).is_err());
}

#[test]
#[serial]
fn test_resolve_prefers_explicit_path_over_env() {
    let dir = TempDir::new().expect("temp dir");
    let explicit = write_config(&dir, "retry:\n  max_retries: 5\n");
    let env_dir = TempDir::new().expect("temp dir");
    let env_path = write_config(&env_dir, "retry:\n  max_retries: 7\n");

    std::env::set_var(CONFIG_ENV_VAR, &env_path);
    let config = SyncConfig::resolve(Some(&explicit)).expect("resolve");
    std::env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(config.retry.max_retries, 5);
}

#[test]
#[serial]
fn test_resolve_uses_env_var() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_config(&dir, "journal:\n  path: /tmp/sync.jsonl\n");

    std::env::set_var(CONFIG_ENV_VAR, &path);
    let config = SyncConfig::resolve(None).expect("resolve");
    std::env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(config.journal.path, Some(PathBuf::from("/tmp/sync.jsonl")));
}
