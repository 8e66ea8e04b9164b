//! Loading `.ignore/config.yaml` from a real folder

use core_runtime::config::{AgentConfig, CONFIG_FILE, CONTROL_DIR};
use core_runtime::Error;
use std::fs;
use tempfile::TempDir;

const CONFIG: &str = r#"
database: agent
network:
  host: localhost
  port: "8000"
minio:
  host: localhost
  port: 9000
  id: agent
  password: s3cret
  bucket: shared
sync:
  debounce_ms: 250
  ignore:
    - "*.swp"
"#;

#[test]
fn test_load_from_control_directory() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join(CONTROL_DIR)).unwrap();
    fs::write(dir.path().join(CONTROL_DIR).join(CONFIG_FILE), CONFIG).unwrap();

    let config = AgentConfig::load(dir.path()).unwrap();

    assert_eq!(config.root, dir.path());
    assert_eq!(
        config.database_path,
        dir.path().join(CONTROL_DIR).join("agent.db")
    );
    assert_eq!(config.metadata_service.port, 8000);
    assert_eq!(config.sync.debounce_ms, 250);
    assert_eq!(config.sync.ignore, vec!["*.swp".to_string()]);
}

#[test]
fn test_missing_control_directory() {
    let dir = TempDir::new().unwrap();

    let err = AgentConfig::load(dir.path()).unwrap_err();
    assert!(err.to_string().contains("ignore folder"));
}

#[test]
fn test_missing_config_file() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join(CONTROL_DIR)).unwrap();

    let err = AgentConfig::load(dir.path()).unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
}

#[test]
fn test_missing_root() {
    let dir = TempDir::new().unwrap();

    let err = AgentConfig::load(dir.path().join("absent")).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}
