//! Integration tests for ConfigManager and configuration file handling
//!
//! These tests verify:
//! - Default configuration when no file exists
//! - Partial, hand-written YAML files
//! - Saving and reloading
//! - Environment overrides
//! - A loaded SessionConfig driving a real session

use camino::Utf8PathBuf;
use quickprompt::config::CONFIG_FILE_NAME;
use quickprompt::{
    AppConfig, ClockSource, ConfigManager, HeadlessToolkit, Session, SubmitPolicy,
};
use std::collections::HashMap;
use std::fs;
use tempfile::TempDir;

fn create_test_config_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, config_path)
}

fn no_env() -> Option<HashMap<String, String>> {
    Some(HashMap::new())
}

#[test]
fn test_create_config_manager() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    assert_eq!(manager.config_dir(), &config_path);
    assert_eq!(manager.config_path(), config_path.join(CONFIG_FILE_NAME));
}

#[test]
fn test_creates_missing_directory() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let nested = config_path.join("QuickPrompt Data");

    ConfigManager::new(&nested).unwrap();

    assert!(nested.is_dir());
}

#[test]
fn test_load_defaults_without_file() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let config = manager.load_with_env(no_env()).unwrap();

    assert_eq!(config, AppConfig::default());
    assert_eq!(config.session.submit_policy, SubmitPolicy::FirstWins);
    assert!(config.session.start_disabled);
}

#[test]
fn test_load_partial_file() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let yaml = r#"
session:
  title: "Reaction test"
  submit_policy: last_wins
  clock: monotonic
logging:
  debug_mode: true
"#;
    fs::write(manager.config_path(), yaml).unwrap();

    let config = manager.load_with_env(no_env()).unwrap();

    assert_eq!(config.session.title, "Reaction test");
    assert_eq!(config.session.submit_policy, SubmitPolicy::LastWins);
    assert_eq!(config.session.clock, ClockSource::Monotonic);
    assert!(config.logging.debug_mode);
    // Untouched keys keep their defaults
    assert_eq!(config.session.min_width, 700);
    assert_eq!(config.logging.log_prefix, "quickprompt");
}

#[test]
fn test_invalid_file_is_an_error() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    fs::write(manager.config_path(), "session:\n  submit_policy: sometimes\n").unwrap();

    assert!(manager.load_with_env(no_env()).is_err());
}

#[test]
fn test_save_and_reload() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let mut config = AppConfig::default();
    config.session.min_height = 250;
    config.session.close_when_logic_exits = false;
    config.logging.console = false;
    manager.save(&config).unwrap();

    let content = fs::read_to_string(manager.config_path()).unwrap();
    assert!(content.contains("min_height: 250"));

    let reloaded = manager.load_with_env(no_env()).unwrap();
    assert_eq!(reloaded, config);
}

#[test]
fn test_environment_beats_file() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();
    fs::write(manager.config_path(), "session:\n  title: from file\n").unwrap();

    let env = HashMap::from([
        ("QUICKPROMPT_SESSION__TITLE".to_string(), "from env".to_string()),
        (
            "QUICKPROMPT_SESSION__START_DISABLED".to_string(),
            "false".to_string(),
        ),
    ]);
    let config = manager.load_with_env(Some(env)).unwrap();

    assert_eq!(config.session.title, "from env");
    assert!(!config.session.start_disabled);
}

#[test]
fn test_loaded_config_drives_session() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();
    fs::write(
        manager.config_path(),
        "session:\n  title: Configured\n  min_width: 320\n  min_height: 200\n",
    )
    .unwrap();
    let config = manager.load_with_env(no_env()).unwrap();

    let toolkit = HeadlessToolkit::new();
    let probe = toolkit.probe();
    let title = Session::new(toolkit, config.session)
        .run(|_| Ok(()), |handle| Ok(handle.config().title.clone()))
        .unwrap();

    assert_eq!(title, "Configured");
    assert_eq!(probe.title(), "Configured");
    assert_eq!(probe.min_size(), (320, 200));
}
