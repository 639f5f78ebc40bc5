use std::path::Path;

use codecell::config::{Config, ConfigError};

use super::FIXTURES_PATH;

fn load(name: &str) -> Result<Config, ConfigError> {
    Config::from_file(format!("{FIXTURES_PATH}/configs/{name}"))
}

#[test]
fn test_load_valid_config() {
    let config = load("valid_full.toml").expect("Failed to load config");

    assert!(config.languages.contains_key("python"));
    assert!(config.languages.contains_key("rust"));
    assert_eq!(config.default_limits.wall_time_limit, Some(2.0));
    assert_eq!(config.container_workdir, "/workspace");
    assert!(config.pull_missing_images);

    let python = config.get_language("python3").unwrap();
    assert_eq!(python.command(), ["python", "-u", "main.py"]);

    let rust = config.get_language("rust").unwrap();
    let limits = config.effective_limits(rust, None);
    assert_eq!(limits.wall_time_limit, Some(20.0));
    assert_eq!(limits.memory_limit, Some(512));
    assert_eq!(limits.cpus, Some(0.5));
}

#[test]
fn test_load_minimal_config() {
    let config = load("valid_minimal.toml").expect("Failed to load config");

    assert!(config.languages.contains_key("shell"));
    assert_eq!(config.container_workdir, "/usr/src/app");
    assert_eq!(config.default_limits.memory_limit, Some(256));
}

#[test]
fn test_load_invalid_empty_name() {
    assert!(load("invalid_empty_name.toml").is_err());
}

#[test]
fn test_load_invalid_empty_run_command() {
    assert!(load("invalid_empty_run_command.toml").is_err());
}

#[test]
fn test_load_invalid_entry_file() {
    assert!(load("invalid_entry_file.toml").is_err());
}

#[test]
fn test_load_invalid_alias_collision() {
    assert!(matches!(
        load("invalid_alias_collision.toml"),
        Err(ConfigError::Invalid(_))
    ));
}

#[test]
fn test_load_invalid_relative_workdir() {
    assert!(matches!(
        load("invalid_relative_workdir.toml"),
        Err(ConfigError::Invalid(_))
    ));
}

#[test]
fn test_layered_load_uses_file_over_defaults() {
    let path = format!("{FIXTURES_PATH}/configs/valid_minimal.toml");
    let config = Config::load(Some(Path::new(&path))).expect("Failed to load config");

    // Embedded languages remain, the file adds its own
    assert!(config.languages.contains_key("python"));
    assert!(config.languages.contains_key("shell"));
}
