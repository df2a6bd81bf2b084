//! Unit tests for configuration resolution and graceful degradation
//!
//! Covers:
//! - Missing config files fall back to compiled defaults
//! - Malformed config files are reported, not ignored
//! - Config path priority (CLI argument → environment → platform default)
//!
//! Tests that touch TCA_* environment variables are marked #[serial] so they
//! never run in parallel with each other.

use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::PathBuf;
use tca_common::config::{resolve_config_path, TomlConfig, CONFIG_ENV_VAR};
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_full_config() {
    let file = write_config(
        r#"
        output_dir = "/var/tmp/campaigns"
        default_regions = ["US", "FR"]

        [logging]
        level = "debug"

        [policy]
        duration_weeks = 8
        "#,
    );

    let config = TomlConfig::load(file.path()).unwrap();
    assert_eq!(config.output_dir, PathBuf::from("/var/tmp/campaigns"));
    assert_eq!(config.default_regions, vec!["US", "FR"]);
    assert_eq!(config.logging.level, "debug");
    assert!(config.policy.contains_key("duration_weeks"));
}

#[test]
fn test_malformed_config_is_an_error() {
    let file = write_config("output_dir = [unterminated");
    let err = TomlConfig::load(file.path()).unwrap_err();
    assert!(err.to_string().contains("Configuration error"));
}

#[test]
#[serial]
fn test_missing_file_falls_back_to_defaults() {
    env::remove_var(CONFIG_ENV_VAR);
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");

    let config = TomlConfig::load_or_default(Some(&missing)).unwrap();
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.output_dir, PathBuf::from("outputs"));
}

#[test]
#[serial]
fn test_env_var_used_when_no_cli_arg() {
    env::set_var(CONFIG_ENV_VAR, "/etc/tca/custom.toml");
    let path = resolve_config_path(None);
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(path, Some(PathBuf::from("/etc/tca/custom.toml")));
}

#[test]
#[serial]
fn test_cli_arg_beats_env_var() {
    env::set_var(CONFIG_ENV_VAR, "/etc/tca/custom.toml");
    let cli = PathBuf::from("/home/user/tca.toml");
    let path = resolve_config_path(Some(&cli));
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(path, Some(cli));
}

#[test]
#[serial]
fn test_load_or_default_reads_env_path() {
    let file = write_config("[logging]\nlevel = \"warn\"\n");
    env::set_var(CONFIG_ENV_VAR, file.path());
    let config = TomlConfig::load_or_default(None);
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(config.unwrap().logging.level, "warn");
}

