mod support;

use std::fs;
use std::path::{Path, PathBuf};

use support::with_scoped_env;
use zonecount::config::{ConfigError, CONFIG_ENV_VAR};
use zonecount::AppConfig;

/// Restores the working directory on drop.
struct CwdGuard(PathBuf);

impl Drop for CwdGuard {
    fn drop(&mut self) {
        let _ = std::env::set_current_dir(&self.0);
    }
}

/// Runs `AppConfig::load` from `dir` with `ZONECOUNT_CONFIG` unset.
///
/// The working directory is process-global, so this runs under the same
/// lock as the environment changes.
fn load_from_dir(dir: &Path) -> Result<AppConfig, ConfigError> {
    with_scoped_env(&[(CONFIG_ENV_VAR, None)], || {
        let _guard = CwdGuard(std::env::current_dir().unwrap());
        std::env::set_current_dir(dir).unwrap();
        AppConfig::load()
    })
}

#[test]
fn test_load_reads_file_named_by_env_var() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("site.toml");
    fs::write(
        &path,
        "[zones]\ndebounce_frames = 7\nsynthetic_exit_on_track_loss = false\n\n[forecast]\nmax_periods = 24\n",
    )
    .unwrap();

    let config = with_scoped_env(&[(CONFIG_ENV_VAR, path.to_str())], AppConfig::load).unwrap();
    assert_eq!(config.zones.debounce_frames, 7);
    assert!(!config.zones.synthetic_exit_on_track_loss);
    assert_eq!(config.forecast.max_periods, 24);
    assert_eq!(config.tracker, AppConfig::default().tracker);
}

#[test]
fn test_load_reports_missing_env_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    let result = with_scoped_env(&[(CONFIG_ENV_VAR, path.to_str())], AppConfig::load);
    assert!(matches!(result, Err(ConfigError::Io { .. })));
}

#[test]
fn test_load_rejects_invalid_values_from_env_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[tracker]\nmin_confidence = 2.0\n").unwrap();

    let result = with_scoped_env(&[(CONFIG_ENV_VAR, path.to_str())], AppConfig::load);
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_load_without_any_file_falls_back_to_defaults() {
    let root = tempfile::tempdir().unwrap();
    let cwd = root.path().join("site");
    fs::create_dir(&cwd).unwrap();

    let config = load_from_dir(&cwd).unwrap();
    assert_eq!(config, AppConfig::default());
}

#[test]
fn test_load_uses_zonecount_toml_in_working_directory() {
    let root = tempfile::tempdir().unwrap();
    let cwd = root.path().join("site");
    fs::create_dir(&cwd).unwrap();
    fs::write(cwd.join("zonecount.toml"), "[zones]\ndebounce_frames = 4\n").unwrap();

    let config = load_from_dir(&cwd).unwrap();
    assert_eq!(config.zones.debounce_frames, 4);
}

#[test]
fn test_load_rejects_invalid_zonecount_toml_in_working_directory() {
    let root = tempfile::tempdir().unwrap();
    let cwd = root.path().join("site");
    fs::create_dir(&cwd).unwrap();
    fs::write(cwd.join("zonecount.toml"), "[zones]\ndebounce_frames = 0\n").unwrap();

    let result = load_from_dir(&cwd);
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_default_location_reports_not_found() {
    let root = tempfile::tempdir().unwrap();
    let cwd = root.path().join("site");
    fs::create_dir(&cwd).unwrap();

    let result = with_scoped_env(&[], || {
        let _guard = CwdGuard(std::env::current_dir().unwrap());
        std::env::set_current_dir(&cwd).unwrap();
        AppConfig::from_default_location()
    });
    assert!(matches!(result, Err(ConfigError::NotFound)));
}
