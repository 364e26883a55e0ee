//! Front-end configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use directories::ProjectDirs;
use pulse_loopback_pactl::{CommandWrapper, DEFAULT_PROGRAM, ProcessRunner};
use serde::{Deserialize, Serialize};

/// Environment variable holding a whitespace-separated shell wrapper.
pub const ENV_COMMAND_WRAPPER: &str = "PULSE_LOOPBACK_COMMAND_WRAPPER";

/// Front-end configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,
    /// How `pactl` is invoked
    #[serde(default)]
    pub pactl: PactlConfig,
    /// Settings for new links
    #[serde(default)]
    pub links: LinksConfig,
    /// Settings for `watch`
    #[serde(default)]
    pub watch: WatchConfig,
    /// File the configuration was read from, if any
    #[serde(skip)]
    pub path: Option<PathBuf>,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self { log_level: default_log_level() }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// `pactl` invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PactlConfig {
    /// Control utility to run
    #[serde(default = "default_program")]
    pub program: String,
    /// Command that wraps every invocation, e.g. `["bash", "-c"]`
    #[serde(default)]
    pub command_wrapper: Option<Vec<String>>,
}

impl Default for PactlConfig {
    fn default() -> Self {
        Self { program: default_program(), command_wrapper: None }
    }
}

fn default_program() -> String {
    DEFAULT_PROGRAM.to_string()
}

/// Settings for new loopback links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinksConfig {
    /// Loopback latency in milliseconds
    #[serde(default = "default_latency_msec")]
    pub latency_msec: u32,
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self { latency_msec: default_latency_msec() }
    }
}

fn default_latency_msec() -> u32 {
    20
}

/// Settings for the polling view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Refresh interval in milliseconds, at least 1
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { refresh_interval_ms: default_refresh_interval_ms() }
    }
}

fn default_refresh_interval_ms() -> u64 {
    2000
}

impl Config {
    /// Pick the shell wrapper.
    ///
    /// The command line flag wins over the environment, which wins over the
    /// configuration file. An empty flag or variable disables wrapping.
    #[must_use]
    pub fn command_wrapper(&self, flag: Option<&str>, env: Option<&str>) -> Option<CommandWrapper> {
        match flag.or(env) {
            Some(spec) => CommandWrapper::parse(spec),
            None => self.pactl.command_wrapper.clone().and_then(CommandWrapper::new),
        }
    }

    /// Check values that deserialize but cannot be used.
    ///
    /// # Errors
    /// Returns an error if the refresh interval is zero.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.watch.refresh_interval_ms > 0, "watch.refresh_interval_ms must be at least 1");
        Ok(())
    }

    /// Build the process runner for this configuration.
    #[must_use]
    pub fn runner(&self, program: Option<&str>, wrapper: Option<CommandWrapper>) -> ProcessRunner {
        ProcessRunner::new(program.unwrap_or(&self.pactl.program), wrapper)
    }
}

/// Load configuration from `path`, or from the default location.
///
/// A missing file at the default location yields the defaults, with no
/// [`Config::path`]; a missing explicit file is an error.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let default = config_path()?;
            if !default.exists() {
                return Ok(Config::default());
            }
            default
        }
    };

    let content = std::fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config file: {config_path:?}"))?;
    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {config_path:?}"))?;
    config.validate().with_context(|| format!("Invalid config file: {config_path:?}"))?;
    config.path = Some(config_path);
    Ok(config)
}

/// Get the configuration file path.
fn config_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("org", "pulse-loopback", "pulse-loopback")
        .context("Could not determine config directory")?;
    Ok(dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.general.log_level, "warn");
        assert_eq!(config.pactl.program, "pactl");
        assert!(config.pactl.command_wrapper.is_none());
        assert_eq!(config.links.latency_msec, 20);
        assert_eq!(config.watch.refresh_interval_ms, 2000);
        assert!(config.path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_full_file() {
        let file = write_config(
            r#"
[general]
log_level = "debug"

[pactl]
program = "/usr/bin/pactl"
command_wrapper = ["flatpak-spawn", "--host", "sh", "-c"]

[links]
latency_msec = 50

[watch]
refresh_interval_ms = 500
"#,
        );

        let config = load_config(Some(file.path())).unwrap();

        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.pactl.program, "/usr/bin/pactl");
        assert_eq!(config.links.latency_msec, 50);
        assert_eq!(config.watch.refresh_interval_ms, 500);
        assert_eq!(config.path.as_deref(), Some(file.path()));
        let wrapper = config.command_wrapper(None, None).unwrap();
        assert_eq!(wrapper.words(), ["flatpak-spawn", "--host", "sh", "-c"]);
    }

    #[test]
    fn test_load_partial_file_fills_defaults() {
        let file = write_config("[links]\nlatency_msec = 5\n");

        let config = load_config(Some(file.path())).unwrap();

        assert_eq!(config.links.latency_msec, 5);
        assert_eq!(config.pactl.program, "pactl");
        assert_eq!(config.watch.refresh_interval_ms, 2000);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();

        assert!(load_config(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_invalid_file_is_error() {
        let file = write_config("[links]\nlatency_msec = \"soon\"\n");

        assert!(load_config(Some(file.path())).is_err());
    }

    #[test]
    fn test_zero_refresh_interval_is_error() {
        let file = write_config("[watch]\nrefresh_interval_ms = 0\n");

        let err = load_config(Some(file.path())).unwrap_err();

        assert!(format!("{err:#}").contains("refresh_interval_ms"));
    }

    #[test]
    fn test_command_wrapper_precedence() {
        let mut config = Config::default();
        config.pactl.command_wrapper = Some(vec!["bash".to_string(), "-c".to_string()]);

        let from_file = config.command_wrapper(None, None).unwrap();
        assert_eq!(from_file.words(), ["bash", "-c"]);

        let from_env = config.command_wrapper(None, Some("sh -c")).unwrap();
        assert_eq!(from_env.words(), ["sh", "-c"]);

        let from_flag = config.command_wrapper(Some("toolbox run sh -c"), Some("sh -c")).unwrap();
        assert_eq!(from_flag.words(), ["toolbox", "run", "sh", "-c"]);

        assert!(config.command_wrapper(Some(""), None).is_none());
    }

    #[test]
    fn test_runner_program_override() {
        let config = Config::default();

        assert_eq!(config.runner(None, None).program(), "pactl");
        assert_eq!(config.runner(Some("/opt/pactl"), None).program(), "/opt/pactl");
    }
}
