//! Configuration for the `reopen-logger` binary

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::level::check_level;
use crate::logger::{Logger, LoggerBuilder};
use crate::signal::ReopenSource;

/// Environment variable overriding the config file location
pub const CONFIG_ENV_VAR: &str = "REOPEN_LOGGER_CONFIG";

/// Logger configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Log file; standard output when unset
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Initial level threshold (default: "warn")
    #[serde(default = "default_level")]
    pub level: String,

    /// Buffer lines in memory and flush periodically
    #[serde(default)]
    pub buffered: bool,

    /// Seconds between automatic flushes of a buffered file (default: 10)
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    /// Reopen the log file on SIGHUP (default: true)
    #[serde(default = "default_reopen_on_hangup")]
    pub reopen_on_hangup: bool,

    /// Copy warn and higher lines to standard error
    #[serde(default)]
    pub errors_to_stderr: bool,
}

fn default_level() -> String {
    "warn".to_string()
}

fn default_flush_interval_secs() -> u64 {
    10
}

fn default_reopen_on_hangup() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: None,
            level: default_level(),
            buffered: false,
            flush_interval_secs: default_flush_interval_secs(),
            reopen_on_hangup: default_reopen_on_hangup(),
            errors_to_stderr: false,
        }
    }
}

impl Config {
    /// Load configuration from the default location, or defaults if absent
    pub fn load() -> Result<Self> {
        match config_file_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load and validate configuration from `path`
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        check_level(&self.level)?;
        if self.buffered && self.flush_interval_secs == 0 {
            anyhow::bail!("flush_interval_secs must be greater than zero");
        }
        Ok(())
    }

    /// Builder reflecting this configuration
    pub fn builder(&self) -> LoggerBuilder {
        let builder = Logger::builder().level(self.level.clone());
        let builder = if self.errors_to_stderr {
            builder.error_writer(std::io::stderr())
        } else {
            builder
        };

        let builder = match &self.path {
            None => return builder.writer(std::io::stdout()),
            Some(path) if self.buffered => builder
                .buffered_file(path)
                .flush_interval(Duration::from_secs(self.flush_interval_secs)),
            Some(path) => builder.file(path),
        };

        if self.reopen_on_hangup {
            builder.reopen_source(ReopenSource::default())
        } else {
            builder.reopen_source(ReopenSource::Never)
        }
    }

    /// Build the logger this configuration describes
    pub fn build_logger(&self) -> Result<Logger> {
        self.builder().build().context("Failed to create logger")
    }
}

/// Location of the config file: `$REOPEN_LOGGER_CONFIG`, else
/// `<config dir>/reopen-logger/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|d| d.join("reopen-logger").join("config.toml"))
}
