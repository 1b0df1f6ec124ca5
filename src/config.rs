use crate::date_range::CivilClock;
use crate::runner::RetryPolicy;
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown timezone `{0}`")]
    UnknownTimezone(String),

    #[error("set either clock.timezone or clock.fixed_shift_hours, not both")]
    AmbiguousClock,
}

/// Everything one run needs besides the report catalog. Every field has a
/// default so an empty file is a valid config.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Directory holding `<resource>.csv` exports for the file source.
    pub source_dir: PathBuf,
    pub output: OutputConfig,
    pub clock: ClockConfig,
    pub retry: RetryConfig,
    /// Catalog keys to run; empty means all of them.
    pub reports: Vec<String>,
    pub summary_path: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            source_dir: PathBuf::from("exports"),
            output: OutputConfig::default(),
            clock: ClockConfig::default(),
            retry: RetryConfig::default(),
            reports: Vec::new(),
            summary_path: None,
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = toml::from_str(content)?;
        // Surface clock mistakes at load time rather than mid-run.
        config.clock.civil_clock()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    #[default]
    Csv,
    Xlsx,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub kind: OutputKind,
    /// Directory for `csv`, workbook file for `xlsx`.
    pub path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            kind: OutputKind::Csv,
            path: PathBuf::from("out"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ClockConfig {
    /// IANA zone name; `Asia/Tokyo` when neither field is set.
    pub timezone: Option<String>,
    /// Compatibility mode: shift UTC by this many hours and take the date.
    pub fixed_shift_hours: Option<i64>,
}

impl ClockConfig {
    pub fn civil_clock(&self) -> Result<CivilClock, ConfigError> {
        match (&self.timezone, self.fixed_shift_hours) {
            (Some(_), Some(_)) => Err(ConfigError::AmbiguousClock),
            (None, Some(hours)) => Ok(CivilClock::FixedShift(hours)),
            (Some(name), None) => name
                .parse::<Tz>()
                .map(CivilClock::Zoned)
                .map_err(|_| ConfigError::UnknownTimezone(name.clone())),
            (None, None) => Ok(CivilClock::default()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let p = RetryPolicy::default();
        RetryConfig {
            max_attempts: p.max_attempts,
            base_delay_ms: p.base_delay.as_millis() as u64,
            max_delay_ms: p.max_delay.as_millis() as u64,
            multiplier: p.multiplier,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
        }
    }
}
