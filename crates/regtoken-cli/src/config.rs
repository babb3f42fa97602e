//! Environment configuration for the `regtoken` binary.
//!
//! Variables:
//! - `REGTOKEN_LOG_FORMAT`: `text` (default) or `json`.
//! - `REGTOKEN_NOW`: epoch seconds pinning the verification clock at the
//!   start of a replay. Takes precedence over a scenario's `start`.
//!
//! Log filtering itself is read by `tracing-subscriber` from `RUST_LOG`.

use std::str::FromStr;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::InvalidLogFormat(s.to_string())),
        }
    }
}

/// Settings read from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliConfig {
    pub log_format: LogFormat,
    /// Clock override in epoch seconds.
    pub now: Option<i64>,
}

impl CliConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let log_format = match lookup("REGTOKEN_LOG_FORMAT") {
            Some(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => LogFormat::Text,
        };
        let now = match lookup("REGTOKEN_NOW") {
            Some(raw) if !raw.trim().is_empty() => Some(
                raw.trim()
                    .parse::<i64>()
                    .map_err(|_| ConfigError::InvalidNow(raw.clone()))?,
            ),
            _ => None,
        };
        Ok(Self { log_format, now })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("REGTOKEN_LOG_FORMAT must be `text` or `json`, got `{0}`")]
    InvalidLogFormat(String),
    #[error("REGTOKEN_NOW must be integer epoch seconds, got `{0}`")]
    InvalidNow(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let cfg = CliConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, CliConfig::default());
        assert_eq!(cfg.log_format, LogFormat::Text);
        assert!(cfg.now.is_none());
    }

    #[test]
    fn test_reads_format_and_clock() {
        let cfg = CliConfig::from_lookup(lookup(&[
            ("REGTOKEN_LOG_FORMAT", "JSON"),
            ("REGTOKEN_NOW", "1700000000"),
        ]))
        .unwrap();
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.now, Some(1_700_000_000));
    }

    #[test]
    fn test_blank_values_fall_back() {
        let cfg = CliConfig::from_lookup(lookup(&[("REGTOKEN_LOG_FORMAT", ""), ("REGTOKEN_NOW", " ")])).unwrap();
        assert_eq!(cfg, CliConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert_eq!(
            CliConfig::from_lookup(lookup(&[("REGTOKEN_LOG_FORMAT", "xml")])).unwrap_err(),
            ConfigError::InvalidLogFormat("xml".to_string())
        );
        assert_eq!(
            CliConfig::from_lookup(lookup(&[("REGTOKEN_NOW", "yesterday")])).unwrap_err(),
            ConfigError::InvalidNow("yesterday".to_string())
        );
    }
}
