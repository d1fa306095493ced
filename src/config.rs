use std::path::Path;

use chrono::NaiveTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub alerts: AlertSettings,
    pub database: DatabaseConfig,
}

/// User-tunable alert thresholds. Loaded once per analysis run and never
/// mutated by the engine.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AlertSettings {
    /// Master switch; when false every invoice analyzes to level `none`.
    pub enabled: bool,
    /// High-amount rule threshold. Zero disables the rule.
    pub high_amount_threshold: Decimal,
    /// Unknown-counterparty rule threshold. Zero disables the rule.
    pub unknown_counterparty_threshold: Decimal,
    pub unusual_hours: UnusualHoursConfig,
    pub duplicates: DuplicateConfig,
    pub round_amounts: RoundAmountConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct UnusualHoursConfig {
    pub enabled: bool,
    /// Start of business hours, "HH:MM".
    pub start: String,
    /// End of business hours, "HH:MM", inclusive.
    pub end: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DuplicateConfig {
    pub enabled: bool,
    pub window_days: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RoundAmountConfig {
    pub enabled: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            alerts: AlertSettings::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            high_amount_threshold: Decimal::from(10_000),
            unknown_counterparty_threshold: Decimal::from(5_000),
            unusual_hours: UnusualHoursConfig::default(),
            duplicates: DuplicateConfig::default(),
            round_amounts: RoundAmountConfig::default(),
        }
    }
}

impl Default for UnusualHoursConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            start: "06:00".into(),
            end: "22:00".into(),
        }
    }
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_days: 7,
        }
    }
}

impl Default for RoundAmountConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/registry.db".into(),
        }
    }
}

impl UnusualHoursConfig {
    /// Window bounds as minutes since midnight, or `None` if either bound is
    /// unparseable (the rule then abstains). A start later than the end makes
    /// the inside set empty; the comparison does not wrap past midnight.
    pub fn window_minutes(&self) -> Option<(u32, u32)> {
        let parse = |s: &str| -> Option<u32> {
            let t = NaiveTime::parse_from_str(s, "%H:%M").ok()?;
            use chrono::Timelike;
            Some(t.hour() * 60 + t.minute())
        };
        Some((parse(&self.start)?, parse(&self.end)?))
    }
}

impl Config {
    /// Load config from a TOML file. Falls back to defaults if the file is
    /// missing or malformed.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("Config file {} not found, using defaults", path.display());
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Config loaded from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Persist the current settings as TOML.
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let contents = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_enabled_with_documented_thresholds() {
        let settings = AlertSettings::default();
        assert!(settings.enabled);
        assert_eq!(settings.high_amount_threshold, Decimal::from(10_000));
        assert_eq!(settings.unknown_counterparty_threshold, Decimal::from(5_000));
        assert_eq!(settings.duplicates.window_days, 7);
        assert!(settings.round_amounts.enabled);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load("/nonexistent/fraudradar.toml");
        assert_eq!(config.alerts, AlertSettings::default());
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join(format!(
            "fraudradar_cfg_bad_{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "alerts = not toml [").unwrap();
        let config = Config::load(&path);
        assert_eq!(config.alerts, AlertSettings::default());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let path = std::env::temp_dir().join(format!(
            "fraudradar_cfg_partial_{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[alerts]\nhigh_amount_threshold = \"2500\"\n").unwrap();
        let config = Config::load(&path);
        assert_eq!(config.alerts.high_amount_threshold, Decimal::from(2_500));
        assert_eq!(config.alerts.duplicates.window_days, 7);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn save_then_load_roundtrip() {
        let path = std::env::temp_dir().join(format!(
            "fraudradar_cfg_rt_{}.toml",
            std::process::id()
        ));
        let mut config = Config::default();
        config.alerts.duplicates.window_days = 3;
        config.alerts.unusual_hours.start = "08:00".into();
        config.save(&path).unwrap();
        let loaded = Config::load(&path);
        assert_eq!(loaded.alerts, config.alerts);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn window_minutes_parses_bounds() {
        let cfg = UnusualHoursConfig::default();
        assert_eq!(cfg.window_minutes(), Some((360, 1320)));

        let bad = UnusualHoursConfig {
            enabled: true,
            start: "6am".into(),
            end: "22:00".into(),
        };
        assert_eq!(bad.window_minutes(), None);
    }
}
