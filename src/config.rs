// src/config.rs

use crate::core::classifier::RiskThresholds;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;
use tracing::level_filters::LevelFilter;

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub oracle_url: String,
    pub poll_interval_ms: u64,
    pub window_capacity: usize,
    pub request_timeout_ms: u64,
    // Degraded upstream answers with price=1.0 instead of failing. The fallback
    // reuses the last real round timestamp so later rounds are not dropped as stale.
    pub fallback_on_error: bool,
}

impl FeedConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RiskPreset {
    Strict,
    Relaxed,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RiskConfig {
    pub preset: RiskPreset,
    pub low_ceiling: Option<f64>,
    pub medium_ceiling: Option<f64>,
    pub min_samples: usize,
}

impl RiskConfig {
    /// Explicit ceilings win over the named preset; both must be given together.
    pub fn thresholds(&self) -> Result<RiskThresholds, ConfigError> {
        match (self.low_ceiling, self.medium_ceiling) {
            (Some(low), Some(medium)) => RiskThresholds::new(low, medium)
                .ok_or_else(|| {
                    ConfigError::Message(format!(
                        "risk ceilings must satisfy 0 < low < medium (got {} / {})",
                        low, medium
                    ))
                }),
            (None, None) => Ok(match self.preset {
                RiskPreset::Strict => RiskThresholds::STRICT,
                RiskPreset::Relaxed => RiskThresholds::RELAXED,
            }),
            _ => Err(ConfigError::Message(
                "risk.low_ceiling and risk.medium_ceiling must be set together".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MarkSource {
    Feed,
    Oracle,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TradingConfig {
    pub mark_source: MarkSource,
    pub default_size: f64,
    pub size_step: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WalletConfig {
    pub address: Option<String>,
    pub user_state_url: String,
    pub write_latency_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub state_file: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub directory: String,
    pub file_prefix: String,
    pub level: String,
}

impl LoggingConfig {
    pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
        self.level.parse().map_err(|_| {
            ConfigError::Message(format!(
                "logging.level must be one of off/error/warn/info/debug/trace (got {:?})",
                self.level
            ))
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub feed: FeedConfig,
    pub risk: RiskConfig,
    pub trading: TradingConfig,
    pub wallet: WalletConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let builder = Self::defaults()?
            .add_source(File::with_name("Settings").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn defaults() -> Result<config::builder::ConfigBuilder<config::builder::DefaultState>, ConfigError>
    {
        Config::builder()
            .set_default("feed.oracle_url", "http://localhost:3000/api/fxrp-price")?
            .set_default("feed.poll_interval_ms", 5000)?
            .set_default("feed.window_capacity", 50)?
            .set_default("feed.request_timeout_ms", 3000)?
            .set_default("feed.fallback_on_error", false)?
            .set_default("risk.preset", "strict")?
            .set_default("risk.min_samples", 5)?
            .set_default("trading.mark_source", "feed")?
            .set_default("trading.default_size", 10.0)?
            .set_default("trading.size_step", 1.0)?
            .set_default(
                "wallet.user_state_url",
                "http://localhost:3000/api/user-state/{address}",
            )?
            .set_default("wallet.write_latency_ms", 1500)?
            .set_default("storage.state_file", "desk_state.json")?
            .set_default("logging.directory", "logs")?
            .set_default("logging.file_prefix", "risk_desk.log")?
            .set_default("logging.level", "info")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.risk.thresholds()?;
        self.logging.level_filter()?;

        if self.feed.window_capacity == 0 {
            return Err(ConfigError::Message(
                "feed.window_capacity must be positive".to_string(),
            ));
        }
        if self.feed.poll_interval_ms == 0 {
            return Err(ConfigError::Message(
                "feed.poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.risk.min_samples > self.feed.window_capacity {
            return Err(ConfigError::Message(format!(
                "risk.min_samples ({}) exceeds feed.window_capacity ({})",
                self.risk.min_samples, self.feed.window_capacity
            )));
        }
        if !(self.trading.size_step > 0.0) || !(self.trading.default_size > 0.0) {
            return Err(ConfigError::Message(
                "trading.default_size and trading.size_step must be positive".to_string(),
            ));
        }
        url::Url::parse(&self.feed.oracle_url)
            .map_err(|e| ConfigError::Message(format!("feed.oracle_url: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn risk(preset: RiskPreset, low: Option<f64>, medium: Option<f64>) -> RiskConfig {
        RiskConfig {
            preset,
            low_ceiling: low,
            medium_ceiling: medium,
            min_samples: 5,
        }
    }

    #[test]
    fn presets_resolve_to_named_thresholds() {
        let strict = risk(RiskPreset::Strict, None, None).thresholds().unwrap();
        assert_eq!(strict, RiskThresholds::STRICT);

        let relaxed = risk(RiskPreset::Relaxed, None, None).thresholds().unwrap();
        assert_eq!(relaxed, RiskThresholds::RELAXED);
    }

    #[test]
    fn explicit_ceilings_override_preset() {
        let t = risk(RiskPreset::Strict, Some(0.002), Some(0.01))
            .thresholds()
            .unwrap();
        assert_eq!(t.low_ceiling(), 0.002);
        assert_eq!(t.medium_ceiling(), 0.01);
    }

    #[test]
    fn inverted_or_partial_ceilings_are_rejected() {
        assert!(risk(RiskPreset::Strict, Some(0.03), Some(0.01))
            .thresholds()
            .is_err());
        assert!(risk(RiskPreset::Strict, Some(0.01), None)
            .thresholds()
            .is_err());
    }

    #[test]
    fn defaults_deserialize_without_settings_file() {
        let cfg: AppConfig = AppConfig::defaults()
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.feed.window_capacity, 50);
        assert_eq!(cfg.feed.poll_interval(), Duration::from_millis(5000));
        assert_eq!(cfg.risk.preset, RiskPreset::Strict);
        assert_eq!(cfg.trading.mark_source, MarkSource::Feed);
        assert!(cfg.wallet.address.is_none());
    }

    #[test]
    fn logging_level_is_validated() {
        let mut cfg: AppConfig = AppConfig::defaults()
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(cfg.logging.level_filter().unwrap(), LevelFilter::INFO);

        cfg.logging.level = "DEBUG".to_string();
        assert_eq!(cfg.logging.level_filter().unwrap(), LevelFilter::DEBUG);

        cfg.logging.level = "loud".to_string();
        assert!(cfg.logging.level_filter().is_err());
        assert!(cfg.validate().is_err());
    }
}
