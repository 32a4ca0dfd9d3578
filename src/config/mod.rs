//! Configuration management for FlowGen
//!
//! Loads from YAML files + environment variables via .env

use anyhow::{Context, Result};
use chrono::Utc;
use config::{Config, Environment, File};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub session: SessionCfg,
}

/// Session section of the app configuration
///
/// `seed` and `start_timestamp_ms` are optional: a missing seed means a fresh
/// random one, a missing start means the first millisecond of the current UTC
/// day (one simulated day maps onto the real one).
#[derive(Debug, Clone, Deserialize)]
pub struct SessionCfg {
    /// Opaque seed string; omit for a random session
    pub seed: Option<String>,
    /// First tick price
    pub init_price: f64,
    /// Per-tick volatility
    pub volatility: f64,
    /// Simulated milliseconds between ticks
    pub tick_interval_ms: i64,
    /// Storm windows per simulated day (0 disables storms)
    pub storm_per_cycle: u32,
    /// Peak volatility multiplier inside a storm window
    pub storm_max_multiplier: f64,
    /// Decimal digits prices are rounded to
    pub digits: u32,
    /// Timestamp of the seed tick; omit for today's first UTC millisecond
    pub start_timestamp_ms: Option<i64>,
}

/// Concrete, fully-resolved generator configuration
///
/// This is what a session is reset with; every field is a definite value.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    pub seed: String,
    pub init_price: f64,
    pub volatility: f64,
    pub tick_interval_ms: i64,
    pub storm_per_cycle: u32,
    pub storm_max_multiplier: f64,
    pub digits: u32,
    pub start_timestamp_ms: i64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: random_seed(),
            init_price: 1000.0,
            volatility: 0.001,
            tick_interval_ms: 500,
            storm_per_cycle: 0,
            storm_max_multiplier: 2.0,
            digits: 2,
            start_timestamp_ms: today_first_timestamp_ms(),
        }
    }
}

impl GeneratorConfig {
    /// Config echo for logs and snapshots: never prints the seed itself
    pub fn digest(&self) -> String {
        format!(
            "init_price={} volatility={} tick_interval_ms={} storms={}x{:.2} digits={} start={}",
            self.init_price,
            self.volatility,
            self.tick_interval_ms,
            self.storm_per_cycle,
            self.storm_max_multiplier,
            self.digits,
            self.start_timestamp_ms
        )
    }
}

impl std::fmt::Display for GeneratorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

/// Generate a fresh random session seed
pub fn random_seed() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

/// First millisecond of the current UTC day
pub fn today_first_timestamp_ms() -> i64 {
    let now = Utc::now();
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or_else(|| now.timestamp_millis())
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Session defaults
            .set_default("session.init_price", 1000.0)?
            .set_default("session.volatility", 0.001)?
            .set_default("session.tick_interval_ms", 500)?
            .set_default("session.storm_per_cycle", 0)?
            .set_default("session.storm_max_multiplier", 2.0)?
            .set_default("session.digits", 2)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (FLOWGEN_*)
            .add_source(Environment::with_prefix("FLOWGEN").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(app_config)
    }

    /// Resolve the session section into a concrete generator configuration
    pub fn generator_config(&self) -> GeneratorConfig {
        let s = &self.session;
        GeneratorConfig {
            seed: s.seed.clone().unwrap_or_else(random_seed),
            init_price: s.init_price,
            volatility: s.volatility,
            tick_interval_ms: s.tick_interval_ms,
            storm_per_cycle: s.storm_per_cycle,
            storm_max_multiplier: s.storm_max_multiplier,
            digits: s.digits,
            start_timestamp_ms: s.start_timestamp_ms.unwrap_or_else(today_first_timestamp_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_session_defaults() {
        let cfg = GeneratorConfig::default();
        assert_eq!(cfg.init_price, 1000.0);
        assert_eq!(cfg.volatility, 0.001);
        assert_eq!(cfg.tick_interval_ms, 500);
        assert_eq!(cfg.storm_per_cycle, 0);
        assert_eq!(cfg.digits, 2);
        assert_eq!(cfg.seed.len(), 16);
    }

    #[test]
    fn test_digest_redacts_seed() {
        let cfg = GeneratorConfig {
            seed: "super-secret-seed".into(),
            ..Default::default()
        };
        assert!(!cfg.digest().contains("super-secret-seed"));
    }

    #[test]
    fn test_today_first_timestamp_is_day_aligned() {
        let ts = today_first_timestamp_ms();
        assert_eq!(ts % 86_400_000, 0);
    }
}
