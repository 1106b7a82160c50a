use crate::allowance::{RatePolicy, DEFAULT_MAX_COST_PER_KM};
use crate::error::{Result, TravelCostError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Configuration source for tracking where values come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Default value
    Default,
    /// Loaded from config file
    File,
    /// Loaded from environment variable
    Environment,
}

impl ConfigSource {
    /// Returns the precedence level (higher = higher priority)
    pub fn precedence(&self) -> u8 {
        match self {
            ConfigSource::Default => 0,
            ConfigSource::File => 1,
            ConfigSource::Environment => 2,
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }

    /// Update the value if the new source has higher precedence
    pub fn update(&mut self, value: T, source: ConfigSource) {
        if source.precedence() > self.source.precedence() {
            self.value = value;
            self.source = source;
        }
    }
}

/// Settings the calculation service runs with
#[derive(Debug, Clone, PartialEq)]
pub struct CalculationSettings {
    pub cache_ttl: Duration,
    pub rate_policy: RatePolicy,
    pub cache_enabled: bool,
    pub wait_timeout: Duration,
    /// `None` disables the background sweep
    pub cleanup_interval: Option<Duration>,
}

impl Default for CalculationSettings {
    fn default() -> Self {
        LayeredConfig::with_defaults().calculation_settings()
    }
}

/// Layered configuration for the calculation engine
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    pub cache_ttl_secs: ConfigValue<u64>,
    pub max_cost_per_km: ConfigValue<Decimal>,
    pub cache_enabled: ConfigValue<bool>,
    pub wait_timeout_ms: ConfigValue<u64>,
    pub cleanup_interval_secs: ConfigValue<u64>,
}

impl LayeredConfig {
    /// Create a new configuration with default values
    pub fn with_defaults() -> Self {
        Self {
            cache_ttl_secs: ConfigValue::new(3600, ConfigSource::Default),
            max_cost_per_km: ConfigValue::new(DEFAULT_MAX_COST_PER_KM, ConfigSource::Default),
            cache_enabled: ConfigValue::new(true, ConfigSource::Default),
            wait_timeout_ms: ConfigValue::new(5000, ConfigSource::Default),
            cleanup_interval_secs: ConfigValue::new(300, ConfigSource::Default),
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| TravelCostError::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to read config file: {}", e),
            })?;

        let file_config: FileConfig =
            toml::from_str(&content).map_err(|e| TravelCostError::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to parse TOML: {}", e),
            })?;

        if let Some(ttl) = file_config.cache_ttl_secs {
            if ttl == 0 {
                return Err(TravelCostError::ConfigInvalid {
                    key: "cache_ttl_secs".to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
            self.cache_ttl_secs.update(ttl, ConfigSource::File);
        }

        if let Some(max_rate) = file_config.max_cost_per_km {
            let max_rate = validate_max_cost_per_km(max_rate)?;
            self.max_cost_per_km.update(max_rate, ConfigSource::File);
        }

        if let Some(enabled) = file_config.cache_enabled {
            self.cache_enabled.update(enabled, ConfigSource::File);
        }

        if let Some(timeout) = file_config.wait_timeout_ms {
            if timeout == 0 {
                return Err(TravelCostError::ConfigInvalid {
                    key: "wait_timeout_ms".to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
            self.wait_timeout_ms.update(timeout, ConfigSource::File);
        }

        if let Some(interval) = file_config.cleanup_interval_secs {
            self.cleanup_interval_secs.update(interval, ConfigSource::File);
        }

        Ok(self)
    }

    /// Load configuration from environment variables
    pub fn load_from_env(mut self) -> Self {
        // TRAVELCOST_CACHE_TTL_SECS
        if let Ok(ttl_str) = env::var("TRAVELCOST_CACHE_TTL_SECS") {
            match ttl_str.parse::<u64>() {
                Ok(ttl) if ttl > 0 => self.cache_ttl_secs.update(ttl, ConfigSource::Environment),
                _ => tracing::warn!(
                    "Invalid TRAVELCOST_CACHE_TTL_SECS value '{}': expected positive seconds",
                    ttl_str
                ),
            }
        }

        // TRAVELCOST_MAX_COST_PER_KM
        if let Ok(rate_str) = env::var("TRAVELCOST_MAX_COST_PER_KM") {
            match parse_max_cost_per_km(&rate_str) {
                Ok(rate) => self.max_cost_per_km.update(rate, ConfigSource::Environment),
                Err(_) => tracing::warn!(
                    "Invalid TRAVELCOST_MAX_COST_PER_KM value '{}': expected a positive decimal",
                    rate_str
                ),
            }
        }

        // TRAVELCOST_CACHE_ENABLED
        if let Ok(enabled_str) = env::var("TRAVELCOST_CACHE_ENABLED") {
            match parse_bool("cache_enabled", &enabled_str) {
                Ok(enabled) => self.cache_enabled.update(enabled, ConfigSource::Environment),
                Err(_) => tracing::warn!(
                    "Invalid TRAVELCOST_CACHE_ENABLED value '{}': expected true or false",
                    enabled_str
                ),
            }
        }

        // TRAVELCOST_WAIT_TIMEOUT_MS
        if let Ok(timeout_str) = env::var("TRAVELCOST_WAIT_TIMEOUT_MS") {
            match timeout_str.parse::<u64>() {
                Ok(timeout) if timeout > 0 => {
                    self.wait_timeout_ms.update(timeout, ConfigSource::Environment)
                }
                _ => tracing::warn!(
                    "Invalid TRAVELCOST_WAIT_TIMEOUT_MS value '{}': expected positive milliseconds",
                    timeout_str
                ),
            }
        }

        // TRAVELCOST_CLEANUP_INTERVAL_SECS
        if let Ok(interval_str) = env::var("TRAVELCOST_CLEANUP_INTERVAL_SECS") {
            match interval_str.parse::<u64>() {
                Ok(interval) => {
                    self.cleanup_interval_secs.update(interval, ConfigSource::Environment)
                }
                Err(_) => tracing::warn!(
                    "Invalid TRAVELCOST_CLEANUP_INTERVAL_SECS value '{}': expected seconds",
                    interval_str
                ),
            }
        }

        self
    }

    /// Resolve the typed settings the calculation service consumes
    pub fn calculation_settings(&self) -> CalculationSettings {
        CalculationSettings {
            cache_ttl: Duration::from_secs(self.cache_ttl_secs.value),
            rate_policy: RatePolicy::new(self.max_cost_per_km.value),
            cache_enabled: self.cache_enabled.value,
            wait_timeout: Duration::from_millis(self.wait_timeout_ms.value),
            cleanup_interval: match self.cleanup_interval_secs.value {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }

    /// Get all configuration values as a map for inspection
    pub fn to_inspection_map(&self) -> HashMap<String, (String, ConfigSource)> {
        let mut map = HashMap::new();

        map.insert(
            "cache_ttl_secs".to_string(),
            (format!("{}s", self.cache_ttl_secs.value), self.cache_ttl_secs.source),
        );

        map.insert(
            "max_cost_per_km".to_string(),
            (format!("CHF {}", self.max_cost_per_km.value), self.max_cost_per_km.source),
        );

        map.insert(
            "cache_enabled".to_string(),
            (self.cache_enabled.value.to_string(), self.cache_enabled.source),
        );

        map.insert(
            "wait_timeout_ms".to_string(),
            (format!("{}ms", self.wait_timeout_ms.value), self.wait_timeout_ms.source),
        );

        map.insert(
            "cleanup_interval_secs".to_string(),
            (format!("{}s", self.cleanup_interval_secs.value), self.cleanup_interval_secs.source),
        );

        map
    }
}

/// Configuration loaded from TOML file
#[derive(Debug, Deserialize, Serialize)]
struct FileConfig {
    cache_ttl_secs: Option<u64>,
    max_cost_per_km: Option<Decimal>,
    cache_enabled: Option<bool>,
    wait_timeout_ms: Option<u64>,
    cleanup_interval_secs: Option<u64>,
}

/// Parse the per-kilometer rate ceiling from string
pub fn parse_max_cost_per_km(s: &str) -> Result<Decimal> {
    let rate = Decimal::from_str(s.trim()).map_err(|e| TravelCostError::ConfigInvalid {
        key: "max_cost_per_km".to_string(),
        reason: format!("Invalid decimal '{}': {}", s, e),
    })?;
    validate_max_cost_per_km(rate)
}

fn validate_max_cost_per_km(rate: Decimal) -> Result<Decimal> {
    if rate <= Decimal::ZERO {
        return Err(TravelCostError::ConfigInvalid {
            key: "max_cost_per_km".to_string(),
            reason: format!("must be positive, got {}", rate),
        });
    }
    Ok(rate)
}

/// Parse a boolean flag from string
pub fn parse_bool(key: &str, s: &str) -> Result<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(TravelCostError::ConfigInvalid {
            key: key.to_string(),
            reason: format!("Invalid boolean: {}. Use true or false", s),
        }),
    }
}
