//! Process configuration resolved once at startup

use common::constants::network::MIN_POLL_INTERVAL_MS;
use common::{CommonError, Symbol};
use engine::gemini::DEFAULT_GEMINI_MODEL;
use feeds::WallexConfig;
use feeds::wallex::DEFAULT_BASE_URL;
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Configuration errors; all are fatal at startup
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} is required: {reason}")]
    Missing { key: &'static str, reason: String },

    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid symbol: {0}")]
    Symbol(#[from] CommonError),
}

/// Resolved trader settings
#[derive(Clone)]
pub struct TraderConfig {
    pub wallex: WallexConfig,
    pub symbol: Symbol,
    /// Quote amount per order (`TRADE_AMOUNT_USDT`)
    pub budget: Decimal,
    pub min_order_qty: Decimal,
    pub dry_run: bool,
    pub use_llm: bool,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub advisory_every: u64,
    pub advisory_timeout: Duration,
    pub enable_polling: bool,
    pub polling_interval: Duration,
    pub idle_timeout: Duration,
}

impl TraderConfig {
    /// Read from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read through `lookup`; unset and blank values take their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let api_key = env.string("WALLEX_API_KEY", "");
        let base_url = env.string("WALLEX_BASE_URL", DEFAULT_BASE_URL);
        let symbol = Symbol::parse(&env.string("TRADE_SYMBOL", "BTCUSDT"))?;

        let budget = env.decimal("TRADE_AMOUNT_USDT", "10")?;
        if budget <= Decimal::ZERO {
            return Err(ConfigError::Invalid {
                key: "TRADE_AMOUNT_USDT",
                value: budget.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        let min_order_qty = env.decimal("MIN_ORDER_QTY", "0.000001")?;
        if min_order_qty < Decimal::ZERO {
            return Err(ConfigError::Invalid {
                key: "MIN_ORDER_QTY",
                value: min_order_qty.to_string(),
                reason: "must not be negative".to_string(),
            });
        }

        let dry_run = env.boolean("DRY_RUN", true)?;
        if !dry_run && api_key.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "WALLEX_API_KEY",
                reason: "live trading (DRY_RUN=false) needs an API key".to_string(),
            });
        }

        let advisory_every = env.integer("ADVISORY_EVERY_N_TRADES", 6)?;
        if advisory_every == 0 {
            return Err(ConfigError::Invalid {
                key: "ADVISORY_EVERY_N_TRADES",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let floor = Duration::from_millis(MIN_POLL_INTERVAL_MS);
        Ok(Self {
            wallex: WallexConfig::new(base_url, api_key),
            symbol,
            budget,
            min_order_qty,
            dry_run,
            use_llm: env.boolean("USE_LLM", true)?,
            gemini_api_key: env.string("GEMINI_API_KEY", ""),
            gemini_model: env.string("GEMINI_MODEL", DEFAULT_GEMINI_MODEL),
            advisory_every,
            advisory_timeout: env.seconds("ADVISORY_TIMEOUT_SEC", 20, floor)?,
            enable_polling: env.boolean("ENABLE_POLLING", true)?,
            polling_interval: env.seconds("POLLING_INTERVAL_SEC", 5, floor)?,
            idle_timeout: env.seconds("WS_IDLE_TIMEOUT_SEC", 15, floor)?,
        })
    }

    /// Advisory runs only when enabled and credentialed
    #[must_use]
    pub fn advisory_enabled(&self) -> bool {
        self.use_llm && !self.gemini_api_key.trim().is_empty()
    }
}

impl fmt::Debug for TraderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraderConfig")
            .field("wallex", &self.wallex)
            .field("symbol", &self.symbol.as_str())
            .field("budget", &self.budget)
            .field("min_order_qty", &self.min_order_qty)
            .field("dry_run", &self.dry_run)
            .field("use_llm", &self.use_llm)
            .field("gemini_model", &self.gemini_model)
            .field("advisory_enabled", &self.advisory_enabled())
            .field("advisory_every", &self.advisory_every)
            .field("advisory_timeout", &self.advisory_timeout)
            .field("enable_polling", &self.enable_polling)
            .field("polling_interval", &self.polling_interval)
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn raw(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.raw(key).unwrap_or_else(|| default.to_string())
    }

    fn boolean(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        let Some(value) = self.raw(key) else {
            return Ok(default);
        };
        match value.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::Invalid {
                key,
                value,
                reason: "expected true/false/1/0/yes/no".to_string(),
            }),
        }
    }

    fn decimal(&self, key: &'static str, default: &str) -> Result<Decimal, ConfigError> {
        let value = self.string(key, default);
        Decimal::from_str(&value)
            .or_else(|_| Decimal::from_scientific(&value))
            .map_err(|e| ConfigError::Invalid {
                key,
                value,
                reason: e.to_string(),
            })
    }

    fn integer(&self, key: &'static str, default: u64) -> Result<u64, ConfigError> {
        match self.raw(key) {
            None => Ok(default),
            Some(value) => value.parse::<u64>().map_err(|e| ConfigError::Invalid {
                key,
                value,
                reason: e.to_string(),
            }),
        }
    }

    /// Whole seconds, raised to `floor` with a warning
    fn seconds(
        &self,
        key: &'static str,
        default: u64,
        floor: Duration,
    ) -> Result<Duration, ConfigError> {
        let value = Duration::from_secs(self.integer(key, default)?);
        if value < floor {
            warn!("{} below minimum; using {:?}", key, floor);
            return Ok(floor);
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<TraderConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        TraderConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.symbol.as_str(), "BTCUSDT");
        assert_eq!(config.budget, Decimal::from(10));
        assert_eq!(config.min_order_qty, Decimal::new(1, 6));
        assert!(config.dry_run);
        assert!(config.use_llm);
        assert!(!config.advisory_enabled());
        assert_eq!(config.gemini_model, "gemini-1.5-flash");
        assert_eq!(config.advisory_every, 6);
        assert_eq!(config.advisory_timeout, Duration::from_secs(20));
        assert!(config.enable_polling);
        assert_eq!(config.polling_interval, Duration::from_secs(5));
        assert_eq!(config.idle_timeout, Duration::from_secs(15));
        assert_eq!(config.wallex.base_url, "https://api.wallex.ir");
    }

    #[rstest]
    #[case("true", true)]
    #[case("TRUE", true)]
    #[case("1", true)]
    #[case("yes", true)]
    #[case("false", false)]
    #[case("No", false)]
    #[case("0", false)]
    fn test_boolean_forms(#[case] raw: &str, #[case] expected: bool) {
        let config = load(&[("ENABLE_POLLING", raw)]).unwrap();
        assert_eq!(config.enable_polling, expected);
    }

    #[test]
    fn test_bad_boolean_rejected() {
        let err = load(&[("DRY_RUN", "maybe")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "DRY_RUN", .. }));
    }

    #[rstest]
    #[case("TRADE_AMOUNT_USDT", "ten")]
    #[case("TRADE_AMOUNT_USDT", "0")]
    #[case("TRADE_AMOUNT_USDT", "-5")]
    #[case("MIN_ORDER_QTY", "-0.1")]
    #[case("POLLING_INTERVAL_SEC", "1.5")]
    #[case("ADVISORY_EVERY_N_TRADES", "0")]
    fn test_invalid_numbers(#[case] key: &str, #[case] value: &str) {
        assert!(matches!(load(&[(key, value)]), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_invalid_symbol() {
        assert!(matches!(
            load(&[("TRADE_SYMBOL", "BTC/USDT")]),
            Err(ConfigError::Symbol(_))
        ));
    }

    #[test]
    fn test_live_mode_requires_key() {
        let err = load(&[("DRY_RUN", "false")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { key: "WALLEX_API_KEY", .. }));

        let config = load(&[("DRY_RUN", "false"), ("WALLEX_API_KEY", "k")]).unwrap();
        assert!(!config.dry_run);
        assert!(config.wallex.has_credentials());
    }

    #[test]
    fn test_intervals_clamped_to_floor() {
        let config = load(&[("POLLING_INTERVAL_SEC", "0"), ("WS_IDLE_TIMEOUT_SEC", "0")]).unwrap();
        assert_eq!(config.polling_interval, Duration::from_secs(1));
        assert_eq!(config.idle_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_advisory_needs_key() {
        let config = load(&[("GEMINI_API_KEY", "g")]).unwrap();
        assert!(config.advisory_enabled());
        let config = load(&[("GEMINI_API_KEY", "g"), ("USE_LLM", "false")]).unwrap();
        assert!(!config.advisory_enabled());
    }

    #[test]
    fn test_debug_redacts_keys() {
        let config = load(&[("WALLEX_API_KEY", "wk-secret"), ("GEMINI_API_KEY", "gk-secret")]).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("wk-secret"));
        assert!(!rendered.contains("gk-secret"));
    }
}
