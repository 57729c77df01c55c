use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// Cache TTLs are clamped into this range (seconds).
pub const MIN_CACHE_TTL_SECS: i64 = 60;
pub const MAX_CACHE_TTL_SECS: i64 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompassConfig {
    // Gateway
    pub yahoo_rate_limit: usize,          // requests per minute
    pub yahoo_crumb: Option<String>,

    // Caching
    pub financials_cache_ttl_secs: i64,   // 3600
    pub price_cache_ttl_secs: i64,        // 60

    // Valuation defaults
    pub default_ev_multiple: u8,          // 5

    // Portfolio monitor
    pub monitor_history_days: u32,        // 5
}

impl Default for CompassConfig {
    fn default() -> Self {
        Self {
            yahoo_rate_limit: 60,
            yahoo_crumb: None,
            financials_cache_ttl_secs: MAX_CACHE_TTL_SECS,
            price_cache_ttl_secs: MIN_CACHE_TTL_SECS,
            default_ev_multiple: 5,
            monitor_history_days: 5,
        }
    }
}

impl CompassConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            yahoo_rate_limit: env::var("YAHOO_RATE_LIMIT")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("YAHOO_RATE_LIMIT must be a positive integer")?,
            yahoo_crumb: env::var("YAHOO_CRUMB").ok().filter(|c| !c.trim().is_empty()),
            financials_cache_ttl_secs: clamp_ttl(
                env::var("FINANCIALS_CACHE_TTL_SECS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()
                    .context("FINANCIALS_CACHE_TTL_SECS must be an integer")?,
            ),
            price_cache_ttl_secs: clamp_ttl(
                env::var("PRICE_CACHE_TTL_SECS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .context("PRICE_CACHE_TTL_SECS must be an integer")?,
            ),
            default_ev_multiple: env::var("DEFAULT_EV_MULTIPLE")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("DEFAULT_EV_MULTIPLE must be an integer")?,
            monitor_history_days: env::var("MONITOR_HISTORY_DAYS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("MONITOR_HISTORY_DAYS must be an integer")?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.yahoo_rate_limit == 0 {
            anyhow::bail!("YAHOO_RATE_LIMIT must be greater than 0");
        }
        value_compass::EvMultiple::new(self.default_ev_multiple)?;
        if self.monitor_history_days < 2 {
            anyhow::bail!("MONITOR_HISTORY_DAYS must be at least 2 to compute a change");
        }
        Ok(())
    }
}

pub fn clamp_ttl(secs: i64) -> i64 {
    secs.clamp(MIN_CACHE_TTL_SECS, MAX_CACHE_TTL_SECS)
}
