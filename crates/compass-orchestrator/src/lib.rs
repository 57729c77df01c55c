use chrono::{DateTime, Utc};
use compass_core::{
    CompassError, FinancialStatements, MarketDataGateway, NormalizedFinancials, PricePoint,
    QuoteSnapshot, RawFinancials,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

pub mod config;
pub mod monitor;

pub use config::CompassConfig;
pub use health_screener::{CriterionStatus, HealthCriterion, HealthReport, Tier};
pub use monitor::{AssetCategory, AssetUniverse, MonitorReport, MonitorRow, RiskGauge, RiskReading};
pub use value_compass::{
    EligibilityProfile, EvMultiple, FieldSource, ValuationField, ValuationResult, ValuationSession,
    Verdict, APPROVE_MARGIN_PCT,
};

/// Days of price history a lookup needs for the latest close.
const LOOKUP_HISTORY_DAYS: u32 = 5;

/// Internal cache entry with timestamp
struct CacheEntry<T> {
    data: T,
    cached_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    fn is_fresh(&self, ttl_secs: i64) -> bool {
        (Utc::now() - self.cached_at).num_seconds() < ttl_secs
    }
}

/// Statements and quote fetched together per identifier.
#[derive(Clone)]
struct FinancialBundle {
    statements: FinancialStatements,
    quote: QuoteSnapshot,
    /// One of the two fetches failed; cached under the short price TTL.
    degraded: bool,
}

/// Result of one lookup: the normalized figures and the health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lookup {
    pub normalized: NormalizedFinancials,
    pub health: HealthReport,
    /// Session fields the fetch overwrote.
    pub replaced: Vec<ValuationField>,
}

pub struct CompassOrchestrator<G: MarketDataGateway> {
    gateway: G,
    financials_ttl_secs: i64,
    price_ttl_secs: i64,
    history_days: u32,
    default_multiple: EvMultiple,
    /// Cache statements + quote per symbol
    financials_cache: DashMap<String, CacheEntry<FinancialBundle>>,
    /// Cache price history per (symbol, days)
    price_cache: DashMap<String, CacheEntry<Vec<PricePoint>>>,
}

impl<G: MarketDataGateway> CompassOrchestrator<G> {
    pub fn new(gateway: G) -> Self {
        Self::with_config(gateway, &CompassConfig::default())
    }

    pub fn with_config(gateway: G, config: &CompassConfig) -> Self {
        Self {
            gateway,
            financials_ttl_secs: config::clamp_ttl(config.financials_cache_ttl_secs),
            price_ttl_secs: config::clamp_ttl(config.price_cache_ttl_secs),
            history_days: config.monitor_history_days,
            default_multiple: EvMultiple::new(config.default_ev_multiple).unwrap_or_default(),
            financials_cache: DashMap::new(),
            price_cache: DashMap::new(),
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// A fresh session seeded with the configured EV multiple.
    pub fn new_session(&self) -> ValuationSession {
        ValuationSession::with_multiple(self.default_multiple)
    }

    /// Fetch everything the engines need for one identifier.
    ///
    /// Statements and quote are fetched independently; only both failing is an
    /// error. A missing price history leaves the bundle without a close.
    pub async fn fetch_raw(&self, symbol: &str) -> Result<RawFinancials, CompassError> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(CompassError::InvalidInput("empty identifier".to_string()));
        }

        let (bundle, history) = tokio::join!(
            self.get_financials(symbol),
            self.get_price_history(symbol, LOOKUP_HISTORY_DAYS),
        );
        let bundle = bundle?;

        let price_history = history.unwrap_or_else(|e| {
            tracing::warn!("Failed to fetch price history for {}: {:?}", symbol, e);
            Vec::new()
        });

        Ok(RawFinancials {
            symbol: symbol.to_string(),
            statements: bundle.statements,
            quote: bundle.quote,
            price_history,
        })
    }

    /// Fetch, normalize, screen and fold the fetched figures into `session`.
    ///
    /// On failure the session is left exactly as it was.
    pub async fn lookup(&self, symbol: &str, session: &mut ValuationSession) -> Result<Lookup, CompassError> {
        tracing::info!("Looking up {}", symbol);

        let raw = self.fetch_raw(symbol).await?;
        let normalized = metric_normalizer::normalize(&raw);
        let health = health_screener::screen(&normalized, &raw);
        let replaced = session.apply_fetched(&normalized);

        tracing::info!(
            "{}: {} session fields refreshed, health {}/{}",
            raw.symbol,
            replaced.len(),
            health.score,
            health.evaluated
        );

        Ok(Lookup {
            normalized,
            health,
            replaced,
        })
    }

    /// Drop every cached response.
    pub fn clear_cache(&self) {
        self.financials_cache.clear();
        self.price_cache.clear();
        tracing::info!("Cache cleared");
    }

    async fn get_financials(&self, symbol: &str) -> Result<FinancialBundle, CompassError> {
        if let Some(entry) = self.financials_cache.get(symbol) {
            let ttl = if entry.data.degraded {
                self.price_ttl_secs
            } else {
                self.financials_ttl_secs
            };
            if entry.is_fresh(ttl) {
                tracing::debug!("Financials cache hit for {}", symbol);
                return Ok(entry.data.clone());
            }
        }

        let (statements, quote) = tokio::join!(
            self.gateway.statements(symbol),
            self.gateway.quote(symbol),
        );

        let bundle = match (statements, quote) {
            (Err(statements_err), Err(quote_err)) => {
                return Err(CompassError::GatewayUnavailable(format!(
                    "{}: statements: {}; quote: {}",
                    symbol, statements_err, quote_err
                )));
            }
            (statements, quote) => FinancialBundle {
                degraded: statements.is_err() || quote.is_err(),
                statements: statements.unwrap_or_else(|e| {
                    tracing::warn!("Failed to fetch statements for {}: {:?}", symbol, e);
                    FinancialStatements::default()
                }),
                quote: quote.unwrap_or_else(|e| {
                    tracing::warn!("Failed to fetch quote for {}: {:?}", symbol, e);
                    QuoteSnapshot::default()
                }),
            },
        };

        self.financials_cache.insert(
            symbol.to_string(),
            CacheEntry {
                data: bundle.clone(),
                cached_at: Utc::now(),
            },
        );
        Ok(bundle)
    }

    async fn get_price_history(&self, symbol: &str, days: u32) -> Result<Vec<PricePoint>, CompassError> {
        let key = format!("{}:{}", symbol, days);
        if let Some(entry) = self.price_cache.get(&key) {
            if entry.is_fresh(self.price_ttl_secs) {
                tracing::debug!("Price cache hit for {}", key);
                return Ok(entry.data.clone());
            }
        }

        let history = self.gateway.price_history(symbol, days).await?;
        self.price_cache.insert(
            key,
            CacheEntry {
                data: history.clone(),
                cached_at: Utc::now(),
            },
        );
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use compass_core::{Figure, Statement, StatementRow};
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory gateway with per-endpoint failure switches and call counters.
    #[derive(Default)]
    struct FakeGateway {
        statements: HashMap<String, FinancialStatements>,
        quotes: HashMap<String, QuoteSnapshot>,
        prices: HashMap<String, Vec<PricePoint>>,
        down: HashSet<String>,
        calls: AtomicUsize,
    }

    impl FakeGateway {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MarketDataGateway for FakeGateway {
        async fn price_history(&self, symbol: &str, _days: u32) -> Result<Vec<PricePoint>, CompassError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.down.contains(symbol) {
                return Err(CompassError::GatewayUnavailable(symbol.to_string()));
            }
            self.prices
                .get(symbol)
                .cloned()
                .ok_or_else(|| CompassError::NoData(symbol.to_string()))
        }

        async fn statements(&self, symbol: &str) -> Result<FinancialStatements, CompassError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.down.contains(symbol) {
                return Err(CompassError::GatewayUnavailable(symbol.to_string()));
            }
            self.statements
                .get(symbol)
                .cloned()
                .ok_or_else(|| CompassError::NoData(symbol.to_string()))
        }

        async fn quote(&self, symbol: &str) -> Result<QuoteSnapshot, CompassError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.down.contains(symbol) {
                return Err(CompassError::GatewayUnavailable(symbol.to_string()));
            }
            self.quotes
                .get(symbol)
                .cloned()
                .ok_or_else(|| CompassError::NoData(symbol.to_string()))
        }
    }

    fn point(day: u32, close: f64) -> PricePoint {
        PricePoint {
            date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            close,
            volume: Some(1_000.0),
        }
    }

    fn korean_gateway() -> FakeGateway {
        let mut gateway = FakeGateway::default();
        let symbol = "005930.KS".to_string();
        gateway.statements.insert(
            symbol.clone(),
            FinancialStatements {
                income_statement: Statement::new(vec![StatementRow::new(
                    "Operating Income",
                    vec![Some(5.0e10), Some(8.0e10), Some(1.2e11)],
                )]),
                balance_sheet: Statement::new(vec![
                    StatementRow::new("Total Debt", vec![Some(3.0e11)]),
                    StatementRow::new("Cash And Cash Equivalents", vec![Some(1.0e11)]),
                ]),
                cash_flow: Statement::default(),
            },
        );
        gateway.quotes.insert(
            symbol.clone(),
            QuoteSnapshot {
                currency: Some("KRW".to_string()),
                shares_outstanding: Some(100_000_000.0),
                ..Default::default()
            },
        );
        gateway.prices.insert(symbol, vec![point(4, 6700.0), point(5, 6800.0)]);
        gateway
    }

    #[tokio::test]
    async fn test_lookup_scenario_a() {
        let orchestrator = CompassOrchestrator::new(korean_gateway());
        let mut session = orchestrator.new_session();

        let lookup = orchestrator.lookup("005930.KS", &mut session).await.unwrap();
        assert_eq!(lookup.normalized.operating_income[0], Figure::Known(1200.0));
        assert_eq!(lookup.health.criteria.len(), 8);
        assert_eq!(session.current_price(), Some(6800.0));
        assert_eq!(session.source(ValuationField::TotalDebt), FieldSource::Fetched);

        session.set_one_off_adjustment(100.0);
        let result = session.evaluate(&EligibilityProfile::default()).unwrap();
        assert_eq!(result.fair_value_per_share, 1000.0);
        assert!(matches!(result.verdict, Verdict::Reject { .. }));
    }

    #[tokio::test]
    async fn test_gateway_down_leaves_session_untouched() {
        let mut gateway = korean_gateway();
        gateway.down.insert("005930.KS".to_string());
        let orchestrator = CompassOrchestrator::new(gateway);

        let mut session = orchestrator.new_session();
        session.set_total_debt(4200.0);
        session.set_current_price(5000.0);

        let err = orchestrator.lookup("005930.KS", &mut session).await.unwrap_err();
        assert!(matches!(err, CompassError::GatewayUnavailable(_)));
        assert!(err.is_recoverable());
        assert_eq!(session.input().total_debt, 4200.0);
        assert_eq!(session.current_price(), Some(5000.0));
        assert_eq!(session.source(ValuationField::TotalDebt), FieldSource::Edited);
    }

    #[tokio::test]
    async fn test_quote_failure_is_partial() {
        let mut gateway = korean_gateway();
        gateway.quotes.clear();
        let orchestrator = CompassOrchestrator::new(gateway);

        let raw = orchestrator.fetch_raw("005930.KS").await.unwrap();
        assert_eq!(raw.quote, QuoteSnapshot::default());
        assert!(!raw.statements.income_statement.is_empty());

        let mut session = orchestrator.new_session();
        let lookup = orchestrator.lookup("005930.KS", &mut session).await.unwrap();
        assert_eq!(lookup.normalized.shares_outstanding, Figure::Unknown);
        assert!(!lookup.replaced.contains(&ValuationField::SharesOutstanding));
    }

    #[tokio::test]
    async fn test_missing_price_history_is_soft() {
        let mut gateway = korean_gateway();
        gateway.prices.clear();
        let orchestrator = CompassOrchestrator::new(gateway);

        let raw = orchestrator.fetch_raw("005930.KS").await.unwrap();
        assert!(raw.price_history.is_empty());
        assert_eq!(raw.latest_close(), None);
    }

    #[tokio::test]
    async fn test_cache_hits_within_ttl() {
        let orchestrator = CompassOrchestrator::new(korean_gateway());
        orchestrator.fetch_raw("005930.KS").await.unwrap();
        let after_first = orchestrator.gateway().calls();
        assert_eq!(after_first, 3);

        orchestrator.fetch_raw("005930.KS").await.unwrap();
        assert_eq!(orchestrator.gateway().calls(), after_first);

        orchestrator.clear_cache();
        orchestrator.fetch_raw("005930.KS").await.unwrap();
        assert_eq!(orchestrator.gateway().calls(), after_first * 2);
    }

    fn age_financials(orchestrator: &CompassOrchestrator<FakeGateway>, symbol: &str, secs: i64) {
        if let Some(mut entry) = orchestrator.financials_cache.get_mut(symbol) {
            entry.cached_at = Utc::now() - chrono::Duration::seconds(secs);
        }
    }

    #[tokio::test]
    async fn test_degraded_bundle_expires_with_price_ttl() {
        let mut gateway = korean_gateway();
        gateway.quotes.clear();
        let orchestrator = CompassOrchestrator::new(gateway);

        orchestrator.fetch_raw("005930.KS").await.unwrap();
        let calls = orchestrator.gateway().calls();

        // Older than the 60 s price TTL, well inside the 3600 s financials TTL
        age_financials(&orchestrator, "005930.KS", 120);
        orchestrator.get_financials("005930.KS").await.unwrap();
        assert_eq!(orchestrator.gateway().calls(), calls + 2);
    }

    #[tokio::test]
    async fn test_full_bundle_keeps_financials_ttl() {
        let orchestrator = CompassOrchestrator::new(korean_gateway());
        orchestrator.fetch_raw("005930.KS").await.unwrap();
        let calls = orchestrator.gateway().calls();

        age_financials(&orchestrator, "005930.KS", 120);
        orchestrator.get_financials("005930.KS").await.unwrap();
        assert_eq!(orchestrator.gateway().calls(), calls);
    }

    #[tokio::test]
    async fn test_empty_identifier_rejected() {
        let orchestrator = CompassOrchestrator::new(FakeGateway::default());
        let err = orchestrator.fetch_raw("   ").await.unwrap_err();
        assert!(matches!(err, CompassError::InvalidInput(_)));
        assert_eq!(orchestrator.gateway().calls(), 0);
    }

    #[tokio::test]
    async fn test_monitor_skips_failed_identifiers() {
        let mut gateway = FakeGateway::default();
        gateway.prices.insert("MSFT".to_string(), vec![point(4, 400.0), point(5, 410.0)]);
        gateway.prices.insert("GOOGL".to_string(), vec![point(5, 150.0)]);
        gateway.prices.insert("^VIX".to_string(), vec![point(4, 20.0), point(5, 18.0)]);
        gateway.down.insert("COST".to_string());

        let orchestrator = CompassOrchestrator::new(gateway);
        let report = orchestrator.monitor(&AssetUniverse::default()).await;

        assert_eq!(report.rows.len(), 1);
        let row = &report.rows[0];
        assert_eq!(row.symbol, "MSFT");
        assert_eq!(row.category, AssetCategory::Core);
        assert_eq!(row.price, 410.0);
        assert_eq!(row.change_pct, 2.5);
        assert_eq!(row.volume, Some(1_000));

        assert_eq!(report.risk.len(), 1);
        assert_eq!(report.risk[0].gauge, RiskGauge::Vix);
        assert_eq!(report.risk[0].change_pct, -10.0);

        assert!(report.skipped.contains(&"COST".to_string()));
        assert!(report.skipped.contains(&"GOOGL".to_string()));
        assert!(report.skipped.contains(&"^TNX".to_string()));
    }

    #[tokio::test]
    async fn test_config_multiple_seeds_session() {
        let config = CompassConfig {
            default_ev_multiple: 7,
            ..Default::default()
        };
        let orchestrator = CompassOrchestrator::with_config(FakeGateway::default(), &config);
        assert_eq!(orchestrator.new_session().input().multiple.get(), 7);
    }
}
