use async_trait::async_trait;
use crate::{CompassError, FinancialStatements, PricePoint, QuoteSnapshot};

/// Upstream market data source.
///
/// Implementations must answer per identifier and tolerate partial-field
/// responses; an unknown identifier is an `Err`, a missing field is `None`.
#[async_trait]
pub trait MarketDataGateway: Send + Sync {
    /// Daily price history for the last `days` sessions, oldest first.
    async fn price_history(&self, symbol: &str, days: u32) -> Result<Vec<PricePoint>, CompassError>;

    /// Annual income statement, balance sheet and cash flow rows.
    async fn statements(&self, symbol: &str) -> Result<FinancialStatements, CompassError>;

    /// Quote/info snapshot.
    async fn quote(&self, symbol: &str) -> Result<QuoteSnapshot, CompassError>;
}
