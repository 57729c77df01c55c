use compass_core::{CompassError, MarketDataGateway, PricePoint};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::CompassOrchestrator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetCategory {
    /// Left side: defensive holdings
    Defense,
    /// Right side: core growth
    Core,
    /// Right side: satellite bets
    Satellite,
}

impl AssetCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetCategory::Defense => "Defense",
            AssetCategory::Core => "Core",
            AssetCategory::Satellite => "Satellite",
        }
    }
}

/// Market-wide risk indicators shown next to the holdings table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskGauge {
    Vix,
    TenYearYield,
}

impl RiskGauge {
    pub const ALL: [RiskGauge; 2] = [RiskGauge::Vix, RiskGauge::TenYearYield];

    pub fn symbol(&self) -> &'static str {
        match self {
            RiskGauge::Vix => "^VIX",
            RiskGauge::TenYearYield => "^TNX",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RiskGauge::Vix => "VIX",
            RiskGauge::TenYearYield => "10Y Yield",
        }
    }
}

/// Category -> identifiers, validated at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetUniverse {
    groups: Vec<(AssetCategory, Vec<String>)>,
    gauges: Vec<RiskGauge>,
}

impl AssetUniverse {
    /// Identifiers are trimmed and uppercased. Empty identifiers, duplicate
    /// identifiers and repeated categories are rejected.
    pub fn new(
        groups: Vec<(AssetCategory, Vec<String>)>,
        gauges: Vec<RiskGauge>,
    ) -> Result<Self, CompassError> {
        let mut seen_categories = HashSet::new();
        let mut seen_symbols = HashSet::new();
        let mut normalized = Vec::with_capacity(groups.len());

        for (category, symbols) in groups {
            if !seen_categories.insert(category) {
                return Err(CompassError::InvalidInput(format!(
                    "category {} listed more than once",
                    category.as_str()
                )));
            }
            let mut cleaned = Vec::with_capacity(symbols.len());
            for symbol in symbols {
                let symbol = symbol.trim().to_uppercase();
                if symbol.is_empty() {
                    return Err(CompassError::InvalidInput(format!(
                        "empty identifier in category {}",
                        category.as_str()
                    )));
                }
                if !seen_symbols.insert(symbol.clone()) {
                    return Err(CompassError::InvalidInput(format!("duplicate identifier {}", symbol)));
                }
                cleaned.push(symbol);
            }
            normalized.push((category, cleaned));
        }

        let mut unique_gauges = Vec::new();
        for gauge in gauges {
            if !unique_gauges.contains(&gauge) {
                unique_gauges.push(gauge);
            }
        }

        Ok(Self {
            groups: normalized,
            gauges: unique_gauges,
        })
    }

    pub fn groups(&self) -> &[(AssetCategory, Vec<String>)] {
        &self.groups
    }

    pub fn gauges(&self) -> &[RiskGauge] {
        &self.gauges
    }

    pub fn symbols(&self) -> impl Iterator<Item = (AssetCategory, &str)> {
        self.groups
            .iter()
            .flat_map(|(category, symbols)| symbols.iter().map(move |s| (*category, s.as_str())))
    }
}

impl Default for AssetUniverse {
    fn default() -> Self {
        let owned = |symbols: &[&str]| symbols.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            groups: vec![
                (AssetCategory::Defense, owned(&["COST", "WM", "XLV"])),
                (AssetCategory::Core, owned(&["MSFT", "GOOGL"])),
                (AssetCategory::Satellite, owned(&["VRT", "ETN"])),
            ],
            gauges: RiskGauge::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorRow {
    pub category: AssetCategory,
    pub symbol: String,
    pub price: f64,
    pub change_pct: f64,
    pub volume: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReading {
    pub gauge: RiskGauge,
    pub symbol: String,
    pub level: f64,
    pub change_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorReport {
    pub rows: Vec<MonitorRow>,
    pub risk: Vec<RiskReading>,
    /// Identifiers left out because their history was missing or too short.
    pub skipped: Vec<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Latest close, % change vs the previous close and latest volume.
/// `None` with fewer than two points or a zero previous close.
pub fn daily_change(history: &[PricePoint]) -> Option<(f64, f64, Option<u64>)> {
    let [.., prev, latest] = history else {
        return None;
    };
    if prev.close == 0.0 {
        return None;
    }
    let change_pct = (latest.close - prev.close) / prev.close * 100.0;
    let volume = latest.volume.filter(|v| v.is_finite() && *v >= 0.0).map(|v| v as u64);
    Some((latest.close, change_pct, volume))
}

impl<G: MarketDataGateway> CompassOrchestrator<G> {
    /// Build the holdings table and risk readings. Failed identifiers are skipped.
    pub async fn monitor(&self, universe: &AssetUniverse) -> MonitorReport {
        let mut rows = Vec::new();
        let mut risk = Vec::new();
        let mut skipped = Vec::new();

        for (category, symbol) in universe.symbols() {
            match self.recent_change(symbol).await {
                Some((price, change_pct, volume)) => rows.push(MonitorRow {
                    category,
                    symbol: symbol.to_string(),
                    price: round2(price),
                    change_pct: round2(change_pct),
                    volume,
                }),
                None => skipped.push(symbol.to_string()),
            }
        }

        for gauge in universe.gauges() {
            match self.recent_change(gauge.symbol()).await {
                Some((level, change_pct, _)) => risk.push(RiskReading {
                    gauge: *gauge,
                    symbol: gauge.symbol().to_string(),
                    level: round2(level),
                    change_pct: round2(change_pct),
                }),
                None => skipped.push(gauge.symbol().to_string()),
            }
        }

        tracing::info!(
            "Monitor: {} rows, {} risk gauges, {} skipped",
            rows.len(),
            risk.len(),
            skipped.len()
        );

        MonitorReport {
            rows,
            risk,
            skipped,
            timestamp: chrono::Utc::now(),
        }
    }

    async fn recent_change(&self, symbol: &str) -> Option<(f64, f64, Option<u64>)> {
        match self.get_price_history(symbol, self.history_days).await {
            Ok(history) => {
                let change = daily_change(&history);
                if change.is_none() {
                    tracing::warn!("Not enough price history for {} ({} points)", symbol, history.len());
                }
                change
            }
            Err(e) => {
                tracing::warn!("Failed to fetch price history for {}: {:?}", symbol, e);
                None
            }
        }
    }
}
