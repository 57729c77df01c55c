use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Unit divisor for KRW figures (억 원).
pub const KRW_UNIT_DIVISOR: f64 = 100_000_000.0;
/// Unit divisor for every other currency (millions).
pub const DEFAULT_UNIT_DIVISOR: f64 = 1_000_000.0;

/// A single extracted figure that remembers whether it was actually found.
///
/// `value()` collapses `Unknown` to 0.0 for arithmetic; callers that display
/// or override figures should match on the variant instead.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Figure {
    Known(f64),
    #[default]
    Unknown,
}

impl Figure {
    /// NaN and infinities are treated as missing.
    pub fn from_option(value: Option<f64>) -> Self {
        match value {
            Some(v) if v.is_finite() => Figure::Known(v),
            _ => Figure::Unknown,
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            Figure::Known(v) => *v,
            Figure::Unknown => 0.0,
        }
    }

    pub fn known(&self) -> Option<f64> {
        match self {
            Figure::Known(v) => Some(*v),
            Figure::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Figure::Known(_))
    }

    pub fn map(self, f: impl FnOnce(f64) -> f64) -> Self {
        match self {
            Figure::Known(v) => Figure::Known(f(v)),
            Figure::Unknown => Figure::Unknown,
        }
    }
}

impl From<Option<f64>> for Figure {
    fn from(value: Option<f64>) -> Self {
        Figure::from_option(value)
    }
}

/// Reporting currency as far as unit scaling is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    Krw,
    Other(String),
}

impl Currency {
    /// Missing currency codes are treated as KRW.
    pub fn from_code(code: Option<&str>) -> Self {
        match code.map(str::trim) {
            None | Some("") => Currency::Krw,
            Some(c) if c.eq_ignore_ascii_case("KRW") => Currency::Krw,
            Some(c) => Currency::Other(c.to_uppercase()),
        }
    }

    pub fn unit_divisor(&self) -> f64 {
        match self {
            Currency::Krw => KRW_UNIT_DIVISOR,
            Currency::Other(_) => DEFAULT_UNIT_DIVISOR,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Currency::Krw => "KRW",
            Currency::Other(c) => c,
        }
    }

    /// Display label for divisor-scaled amounts.
    pub fn unit_label(&self) -> String {
        match self {
            Currency::Krw => "억 원".to_string(),
            Currency::Other(c) => format!("million {}", c),
        }
    }
}

/// One labelled line item. `values` are annual columns, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementRow {
    pub label: String,
    pub values: Vec<Option<f64>>,
}

impl StatementRow {
    pub fn new(label: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            label: label.into(),
            values,
        }
    }

    /// Column `index` (0 = most recent), skipping NaN cells.
    pub fn value_at(&self, index: usize) -> Option<f64> {
        self.values
            .get(index)
            .copied()
            .flatten()
            .filter(|v| v.is_finite())
    }

    pub fn latest(&self) -> Option<f64> {
        self.value_at(0)
    }
}

/// A financial statement as a list of labelled rows in source order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub rows: Vec<StatementRow>,
}

impl Statement {
    pub fn new(rows: Vec<StatementRow>) -> Self {
        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialStatements {
    pub income_statement: Statement,
    pub balance_sheet: Statement,
    pub cash_flow: Statement,
}

/// Quote/info snapshot. Every field may be missing upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    pub currency: Option<String>,
    pub shares_outstanding: Option<f64>,
    pub market_cap: Option<f64>,
    pub trailing_eps: Option<f64>,
    pub forward_eps: Option<f64>,
    pub trailing_pe: Option<f64>,
    pub peg_ratio: Option<f64>,
    pub total_debt: Option<f64>,
    pub total_cash: Option<f64>,
    pub ebitda: Option<f64>,
    pub free_cash_flow: Option<f64>,
}

/// Daily close
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
    #[serde(default)]
    pub volume: Option<f64>,
}

/// Everything fetched for one identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFinancials {
    pub symbol: String,
    pub statements: FinancialStatements,
    pub quote: QuoteSnapshot,
    /// Oldest first. Empty when the price fetch failed.
    pub price_history: Vec<PricePoint>,
}

impl RawFinancials {
    pub fn latest_close(&self) -> Option<f64> {
        self.price_history
            .last()
            .map(|p| p.close)
            .filter(|c| c.is_finite())
    }
}

/// Canonical per-company figure set, monetary figures divisor-scaled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedFinancials {
    pub symbol: String,
    pub currency: Currency,
    pub unit_divisor: f64,
    /// Annual operating income, oldest to newest (year-2, year-1, latest).
    pub operating_income: [Figure; 3],
    pub total_debt: Figure,
    pub cash_and_equivalents: Figure,
    /// Share count, not scaled.
    pub shares_outstanding: Figure,
    /// Latest close in the quote currency, not scaled.
    pub latest_close: Figure,
}

/// Business types the conservative EV method refuses to value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IneligibleCategory {
    FinancialInstitution,
    PlatformBusiness,
    TurnaroundStory,
}

impl IneligibleCategory {
    pub fn label(&self) -> &'static str {
        match self {
            IneligibleCategory::FinancialInstitution => "financial institution",
            IneligibleCategory::PlatformBusiness => "platform/network business",
            IneligibleCategory::TurnaroundStory => "loss-to-profit turnaround",
        }
    }
}
