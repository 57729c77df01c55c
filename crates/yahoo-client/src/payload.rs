//! Yahoo response payloads and their conversion into gateway types.

use chrono::{DateTime, NaiveDate};
use compass_core::{CompassError, PricePoint, QuoteSnapshot, Statement, StatementRow};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

/// Turn a timeseries type key into the label a statement table would show,
/// e.g. `annualCashAndCashEquivalents` -> `Cash And Cash Equivalents`.
pub fn humanize_type(key: &str) -> String {
    let key = key
        .strip_prefix("annual")
        .or_else(|| key.strip_prefix("quarterly"))
        .or_else(|| key.strip_prefix("trailing"))
        .unwrap_or(key);

    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len() + 8);
    for (i, &c) in chars.iter().enumerate() {
        if i > 0 && c.is_ascii_uppercase() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            if prev.is_ascii_lowercase() || prev.is_ascii_digit() || (prev.is_ascii_uppercase() && next_is_lower) {
                out.push(' ');
            }
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

/// Parse a `/v8/finance/chart` body into daily points, oldest first.
/// Sessions with a null close are dropped.
pub fn parse_chart(body: &str) -> Result<Vec<PricePoint>, CompassError> {
    let envelope: ChartEnvelope =
        serde_json::from_str(body).map_err(|e| CompassError::ParseError(e.to_string()))?;

    if let Some(err) = envelope.chart.error.filter(|e| !e.is_null()) {
        return Err(CompassError::NoData(err.to_string()));
    }

    let result = envelope
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| CompassError::NoData("empty chart result".to_string()))?;

    let quote = result.indicators.quote.into_iter().next();
    let (closes, volumes) = match quote {
        Some(q) => (q.close, q.volume),
        None => (Vec::new(), Vec::new()),
    };

    let mut points: Vec<PricePoint> = result
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, &ts)| {
            let close = closes.get(i).copied().flatten()?;
            let date = DateTime::from_timestamp(ts, 0)?.date_naive();
            Some(PricePoint {
                date,
                close,
                volume: volumes.get(i).copied().flatten(),
            })
        })
        .collect();

    points.sort_by_key(|p| p.date);
    Ok(points)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimeseriesEntry {
    as_of_date: String,
    #[serde(default)]
    reported_value: Option<RawNumber>,
}

/// Parse a fundamentals-timeseries body into one statement.
///
/// Rows follow the order of `types`; columns are the union of reporting dates,
/// newest first, so every row lines up on the same fiscal years.
pub fn parse_timeseries(body: &str, types: &[&str]) -> Result<Statement, CompassError> {
    let root: Value =
        serde_json::from_str(body).map_err(|e| CompassError::ParseError(e.to_string()))?;

    let results = root
        .pointer("/timeseries/result")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut series: HashMap<String, Vec<(NaiveDate, f64)>> = HashMap::new();
    let mut dates: BTreeSet<NaiveDate> = BTreeSet::new();

    for result in &results {
        let Some(type_key) = result.pointer("/meta/type/0").and_then(Value::as_str) else {
            continue;
        };
        let Some(entries) = result.get(type_key).and_then(Value::as_array) else {
            continue;
        };

        let mut values = Vec::new();
        for entry in entries.iter().filter(|e| !e.is_null()) {
            let Ok(entry) = serde_json::from_value::<TimeseriesEntry>(entry.clone()) else {
                continue;
            };
            let Ok(date) = NaiveDate::parse_from_str(&entry.as_of_date, "%Y-%m-%d") else {
                continue;
            };
            if let Some(raw) = entry.reported_value.and_then(|v| v.raw) {
                dates.insert(date);
                values.push((date, raw));
            }
        }

        if !values.is_empty() {
            let stripped = type_key.strip_prefix("annual").unwrap_or(type_key);
            series.insert(stripped.to_string(), values);
        }
    }

    let columns: Vec<NaiveDate> = dates.into_iter().rev().collect();
    let rows = types
        .iter()
        .filter_map(|t| {
            let values = series.get(*t)?;
            let cells = columns
                .iter()
                .map(|d| values.iter().find(|(vd, _)| vd == d).map(|(_, v)| *v))
                .collect();
            Some(StatementRow::new(humanize_type(t), cells))
        })
        .collect();

    Ok(Statement::new(rows))
}

#[derive(Debug, Default, Deserialize)]
struct RawNumber {
    #[serde(default)]
    raw: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryEnvelope {
    quote_summary: QuoteSummaryBody,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryBody {
    #[serde(default)]
    result: Option<Vec<QuoteSummaryResult>>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResult {
    #[serde(default)]
    price: Option<PriceModule>,
    #[serde(default)]
    summary_detail: Option<SummaryDetailModule>,
    #[serde(default)]
    default_key_statistics: Option<KeyStatisticsModule>,
    #[serde(default)]
    financial_data: Option<FinancialDataModule>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceModule {
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    market_cap: RawNumber,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryDetailModule {
    #[serde(default)]
    currency: Option<String>,
    #[serde(default, rename = "trailingPE")]
    trailing_pe: RawNumber,
    #[serde(default)]
    market_cap: RawNumber,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyStatisticsModule {
    #[serde(default)]
    shares_outstanding: RawNumber,
    #[serde(default)]
    trailing_eps: RawNumber,
    #[serde(default)]
    forward_eps: RawNumber,
    #[serde(default)]
    peg_ratio: RawNumber,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinancialDataModule {
    #[serde(default)]
    financial_currency: Option<String>,
    #[serde(default)]
    total_debt: RawNumber,
    #[serde(default)]
    total_cash: RawNumber,
    #[serde(default)]
    ebitda: RawNumber,
    #[serde(default)]
    free_cashflow: RawNumber,
}

/// Parse a `/v10/finance/quoteSummary` body. Missing modules leave fields `None`.
pub fn parse_quote_summary(body: &str, symbol: &str) -> Result<QuoteSnapshot, CompassError> {
    let envelope: QuoteSummaryEnvelope =
        serde_json::from_str(body).map_err(|e| CompassError::ParseError(e.to_string()))?;

    if let Some(err) = envelope.quote_summary.error.filter(|e| !e.is_null()) {
        tracing::debug!("quoteSummary error for {}: {}", symbol, err);
        return Err(CompassError::NoData(symbol.to_string()));
    }

    let result = envelope
        .quote_summary
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| CompassError::NoData(symbol.to_string()))?;

    let price = result.price.unwrap_or_default();
    let detail = result.summary_detail.unwrap_or_default();
    let stats = result.default_key_statistics.unwrap_or_default();
    let financial = result.financial_data.unwrap_or_default();

    Ok(QuoteSnapshot {
        currency: price
            .currency
            .or(detail.currency)
            .or(financial.financial_currency),
        shares_outstanding: stats.shares_outstanding.raw,
        market_cap: price.market_cap.raw.or(detail.market_cap.raw),
        trailing_eps: stats.trailing_eps.raw,
        forward_eps: stats.forward_eps.raw,
        trailing_pe: detail.trailing_pe.raw,
        peg_ratio: stats.peg_ratio.raw,
        total_debt: financial.total_debt.raw,
        total_cash: financial.total_cash.raw,
        ebitda: financial.ebitda.raw,
        free_cash_flow: financial.free_cashflow.raw,
    })
}
