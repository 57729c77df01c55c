//! Metric normalizer: raw statement rows + quote snapshot -> canonical,
//! divisor-scaled figures.
//!
//! Every field is looked up on its own. A missing row or cell leaves that
//! figure `Unknown` and never stops the remaining fields from being filled.

use compass_core::{Currency, Figure, NormalizedFinancials, RawFinancials, Statement};

pub mod aliases;

pub use aliases::{find_row, LabelPattern, Metric, StatementKind};

/// Number of annual operating income periods the valuation uses.
pub const OPERATING_INCOME_YEARS: usize = 3;

/// The statement a metric is read from.
pub fn statement_for(raw: &RawFinancials, kind: StatementKind) -> &Statement {
    match kind {
        StatementKind::Income => &raw.statements.income_statement,
        StatementKind::Balance => &raw.statements.balance_sheet,
        StatementKind::CashFlow => &raw.statements.cash_flow,
    }
}

/// Most recent value of `metric`, unscaled.
pub fn latest_value(raw: &RawFinancials, metric: Metric) -> Figure {
    let statement = statement_for(raw, metric.statement());
    Figure::from_option(find_row(statement, metric).and_then(|row| row.latest()))
}

/// Up to three newest operating income columns, returned oldest -> newest and unscaled.
/// Periods the source does not have stay `Unknown`.
pub fn operating_income_history(statement: &Statement) -> [Figure; OPERATING_INCOME_YEARS] {
    let mut history = [Figure::Unknown; OPERATING_INCOME_YEARS];
    if let Some(row) = find_row(statement, Metric::OperatingIncome) {
        // Source columns are newest first: column 0 -> slot 2
        for (age, slot) in (0..OPERATING_INCOME_YEARS).rev().enumerate() {
            history[slot] = Figure::from_option(row.value_at(age));
        }
    }
    history
}

/// Produce the canonical figure set for one identifier.
pub fn normalize(raw: &RawFinancials) -> NormalizedFinancials {
    let currency = Currency::from_code(raw.quote.currency.as_deref());
    let unit_divisor = currency.unit_divisor();
    let scale = |f: Figure| f.map(|v| v / unit_divisor);

    let operating_income = operating_income_history(&raw.statements.income_statement).map(scale);
    let total_debt = scale(latest_value(raw, Metric::TotalDebt));
    let cash_and_equivalents = scale(latest_value(raw, Metric::CashAndEquivalents));
    let shares_outstanding = Figure::from_option(raw.quote.shares_outstanding);
    let latest_close = Figure::from_option(raw.latest_close());

    let normalized = NormalizedFinancials {
        symbol: raw.symbol.clone(),
        currency,
        unit_divisor,
        operating_income,
        total_debt,
        cash_and_equivalents,
        shares_outstanding,
        latest_close,
    };

    let unknown = unknown_fields(&normalized);
    if !unknown.is_empty() {
        tracing::debug!("{}: fields defaulted to unknown: {}", raw.symbol, unknown.join(", "));
    }

    normalized
}

fn unknown_fields(n: &NormalizedFinancials) -> Vec<&'static str> {
    let mut fields = Vec::new();
    for (label, figure) in ["operating_income[y-2]", "operating_income[y-1]", "operating_income[latest]"]
        .into_iter()
        .zip(n.operating_income.iter())
    {
        if !figure.is_known() {
            fields.push(label);
        }
    }
    for (label, figure) in [
        ("total_debt", &n.total_debt),
        ("cash_and_equivalents", &n.cash_and_equivalents),
        ("shares_outstanding", &n.shares_outstanding),
        ("latest_close", &n.latest_close),
    ] {
        if !figure.is_known() {
            fields.push(label);
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use compass_core::{FinancialStatements, PricePoint, QuoteSnapshot, StatementRow};

    fn sample_raw(currency: Option<&str>) -> RawFinancials {
        RawFinancials {
            symbol: "005930.KS".to_string(),
            statements: FinancialStatements {
                income_statement: Statement::new(vec![
                    StatementRow::new("Total Revenue", vec![Some(9.0e12), Some(8.0e12), Some(7.0e12)]),
                    StatementRow::new("Operating Income", vec![Some(5.0e10), Some(8.0e10), Some(1.2e11), Some(9.9e11)]),
                ]),
                balance_sheet: Statement::new(vec![
                    StatementRow::new("Total Debt", vec![Some(3.0e11), Some(2.0e11)]),
                    StatementRow::new("Cash And Cash Equivalents", vec![Some(1.0e11)]),
                ]),
                cash_flow: Statement::default(),
            },
            quote: QuoteSnapshot {
                currency: currency.map(str::to_string),
                shares_outstanding: Some(100_000_000.0),
                ..Default::default()
            },
            price_history: vec![
                PricePoint { date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), close: 6700.0, volume: None },
                PricePoint { date: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(), close: 6800.0, volume: Some(10.0) },
            ],
        }
    }

    #[test]
    fn test_normalize_krw() {
        let n = normalize(&sample_raw(Some("KRW")));
        assert_eq!(n.currency, Currency::Krw);
        assert_eq!(n.unit_divisor, 100_000_000.0);
        assert_relative_eq!(n.operating_income[0].value(), 1200.0);
        assert_relative_eq!(n.operating_income[1].value(), 800.0);
        assert_relative_eq!(n.operating_income[2].value(), 500.0);
        assert_relative_eq!(n.total_debt.value(), 3000.0);
        assert_relative_eq!(n.cash_and_equivalents.value(), 1000.0);
        assert_eq!(n.shares_outstanding, Figure::Known(100_000_000.0));
        assert_eq!(n.latest_close, Figure::Known(6800.0));
    }

    #[test]
    fn test_missing_currency_defaults_to_krw() {
        let n = normalize(&sample_raw(None));
        assert_eq!(n.currency, Currency::Krw);
        assert_eq!(n.unit_divisor, 100_000_000.0);
    }

    #[test]
    fn test_other_currency_uses_millions() {
        let n = normalize(&sample_raw(Some("USD")));
        assert_eq!(n.unit_divisor, 1_000_000.0);
        assert_relative_eq!(n.total_debt.value(), 300_000.0);
    }

    #[test]
    fn test_short_history_leaves_oldest_unknown() {
        let mut raw = sample_raw(Some("KRW"));
        raw.statements.income_statement = Statement::new(vec![StatementRow::new(
            "Operating Profit",
            vec![Some(5.0e10), Some(8.0e10)],
        )]);
        let n = normalize(&raw);
        assert_eq!(n.operating_income[0], Figure::Unknown);
        assert_eq!(n.operating_income[1], Figure::Known(800.0));
        assert_eq!(n.operating_income[2], Figure::Known(500.0));
        assert_eq!(n.operating_income[0].value(), 0.0);
    }

    #[test]
    fn test_missing_rows_do_not_block_other_fields() {
        let mut raw = sample_raw(Some("KRW"));
        raw.statements.balance_sheet = Statement::default();
        raw.price_history.clear();
        let n = normalize(&raw);
        assert_eq!(n.total_debt, Figure::Unknown);
        assert_eq!(n.cash_and_equivalents, Figure::Unknown);
        assert_eq!(n.latest_close, Figure::Unknown);
        assert_eq!(n.latest_close.value(), 0.0);
        assert!(n.operating_income.iter().all(Figure::is_known));
        assert!(n.shares_outstanding.is_known());
    }

    #[test]
    fn test_genuine_zero_stays_known() {
        let mut raw = sample_raw(Some("KRW"));
        raw.statements.balance_sheet = Statement::new(vec![StatementRow::new("Total Debt", vec![Some(0.0)])]);
        let n = normalize(&raw);
        assert_eq!(n.total_debt, Figure::Known(0.0));
        assert_eq!(n.cash_and_equivalents, Figure::Unknown);
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let raw = sample_raw(Some("KRW"));
        let a = normalize(&raw);
        let b = normalize(&raw);
        assert_eq!(a, b);
        for (x, y) in a.operating_income.iter().zip(b.operating_income.iter()) {
            assert_eq!(x.value().to_bits(), y.value().to_bits());
        }
    }

    #[test]
    fn test_latest_value_is_unscaled() {
        let raw = sample_raw(Some("KRW"));
        assert_eq!(latest_value(&raw, Metric::Revenue), Figure::Known(9.0e12));
        assert_eq!(latest_value(&raw, Metric::InterestExpense), Figure::Unknown);
    }
}
