//! Canonical metric -> upstream label alias table.
//!
//! Statement labels vary across sources ("Operating Income" vs "Operating
//! Profit"), so rows are matched by substring patterns instead of exact keys.

use compass_core::{Statement, StatementRow};
use serde::{Deserialize, Serialize};

/// Canonical line items the engines consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    OperatingIncome,
    TotalDebt,
    CashAndEquivalents,
    Ebit,
    InterestExpense,
    Revenue,
    CapitalExpenditure,
    FreeCashFlow,
    WorkingCapital,
    CurrentAssets,
    CurrentLiabilities,
    TotalAssets,
    TotalLiabilities,
    RetainedEarnings,
}

/// Which statement a metric lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementKind {
    Income,
    Balance,
    CashFlow,
}

/// One acceptable label shape.
///
/// Every group in `all_of` must have at least one of its substrings in the
/// label, and none of `none_of` may appear. Matching is case-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelPattern {
    pub all_of: &'static [&'static [&'static str]],
    pub none_of: &'static [&'static str],
}

impl LabelPattern {
    pub const fn new(all_of: &'static [&'static [&'static str]]) -> Self {
        Self { all_of, none_of: &[] }
    }

    pub const fn excluding(self, none_of: &'static [&'static str]) -> Self {
        Self {
            all_of: self.all_of,
            none_of,
        }
    }

    pub fn matches(&self, label: &str) -> bool {
        self.all_of
            .iter()
            .all(|group| group.iter().any(|needle| label.contains(needle)))
            && !self.none_of.iter().any(|needle| label.contains(needle))
    }
}

const OPERATING_INCOME: &[LabelPattern] = &[LabelPattern::new(&[&["Operating"], &["Income", "Profit"]])];
const TOTAL_DEBT: &[LabelPattern] = &[LabelPattern::new(&[&["Total Debt"]])];
const CASH_AND_EQUIVALENTS: &[LabelPattern] = &[LabelPattern::new(&[&["Cash"], &["Equivalents"]])];
const EBIT: &[LabelPattern] = &[
    LabelPattern::new(&[&["EBIT"]]).excluding(&["EBITDA"]),
    LabelPattern::new(&[&["Operating"], &["Income", "Profit"]]),
];
const INTEREST_EXPENSE: &[LabelPattern] = &[LabelPattern::new(&[&["Interest Expense"]])];
const REVENUE: &[LabelPattern] = &[
    LabelPattern::new(&[&["Total Revenue"]]),
    LabelPattern::new(&[&["Revenue"]]).excluding(&["Cost"]),
];
const CAPITAL_EXPENDITURE: &[LabelPattern] = &[LabelPattern::new(&[&["Capital Expenditure"]])];
const FREE_CASH_FLOW: &[LabelPattern] = &[LabelPattern::new(&[&["Free Cash Flow"]])];
const WORKING_CAPITAL: &[LabelPattern] = &[LabelPattern::new(&[&["Working Capital"]])];
const CURRENT_ASSETS: &[LabelPattern] = &[LabelPattern::new(&[&["Current Assets"]]).excluding(&["Other", "Non Current"])];
const CURRENT_LIABILITIES: &[LabelPattern] =
    &[LabelPattern::new(&[&["Current Liabilities"]]).excluding(&["Other", "Non Current"])];
const TOTAL_ASSETS: &[LabelPattern] = &[LabelPattern::new(&[&["Total Assets"]])];
const TOTAL_LIABILITIES: &[LabelPattern] = &[LabelPattern::new(&[&["Total Liabilities"]])];
const RETAINED_EARNINGS: &[LabelPattern] = &[LabelPattern::new(&[&["Retained Earnings"]])];

impl Metric {
    pub const ALL: [Metric; 14] = [
        Metric::OperatingIncome,
        Metric::TotalDebt,
        Metric::CashAndEquivalents,
        Metric::Ebit,
        Metric::InterestExpense,
        Metric::Revenue,
        Metric::CapitalExpenditure,
        Metric::FreeCashFlow,
        Metric::WorkingCapital,
        Metric::CurrentAssets,
        Metric::CurrentLiabilities,
        Metric::TotalAssets,
        Metric::TotalLiabilities,
        Metric::RetainedEarnings,
    ];

    /// Patterns in priority order.
    pub fn aliases(&self) -> &'static [LabelPattern] {
        match self {
            Metric::OperatingIncome => OPERATING_INCOME,
            Metric::TotalDebt => TOTAL_DEBT,
            Metric::CashAndEquivalents => CASH_AND_EQUIVALENTS,
            Metric::Ebit => EBIT,
            Metric::InterestExpense => INTEREST_EXPENSE,
            Metric::Revenue => REVENUE,
            Metric::CapitalExpenditure => CAPITAL_EXPENDITURE,
            Metric::FreeCashFlow => FREE_CASH_FLOW,
            Metric::WorkingCapital => WORKING_CAPITAL,
            Metric::CurrentAssets => CURRENT_ASSETS,
            Metric::CurrentLiabilities => CURRENT_LIABILITIES,
            Metric::TotalAssets => TOTAL_ASSETS,
            Metric::TotalLiabilities => TOTAL_LIABILITIES,
            Metric::RetainedEarnings => RETAINED_EARNINGS,
        }
    }

    pub fn statement(&self) -> StatementKind {
        match self {
            Metric::OperatingIncome | Metric::Ebit | Metric::InterestExpense | Metric::Revenue => {
                StatementKind::Income
            }
            Metric::CapitalExpenditure | Metric::FreeCashFlow => StatementKind::CashFlow,
            _ => StatementKind::Balance,
        }
    }
}

/// First row matching `metric`: patterns are tried in priority order and,
/// within a pattern, the first row in statement order wins.
pub fn find_row(statement: &Statement, metric: Metric) -> Option<&StatementRow> {
    metric
        .aliases()
        .iter()
        .find_map(|pattern| statement.rows.iter().find(|row| pattern.matches(&row.label)))
}
