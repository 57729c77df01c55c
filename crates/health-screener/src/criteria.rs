//! The eight health criteria. Each one is computed on its own; a missing input
//! degrades only that criterion.

use compass_core::{Figure, NormalizedFinancials, RawFinancials};
use metric_normalizer::{latest_value, Metric};
use serde::{Deserialize, Serialize};

pub const MAX_LEVERAGE: f64 = 2.5;
pub const MIN_INTEREST_COVERAGE: f64 = 5.0;
pub const MIN_ALTMAN_Z: f64 = 3.0;
pub const MIN_ROIC_PCT: f64 = 10.0;
pub const MAX_PEG: f64 = 1.0;
/// Computed PEG for non-positive growth or P/E. Guaranteed to fail.
pub const PEG_SENTINEL: f64 = 99.0;
pub const CORPORATE_TAX_RATE: f64 = 0.21;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CriterionId {
    Leverage,
    InterestCoverage,
    CashGeneration,
    AltmanZ,
    CustomerConcentration,
    Roic,
    ShareholderFriendliness,
    Peg,
}

impl CriterionId {
    /// Report order.
    pub const ALL: [CriterionId; 8] = [
        CriterionId::Leverage,
        CriterionId::InterestCoverage,
        CriterionId::CashGeneration,
        CriterionId::AltmanZ,
        CriterionId::CustomerConcentration,
        CriterionId::Roic,
        CriterionId::ShareholderFriendliness,
        CriterionId::Peg,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CriterionId::Leverage => "Leverage (Net Debt / EBITDA)",
            CriterionId::InterestCoverage => "Interest Coverage",
            CriterionId::CashGeneration => "Cash Generation (FCF vs CapEx)",
            CriterionId::AltmanZ => "Bankruptcy Resistance (Altman Z)",
            CriterionId::CustomerConcentration => "Customer Concentration",
            CriterionId::Roic => "Capital Efficiency (ROIC)",
            CriterionId::ShareholderFriendliness => "Shareholder Friendliness (Dilution)",
            CriterionId::Peg => "Valuation (PEG)",
        }
    }

    pub fn threshold(&self) -> &'static str {
        match self {
            CriterionId::Leverage => "<= 2.5x",
            CriterionId::InterestCoverage => ">= 5.0x",
            CriterionId::CashGeneration => "FCF > |CapEx|",
            CriterionId::AltmanZ => "> 3.0",
            CriterionId::CustomerConcentration => "manual check",
            CriterionId::Roic => "> 10%",
            CriterionId::ShareholderFriendliness => "manual check",
            CriterionId::Peg => "< 1.0",
        }
    }

    /// Criteria that cannot be computed from statement data.
    pub fn is_manual(&self) -> bool {
        matches!(self, CriterionId::CustomerConcentration | CriterionId::ShareholderFriendliness)
    }
}

/// What was measured for a criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reading {
    Ratio { value: f64 },
    Flag { value: bool },
    /// Inputs were missing or degenerate.
    Unavailable { reason: String },
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CriterionStatus {
    Pass,
    Fail,
    Manual,
}

impl CriterionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CriterionStatus::Pass => "PASS",
            CriterionStatus::Fail => "FAIL",
            CriterionStatus::Manual => "MANUAL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCriterion {
    pub id: CriterionId,
    pub name: String,
    pub threshold: String,
    pub reading: Reading,
    pub status: CriterionStatus,
}

impl HealthCriterion {
    fn new(id: CriterionId, reading: Reading, status: CriterionStatus) -> Self {
        Self {
            id,
            name: id.name().to_string(),
            threshold: id.threshold().to_string(),
            reading,
            status,
        }
    }

    fn ratio(id: CriterionId, value: f64, pass: bool) -> Self {
        let status = if pass { CriterionStatus::Pass } else { CriterionStatus::Fail };
        Self::new(id, Reading::Ratio { value }, status)
    }

    fn flag(id: CriterionId, value: bool) -> Self {
        let status = if value { CriterionStatus::Pass } else { CriterionStatus::Fail };
        Self::new(id, Reading::Flag { value }, status)
    }

    fn unavailable(id: CriterionId, reason: impl Into<String>) -> Self {
        Self::new(id, Reading::Unavailable { reason: reason.into() }, CriterionStatus::Fail)
    }

    fn manual(id: CriterionId) -> Self {
        Self::new(id, Reading::Manual, CriterionStatus::Manual)
    }

    /// Computed ratio; `None` for flags, manual checks and data failures.
    pub fn ratio_value(&self) -> Option<f64> {
        match self.reading {
            Reading::Ratio { value } => Some(value),
            _ => None,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == CriterionStatus::Pass
    }

    pub fn display_value(&self) -> String {
        match &self.reading {
            Reading::Ratio { value } if self.id == CriterionId::Roic => format!("{:.1}%", value),
            Reading::Ratio { value } => format!("{:.2}", value),
            Reading::Flag { value } => (if *value { "yes" } else { "no" }).to_string(),
            Reading::Unavailable { reason } => format!("N/A ({})", reason),
            Reading::Manual => "check manually".to_string(),
        }
    }
}

/// Unscaled inputs gathered from the quote snapshot and statements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScreenInputs {
    pub total_debt: Figure,
    pub total_cash: Figure,
    pub ebitda: Figure,
    pub ebit: Figure,
    pub interest_expense: Figure,
    pub free_cash_flow: Figure,
    pub capital_expenditure: Figure,
    pub working_capital: Figure,
    pub total_assets: Figure,
    pub retained_earnings: Figure,
    pub total_liabilities: Figure,
    pub revenue: Figure,
    pub market_cap: Figure,
    pub trailing_pe: Figure,
    pub trailing_eps: Figure,
    pub forward_eps: Figure,
    pub peg_ratio: Figure,
}

impl ScreenInputs {
    /// Quote fields first, statement rows and normalized figures as fallbacks.
    pub fn gather(normalized: &NormalizedFinancials, raw: &RawFinancials) -> Self {
        let quote = &raw.quote;
        let unscale = |f: Figure| f.map(|v| v * normalized.unit_divisor);
        let or = |primary: Figure, fallback: Figure| if primary.is_known() { primary } else { fallback };

        let working_capital = {
            let reported = latest_value(raw, Metric::WorkingCapital);
            let derived = match (
                latest_value(raw, Metric::CurrentAssets),
                latest_value(raw, Metric::CurrentLiabilities),
            ) {
                (Figure::Known(a), Figure::Known(l)) => Figure::Known(a - l),
                _ => Figure::Unknown,
            };
            or(reported, derived)
        };

        Self {
            total_debt: or(Figure::from_option(quote.total_debt), unscale(normalized.total_debt)),
            total_cash: or(
                Figure::from_option(quote.total_cash),
                unscale(normalized.cash_and_equivalents),
            ),
            ebitda: Figure::from_option(quote.ebitda),
            ebit: latest_value(raw, Metric::Ebit),
            interest_expense: latest_value(raw, Metric::InterestExpense),
            free_cash_flow: or(
                Figure::from_option(quote.free_cash_flow),
                latest_value(raw, Metric::FreeCashFlow),
            ),
            capital_expenditure: latest_value(raw, Metric::CapitalExpenditure),
            working_capital,
            total_assets: latest_value(raw, Metric::TotalAssets),
            retained_earnings: latest_value(raw, Metric::RetainedEarnings),
            total_liabilities: latest_value(raw, Metric::TotalLiabilities),
            revenue: latest_value(raw, Metric::Revenue),
            market_cap: Figure::from_option(quote.market_cap),
            trailing_pe: Figure::from_option(quote.trailing_pe),
            trailing_eps: Figure::from_option(quote.trailing_eps),
            forward_eps: Figure::from_option(quote.forward_eps),
            peg_ratio: Figure::from_option(quote.peg_ratio),
        }
    }
}

fn missing(names: &[(&'static str, Figure)]) -> Option<String> {
    let absent: Vec<&str> = names
        .iter()
        .filter(|(_, f)| !f.is_known())
        .map(|(n, _)| *n)
        .collect();
    if absent.is_empty() {
        None
    } else {
        Some(format!("missing {}", absent.join(", ")))
    }
}

/// 1. (debt - cash) / EBITDA <= 2.5. Missing debt or cash count as zero.
pub fn leverage(inputs: &ScreenInputs) -> HealthCriterion {
    let id = CriterionId::Leverage;
    let Figure::Known(ebitda) = inputs.ebitda else {
        return HealthCriterion::unavailable(id, "missing EBITDA");
    };
    if ebitda == 0.0 {
        return HealthCriterion::unavailable(id, "EBITDA is zero");
    }
    let ratio = (inputs.total_debt.value() - inputs.total_cash.value()) / ebitda;
    HealthCriterion::ratio(id, ratio, ebitda > 0.0 && ratio <= MAX_LEVERAGE)
}

/// 2. EBIT / |interest expense| >= 5.
pub fn interest_coverage(inputs: &ScreenInputs) -> HealthCriterion {
    let id = CriterionId::InterestCoverage;
    if let Some(reason) = missing(&[("EBIT", inputs.ebit), ("interest expense", inputs.interest_expense)]) {
        return HealthCriterion::unavailable(id, reason);
    }
    let interest = inputs.interest_expense.value().abs();
    if interest == 0.0 {
        return HealthCriterion::unavailable(id, "no interest expense reported");
    }
    let ratio = inputs.ebit.value() / interest;
    HealthCriterion::ratio(id, ratio, ratio >= MIN_INTEREST_COVERAGE)
}

/// 3. Free cash flow exceeds |capital expenditure|.
pub fn cash_generation(inputs: &ScreenInputs) -> HealthCriterion {
    let id = CriterionId::CashGeneration;
    if let Some(reason) = missing(&[
        ("free cash flow", inputs.free_cash_flow),
        ("capital expenditure", inputs.capital_expenditure),
    ]) {
        return HealthCriterion::unavailable(id, reason);
    }
    HealthCriterion::flag(
        id,
        inputs.free_cash_flow.value() > inputs.capital_expenditure.value().abs(),
    )
}

/// 4. Altman Z = 1.2A + 1.4B + 3.3C + 0.6D + 1.0E > 3.0.
pub fn altman_z(inputs: &ScreenInputs) -> HealthCriterion {
    let id = CriterionId::AltmanZ;
    if let Some(reason) = missing(&[
        ("working capital", inputs.working_capital),
        ("total assets", inputs.total_assets),
        ("retained earnings", inputs.retained_earnings),
        ("EBIT", inputs.ebit),
        ("market cap", inputs.market_cap),
        ("total liabilities", inputs.total_liabilities),
        ("revenue", inputs.revenue),
    ]) {
        return HealthCriterion::unavailable(id, reason);
    }

    let total_assets = inputs.total_assets.value();
    let total_liabilities = inputs.total_liabilities.value();
    if total_assets <= 0.0 || total_liabilities <= 0.0 {
        return HealthCriterion::unavailable(id, "non-positive total assets or liabilities");
    }

    let a = inputs.working_capital.value() / total_assets;
    let b = inputs.retained_earnings.value() / total_assets;
    let c = inputs.ebit.value() / total_assets;
    let d = inputs.market_cap.value() / total_liabilities;
    let e = inputs.revenue.value() / total_assets;
    let z = 1.2 * a + 1.4 * b + 3.3 * c + 0.6 * d + 1.0 * e;

    HealthCriterion::ratio(id, z, z > MIN_ALTMAN_Z)
}

/// 6. EBIT x (1 - tax) / (debt + market cap - cash) > 10%, reported in percent.
pub fn roic(inputs: &ScreenInputs) -> HealthCriterion {
    let id = CriterionId::Roic;
    if let Some(reason) = missing(&[("EBIT", inputs.ebit), ("market cap", inputs.market_cap)]) {
        return HealthCriterion::unavailable(id, reason);
    }
    let invested = inputs.total_debt.value() + inputs.market_cap.value() - inputs.total_cash.value();
    if invested <= 0.0 {
        return HealthCriterion::unavailable(id, "non-positive invested capital");
    }
    let roic_pct = inputs.ebit.value() * (1.0 - CORPORATE_TAX_RATE) / invested * 100.0;
    HealthCriterion::ratio(id, roic_pct, roic_pct > MIN_ROIC_PCT)
}

/// PEG from a provided ratio, or P/E over forward EPS growth (%).
///
/// `None` when neither route has its inputs. Non-positive P/E, trailing EPS,
/// growth or provided PEG yield `PEG_SENTINEL`.
pub fn compute_peg(inputs: &ScreenInputs) -> Option<f64> {
    if let Figure::Known(peg) = inputs.peg_ratio {
        return Some(if peg > 0.0 { peg } else { PEG_SENTINEL });
    }

    let (Figure::Known(pe), Figure::Known(trailing), Figure::Known(forward)) =
        (inputs.trailing_pe, inputs.trailing_eps, inputs.forward_eps)
    else {
        return None;
    };

    // No usable growth rate off a loss base or shrinking earnings
    if pe <= 0.0 || trailing <= 0.0 || forward <= trailing {
        return Some(PEG_SENTINEL);
    }
    let growth_pct = (forward - trailing) / trailing * 100.0;
    Some(pe / growth_pct)
}

/// 8. PEG < 1.0.
pub fn peg(inputs: &ScreenInputs) -> HealthCriterion {
    let id = CriterionId::Peg;
    match compute_peg(inputs) {
        Some(value) => HealthCriterion::ratio(id, value, value < MAX_PEG),
        None => HealthCriterion::unavailable(id, "missing PEG, P/E or EPS estimates"),
    }
}

/// 5. Not derivable from filings.
pub fn customer_concentration() -> HealthCriterion {
    HealthCriterion::manual(CriterionId::CustomerConcentration)
}

/// 7. Not derivable from filings.
pub fn shareholder_friendliness() -> HealthCriterion {
    HealthCriterion::manual(CriterionId::ShareholderFriendliness)
}
