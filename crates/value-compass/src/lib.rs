//! Conservative EV/operating-income valuation.
//!
//! Fair value = (worst of the last three operating incomes + one-off add-back)
//! x EV multiple, less net debt, spread over the share count.

use compass_core::{CompassError, KRW_UNIT_DIVISOR};
use serde::{Deserialize, Serialize};

pub mod eligibility;
pub mod session;

pub use eligibility::EligibilityProfile;
pub use session::{FieldSource, ValuationField, ValuationSession};

/// Safety margin (%) a price must clear for an APPROVE verdict.
pub const APPROVE_MARGIN_PCT: f64 = 30.0;

/// EV multiple applied to normalized operating income.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct EvMultiple(u8);

impl EvMultiple {
    pub const MIN: u8 = 3;
    pub const MAX: u8 = 10;
    pub const DEFAULT: u8 = 5;

    pub fn new(multiple: u8) -> Result<Self, CompassError> {
        if !(Self::MIN..=Self::MAX).contains(&multiple) {
            return Err(CompassError::InvalidInput(format!(
                "EV multiple must be between {} and {}, got {}",
                Self::MIN,
                Self::MAX,
                multiple
            )));
        }
        Ok(Self(multiple))
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64
    }
}

impl Default for EvMultiple {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl TryFrom<u8> for EvMultiple {
    type Error = CompassError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EvMultiple> for u8 {
    fn from(value: EvMultiple) -> Self {
        value.0
    }
}

/// Human-verified inputs to the valuation. Monetary fields are in
/// divisor-scaled units; `shares_outstanding` is a raw share count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationInput {
    /// Oldest to newest: year-2, year-1, latest.
    pub operating_income: [f64; 3],
    /// Add-back for one-time charges. Additive, may be negative.
    pub one_off_adjustment: f64,
    pub total_debt: f64,
    pub cash: f64,
    pub shares_outstanding: f64,
    pub multiple: EvMultiple,
    pub unit_divisor: f64,
}

impl Default for ValuationInput {
    fn default() -> Self {
        Self {
            operating_income: [0.0; 3],
            one_off_adjustment: 0.0,
            total_debt: 0.0,
            cash: 0.0,
            shares_outstanding: 0.0,
            multiple: EvMultiple::default(),
            unit_divisor: KRW_UNIT_DIVISOR,
        }
    }
}

/// Outcome of comparing fair value with the current price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// Fair value per share is zero or negative.
    Undeterminable,
    /// Fair value is known but there is no usable current price.
    AwaitingPrice,
    /// Margin above the entry threshold.
    Approve { margin_pct: f64 },
    /// Undervalued, margin insufficient.
    Watch { margin_pct: f64 },
    /// Overvalued. The two figures are measured against different bases.
    Reject {
        /// |margin| relative to fair value.
        overvaluation_pct: f64,
        /// Drop from the current price needed to reach fair value.
        required_drop_pct: f64,
    },
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Undeterminable => "UNDETERMINABLE",
            Verdict::AwaitingPrice => "AWAITING PRICE",
            Verdict::Approve { .. } => "APPROVE",
            Verdict::Watch { .. } => "WATCH",
            Verdict::Reject { .. } => "REJECT",
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Verdict::Undeterminable => {
                "Fair value is zero or negative; per-share value cannot be determined".to_string()
            }
            Verdict::AwaitingPrice => "Enter a current price to classify".to_string(),
            Verdict::Approve { margin_pct } => format!(
                "Safety margin {:.1}% exceeds the {:.0}% entry threshold",
                margin_pct, APPROVE_MARGIN_PCT
            ),
            Verdict::Watch { margin_pct } => format!(
                "Undervalued by {:.1}% but below the {:.0}% entry threshold",
                margin_pct, APPROVE_MARGIN_PCT
            ),
            Verdict::Reject {
                overvaluation_pct,
                required_drop_pct,
            } => format!(
                "Overvalued by {:.1}%; price must fall {:.1}% to reach fair value",
                overvaluation_pct, required_drop_pct
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationResult {
    pub worst_income: f64,
    pub normalized_income: f64,
    pub enterprise_value: f64,
    pub net_debt: f64,
    pub equity_value: f64,
    /// In currency units per share (not divisor-scaled).
    pub fair_value_per_share: f64,
    /// `None` when no usable price was given or fair value is not positive.
    pub safety_margin_pct: Option<f64>,
    pub verdict: Verdict,
}

/// Per-share fair value; 0 when the share count is not positive or the result is not finite.
pub fn fair_value_per_share(equity_value: f64, unit_divisor: f64, shares_outstanding: f64) -> f64 {
    if shares_outstanding.is_nan() || shares_outstanding <= 0.0 {
        return 0.0;
    }
    let fair_value = (equity_value * unit_divisor) / shares_outstanding;
    if fair_value.is_finite() {
        fair_value
    } else {
        0.0
    }
}

/// Classify `price` against `fair_value`. Returns the verdict and the safety margin.
pub fn classify(fair_value: f64, price: f64) -> (Verdict, Option<f64>) {
    if !fair_value.is_finite() || fair_value <= 0.0 {
        return (Verdict::Undeterminable, None);
    }
    if price <= 0.0 || !price.is_finite() {
        return (Verdict::AwaitingPrice, None);
    }

    // Multiply first so round inputs stay exact at the 30% boundary
    let margin = (fair_value - price) * 100.0 / fair_value;
    let verdict = if margin > APPROVE_MARGIN_PCT {
        Verdict::Approve { margin_pct: margin }
    } else if margin > 0.0 {
        Verdict::Watch { margin_pct: margin }
    } else {
        Verdict::Reject {
            overvaluation_pct: margin.abs(),
            required_drop_pct: (price - fair_value) * 100.0 / price,
        }
    };
    (verdict, Some(margin))
}

/// Run the valuation arithmetic without the eligibility gate.
pub fn valuate(input: &ValuationInput, price: f64) -> ValuationResult {
    let worst_income = input
        .operating_income
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min);
    let normalized_income = worst_income + input.one_off_adjustment;
    let enterprise_value = normalized_income * input.multiple.as_f64();
    let net_debt = input.total_debt - input.cash;
    let equity_value = enterprise_value - net_debt;
    let fair_value = fair_value_per_share(equity_value, input.unit_divisor, input.shares_outstanding);
    let (verdict, safety_margin_pct) = classify(fair_value, price);

    ValuationResult {
        worst_income,
        normalized_income,
        enterprise_value,
        net_debt,
        equity_value,
        fair_value_per_share: fair_value,
        safety_margin_pct,
        verdict,
    }
}

/// Gate, then value. Ineligible subjects never reach the arithmetic.
pub fn evaluate(
    profile: &EligibilityProfile,
    input: &ValuationInput,
    price: f64,
) -> Result<ValuationResult, CompassError> {
    profile.check()?;
    let result = valuate(input, price);
    tracing::debug!(
        "Valuation: worst={:.1} normalized={:.1} ev={:.1} fair={:.2} verdict={}",
        result.worst_income,
        result.normalized_income,
        result.enterprise_value,
        result.fair_value_per_share,
        result.verdict.label()
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn scenario_a() -> ValuationInput {
        ValuationInput {
            operating_income: [1200.0, 800.0, 500.0],
            one_off_adjustment: 100.0,
            total_debt: 3000.0,
            cash: 1000.0,
            shares_outstanding: 100_000_000.0,
            multiple: EvMultiple::new(5).unwrap(),
            unit_divisor: 100_000_000.0,
        }
    }

    #[test]
    fn test_scenario_a_reject() {
        let result = evaluate(&EligibilityProfile::default(), &scenario_a(), 6800.0).unwrap();
        assert_relative_eq!(result.worst_income, 500.0);
        assert_relative_eq!(result.normalized_income, 600.0);
        assert_relative_eq!(result.enterprise_value, 3000.0);
        assert_relative_eq!(result.net_debt, 2000.0);
        assert_relative_eq!(result.equity_value, 1000.0);
        assert_relative_eq!(result.fair_value_per_share, 1000.0);
        assert_relative_eq!(result.safety_margin_pct.unwrap(), -580.0);

        match result.verdict {
            Verdict::Reject {
                overvaluation_pct,
                required_drop_pct,
            } => {
                assert_relative_eq!(overvaluation_pct, 580.0);
                assert_relative_eq!(required_drop_pct, 5800.0 / 6800.0 * 100.0, epsilon = 1e-9);
                assert!(overvaluation_pct != required_drop_pct);
            }
            other => panic!("expected Reject, got {:?}", other),
        }
    }

    #[test]
    fn test_normalized_income_is_worst_plus_one_off() {
        for (incomes, one_off) in [
            ([100.0, -50.0, 20.0], 30.0),
            ([0.5, 0.25, 0.125], -0.125),
            ([1e9, 2e9, 3e9], 0.0),
        ] {
            let input = ValuationInput {
                operating_income: incomes,
                one_off_adjustment: one_off,
                ..scenario_a()
            };
            let result = valuate(&input, 0.0);
            let worst = incomes.iter().copied().fold(f64::INFINITY, f64::min);
            assert_eq!(result.worst_income, worst);
            assert_eq!(result.normalized_income, worst + one_off);
        }
    }

    #[test]
    fn test_non_positive_shares_yield_zero_fair_value() {
        for shares in [0.0, -1.0, -1e9] {
            let input = ValuationInput {
                shares_outstanding: shares,
                ..scenario_a()
            };
            let result = valuate(&input, 6800.0);
            assert_eq!(result.fair_value_per_share, 0.0);
            assert_eq!(result.verdict, Verdict::Undeterminable);
            assert_eq!(result.safety_margin_pct, None);
        }
    }

    #[test]
    fn test_non_finite_inputs_are_undeterminable() {
        let inputs = [
            ValuationInput { shares_outstanding: f64::NAN, ..scenario_a() },
            ValuationInput { total_debt: f64::NAN, ..scenario_a() },
            ValuationInput { cash: f64::INFINITY, ..scenario_a() },
            ValuationInput { one_off_adjustment: f64::NAN, ..scenario_a() },
        ];
        for input in inputs {
            let result = valuate(&input, 6800.0);
            assert_eq!(result.fair_value_per_share, 0.0);
            assert_eq!(result.verdict, Verdict::Undeterminable);
            assert_eq!(result.safety_margin_pct, None);
        }
        assert_eq!(classify(f64::NAN, 100.0), (Verdict::Undeterminable, None));
        assert_eq!(classify(f64::INFINITY, 100.0), (Verdict::Undeterminable, None));
    }

    #[test]
    fn test_negative_equity_is_undeterminable() {
        let input = ValuationInput {
            total_debt: 10_000.0,
            ..scenario_a()
        };
        let result = valuate(&input, 1000.0);
        assert!(result.fair_value_per_share < 0.0);
        assert_eq!(result.verdict, Verdict::Undeterminable);
    }

    #[test]
    fn test_zero_price_awaits_input() {
        let result = valuate(&scenario_a(), 0.0);
        assert_eq!(result.verdict, Verdict::AwaitingPrice);
        assert_eq!(result.safety_margin_pct, None);
        assert_relative_eq!(result.fair_value_per_share, 1000.0);
    }

    #[test]
    fn test_margin_boundaries() {
        // fair value 1000: price 700 -> margin exactly 30
        let (verdict, margin) = classify(1000.0, 700.0);
        assert_relative_eq!(margin.unwrap(), 30.0);
        assert!(matches!(verdict, Verdict::Watch { .. }));

        let (verdict, _) = classify(1000.0, 699.0);
        assert!(matches!(verdict, Verdict::Approve { .. }));

        // price == fair value -> margin exactly 0 -> Reject
        let (verdict, margin) = classify(1000.0, 1000.0);
        assert_eq!(margin, Some(0.0));
        match verdict {
            Verdict::Reject {
                overvaluation_pct,
                required_drop_pct,
            } => {
                assert_eq!(overvaluation_pct, 0.0);
                assert_eq!(required_drop_pct, 0.0);
            }
            other => panic!("expected Reject, got {:?}", other),
        }

        let (verdict, _) = classify(1000.0, 999.0);
        assert!(matches!(verdict, Verdict::Watch { .. }));
    }

    #[test]
    fn test_ineligible_subject_produces_no_result() {
        let profiles = [
            EligibilityProfile { is_financial: true, ..Default::default() },
            EligibilityProfile { is_platform: true, ..Default::default() },
            EligibilityProfile { is_turnaround: true, ..Default::default() },
        ];
        for profile in profiles {
            let err = evaluate(&profile, &scenario_a(), 100.0).unwrap_err();
            assert!(matches!(err, CompassError::Ineligible(_)));
        }
    }

    #[test]
    fn test_ev_multiple_bounds() {
        assert!(EvMultiple::new(2).is_err());
        assert!(EvMultiple::new(11).is_err());
        assert_eq!(EvMultiple::new(3).unwrap().get(), 3);
        assert_eq!(EvMultiple::new(10).unwrap().get(), 10);
        assert_eq!(EvMultiple::default().get(), 5);
    }

    #[test]
    fn test_smaller_multiple_lowers_fair_value() {
        let low = valuate(&ValuationInput { multiple: EvMultiple::new(3).unwrap(), ..scenario_a() }, 0.0);
        let high = valuate(&ValuationInput { multiple: EvMultiple::new(10).unwrap(), ..scenario_a() }, 0.0);
        assert!(low.fair_value_per_share < high.fair_value_per_share);
    }
}
