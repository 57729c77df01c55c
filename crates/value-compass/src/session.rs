//! Per-session override layer between fetched and human-verified inputs.

use compass_core::{CompassError, Figure, NormalizedFinancials};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{evaluate, EligibilityProfile, EvMultiple, ValuationInput, ValuationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValuationField {
    OperatingIncomeYear2,
    OperatingIncomeYear1,
    OperatingIncomeLatest,
    OneOffAdjustment,
    TotalDebt,
    Cash,
    SharesOutstanding,
    Multiple,
    CurrentPrice,
}

impl ValuationField {
    const OPERATING_INCOME: [ValuationField; 3] = [
        ValuationField::OperatingIncomeYear2,
        ValuationField::OperatingIncomeYear1,
        ValuationField::OperatingIncomeLatest,
    ];
}

/// Where the current value of a field came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FieldSource {
    #[default]
    Default,
    Fetched,
    Edited,
}

/// Valuation inputs held for one user session.
///
/// Owned by the caller and mutated through `&mut`. A fetch only overwrites
/// fields it actually found; everything else keeps its previous value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValuationSession {
    input: ValuationInput,
    current_price: Option<f64>,
    sources: HashMap<ValuationField, FieldSource>,
}

impl ValuationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh session with a configured default multiple. The multiple still reports `Default`.
    pub fn with_multiple(multiple: EvMultiple) -> Self {
        let mut session = Self::default();
        session.input.multiple = multiple;
        session
    }

    pub fn input(&self) -> &ValuationInput {
        &self.input
    }

    pub fn current_price(&self) -> Option<f64> {
        self.current_price
    }

    pub fn source(&self, field: ValuationField) -> FieldSource {
        self.sources.get(&field).copied().unwrap_or_default()
    }

    /// Adopt every known figure from a successful fetch. Returns the fields replaced.
    pub fn apply_fetched(&mut self, normalized: &NormalizedFinancials) -> Vec<ValuationField> {
        let mut replaced = Vec::new();
        self.input.unit_divisor = normalized.unit_divisor;

        for (slot, figure) in normalized.operating_income.iter().enumerate() {
            if let Figure::Known(v) = figure {
                self.input.operating_income[slot] = *v;
                replaced.push(ValuationField::OPERATING_INCOME[slot]);
            }
        }
        if let Figure::Known(v) = normalized.total_debt {
            self.input.total_debt = v;
            replaced.push(ValuationField::TotalDebt);
        }
        if let Figure::Known(v) = normalized.cash_and_equivalents {
            self.input.cash = v;
            replaced.push(ValuationField::Cash);
        }
        if let Figure::Known(v) = normalized.shares_outstanding {
            self.input.shares_outstanding = v;
            replaced.push(ValuationField::SharesOutstanding);
        }
        if let Figure::Known(v) = normalized.latest_close {
            self.current_price = Some(v);
            replaced.push(ValuationField::CurrentPrice);
        }

        for field in &replaced {
            self.sources.insert(*field, FieldSource::Fetched);
        }
        replaced
    }

    fn mark_edited(&mut self, field: ValuationField) {
        self.sources.insert(field, FieldSource::Edited);
    }

    /// `slot` 0 = year-2, 1 = year-1, 2 = latest.
    pub fn set_operating_income(&mut self, slot: usize, value: f64) -> Result<(), CompassError> {
        let field = *ValuationField::OPERATING_INCOME
            .get(slot)
            .ok_or_else(|| CompassError::InvalidInput(format!("operating income slot {} out of range", slot)))?;
        self.input.operating_income[slot] = value;
        self.mark_edited(field);
        Ok(())
    }

    pub fn set_one_off_adjustment(&mut self, value: f64) {
        self.input.one_off_adjustment = value;
        self.mark_edited(ValuationField::OneOffAdjustment);
    }

    pub fn set_total_debt(&mut self, value: f64) {
        self.input.total_debt = value;
        self.mark_edited(ValuationField::TotalDebt);
    }

    pub fn set_cash(&mut self, value: f64) {
        self.input.cash = value;
        self.mark_edited(ValuationField::Cash);
    }

    pub fn set_shares_outstanding(&mut self, value: f64) {
        self.input.shares_outstanding = value;
        self.mark_edited(ValuationField::SharesOutstanding);
    }

    pub fn set_multiple(&mut self, multiple: u8) -> Result<(), CompassError> {
        self.input.multiple = EvMultiple::new(multiple)?;
        self.mark_edited(ValuationField::Multiple);
        Ok(())
    }

    pub fn set_current_price(&mut self, price: f64) {
        self.current_price = Some(price);
        self.mark_edited(ValuationField::CurrentPrice);
    }

    /// Value the current inputs; a missing price classifies as awaiting input.
    pub fn evaluate(&self, profile: &EligibilityProfile) -> Result<ValuationResult, CompassError> {
        evaluate(profile, &self.input, self.current_price.unwrap_or(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Verdict;
    use compass_core::Currency;

    fn fetched(debt: Figure, close: Figure) -> NormalizedFinancials {
        NormalizedFinancials {
            symbol: "TEST".to_string(),
            currency: Currency::Krw,
            unit_divisor: 100_000_000.0,
            operating_income: [Figure::Known(1200.0), Figure::Known(800.0), Figure::Known(500.0)],
            total_debt: debt,
            cash_and_equivalents: Figure::Known(1000.0),
            shares_outstanding: Figure::Known(100_000_000.0),
            latest_close: close,
        }
    }

    #[test]
    fn test_new_session_uses_defaults() {
        let session = ValuationSession::new();
        assert_eq!(session.input().multiple.get(), 5);
        assert_eq!(session.current_price(), None);
        assert_eq!(session.source(ValuationField::TotalDebt), FieldSource::Default);

        let session = ValuationSession::with_multiple(EvMultiple::new(8).unwrap());
        assert_eq!(session.input().multiple.get(), 8);
        assert_eq!(session.source(ValuationField::Multiple), FieldSource::Default);
    }

    #[test]
    fn test_fetch_replaces_only_known_fields() {
        let mut session = ValuationSession::new();
        session.set_total_debt(4200.0);

        let replaced = session.apply_fetched(&fetched(Figure::Unknown, Figure::Known(6800.0)));
        assert!(!replaced.contains(&ValuationField::TotalDebt));
        assert_eq!(session.input().total_debt, 4200.0);
        assert_eq!(session.source(ValuationField::TotalDebt), FieldSource::Edited);
        assert_eq!(session.input().cash, 1000.0);
        assert_eq!(session.source(ValuationField::Cash), FieldSource::Fetched);
        assert_eq!(session.current_price(), Some(6800.0));
    }

    #[test]
    fn test_successful_field_fetch_resets_edit() {
        let mut session = ValuationSession::new();
        session.set_total_debt(4200.0);
        session.apply_fetched(&fetched(Figure::Known(3000.0), Figure::Unknown));
        assert_eq!(session.input().total_debt, 3000.0);
        assert_eq!(session.source(ValuationField::TotalDebt), FieldSource::Fetched);
    }

    #[test]
    fn test_one_off_and_multiple_survive_fetch() {
        let mut session = ValuationSession::new();
        session.set_one_off_adjustment(100.0);
        session.set_multiple(7).unwrap();
        session.apply_fetched(&fetched(Figure::Known(3000.0), Figure::Known(6800.0)));
        assert_eq!(session.input().one_off_adjustment, 100.0);
        assert_eq!(session.input().multiple.get(), 7);
    }

    #[test]
    fn test_invalid_edits_rejected() {
        let mut session = ValuationSession::new();
        assert!(session.set_multiple(11).is_err());
        assert_eq!(session.input().multiple.get(), 5);
        assert!(session.set_operating_income(3, 1.0).is_err());
    }

    #[test]
    fn test_session_evaluate_scenario_a() {
        let mut session = ValuationSession::new();
        session.apply_fetched(&fetched(Figure::Known(3000.0), Figure::Known(6800.0)));
        session.set_one_off_adjustment(100.0);
        let result = session.evaluate(&EligibilityProfile::default()).unwrap();
        assert_eq!(result.fair_value_per_share, 1000.0);
        assert!(matches!(result.verdict, Verdict::Reject { .. }));
    }

    #[test]
    fn test_session_without_price_awaits_input() {
        let mut session = ValuationSession::new();
        session.apply_fetched(&fetched(Figure::Known(3000.0), Figure::Unknown));
        session.set_one_off_adjustment(100.0);
        let result = session.evaluate(&EligibilityProfile::default()).unwrap();
        assert_eq!(result.verdict, Verdict::AwaitingPrice);
    }
}
