//! Eight-criterion financial health screen with an aggregate tier.

use compass_core::{NormalizedFinancials, RawFinancials};
use serde::{Deserialize, Serialize};

pub mod criteria;

pub use criteria::{
    compute_peg, CriterionId, CriterionStatus, HealthCriterion, Reading, ScreenInputs, PEG_SENTINEL,
};

/// Aggregate verdict from the automatic pass count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    /// 5 or more automatic passes
    TopTier,
    /// 3 or 4
    Middle,
    /// Fewer than 3: weak fundamentals
    WinterRisk,
}

impl Tier {
    pub fn from_score(score: usize) -> Self {
        match score {
            s if s >= 5 => Tier::TopTier,
            s if s >= 3 => Tier::Middle,
            _ => Tier::WinterRisk,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::TopTier => "Top Tier",
            Tier::Middle => "Middle",
            Tier::WinterRisk => "Winter Risk",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Tier::TopTier => "Strong fundamentals across the automatic checks",
            Tier::Middle => "Mixed fundamentals; review the failing criteria",
            Tier::WinterRisk => "Weak fundamentals; vulnerable in a downturn",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub symbol: String,
    /// Always eight rows in `CriterionId::ALL` order.
    pub criteria: Vec<HealthCriterion>,
    /// Passes among the automatically evaluated criteria.
    pub score: usize,
    /// Number of automatically evaluated criteria (the score's denominator).
    pub evaluated: usize,
    pub tier: Tier,
}

impl HealthReport {
    pub fn criterion(&self, id: CriterionId) -> Option<&HealthCriterion> {
        self.criteria.iter().find(|c| c.id == id)
    }
}

/// Evaluate all eight criteria for one identifier.
pub fn screen(normalized: &NormalizedFinancials, raw: &RawFinancials) -> HealthReport {
    let inputs = ScreenInputs::gather(normalized, raw);

    let criteria = CriterionId::ALL
        .iter()
        .map(|id| match id {
            CriterionId::Leverage => criteria::leverage(&inputs),
            CriterionId::InterestCoverage => criteria::interest_coverage(&inputs),
            CriterionId::CashGeneration => criteria::cash_generation(&inputs),
            CriterionId::AltmanZ => criteria::altman_z(&inputs),
            CriterionId::CustomerConcentration => criteria::customer_concentration(),
            CriterionId::Roic => criteria::roic(&inputs),
            CriterionId::ShareholderFriendliness => criteria::shareholder_friendliness(),
            CriterionId::Peg => criteria::peg(&inputs),
        })
        .collect::<Vec<_>>();

    let evaluated = criteria.iter().filter(|c| !c.id.is_manual()).count();
    let score = criteria
        .iter()
        .filter(|c| !c.id.is_manual() && c.passed())
        .count();
    let tier = Tier::from_score(score);

    for c in criteria.iter().filter(|c| matches!(c.reading, Reading::Unavailable { .. })) {
        tracing::debug!("{}: {} unavailable ({})", normalized.symbol, c.name, c.display_value());
    }
    tracing::info!("{}: health score {}/{} -> {}", normalized.symbol, score, evaluated, tier.as_str());

    HealthReport {
        symbol: normalized.symbol.clone(),
        criteria,
        score,
        evaluated,
        tier,
    }
}
