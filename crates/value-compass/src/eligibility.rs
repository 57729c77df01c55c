use compass_core::{CompassError, IneligibleCategory};
use serde::{Deserialize, Serialize};

/// Caller-supplied classification of the subject company.
///
/// The capitalised-operating-income method is meaningless for balance-sheet
/// businesses, network-effect platforms and loss-to-profit turnarounds, so any
/// flag set here stops the valuation before a verdict is produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityProfile {
    pub is_financial: bool,
    pub is_platform: bool,
    pub is_turnaround: bool,
}

impl EligibilityProfile {
    pub fn tripped(&self) -> Vec<IneligibleCategory> {
        let mut categories = Vec::new();
        if self.is_financial {
            categories.push(IneligibleCategory::FinancialInstitution);
        }
        if self.is_platform {
            categories.push(IneligibleCategory::PlatformBusiness);
        }
        if self.is_turnaround {
            categories.push(IneligibleCategory::TurnaroundStory);
        }
        categories
    }

    pub fn is_eligible(&self) -> bool {
        !(self.is_financial || self.is_platform || self.is_turnaround)
    }

    /// Hard stop: `Err(Ineligible)` naming every tripped category.
    pub fn check(&self) -> Result<(), CompassError> {
        let tripped = self.tripped();
        if tripped.is_empty() {
            Ok(())
        } else {
            Err(CompassError::Ineligible(tripped))
        }
    }
}
