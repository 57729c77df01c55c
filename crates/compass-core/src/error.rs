use thiserror::Error;

use crate::types::IneligibleCategory;

#[derive(Error, Debug)]
pub enum CompassError {
    /// The data source could not be reached at all for this identifier.
    #[error("Market data gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("No data for {0}")]
    NoData(String),

    /// Eligibility gate tripped. Distinct from a computed Reject verdict.
    #[error("Subject is outside the valuation method's scope: {}", format_categories(.0))]
    Ineligible(Vec<IneligibleCategory>),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

fn format_categories(categories: &[IneligibleCategory]) -> String {
    categories
        .iter()
        .map(|c| c.label())
        .collect::<Vec<_>>()
        .join(", ")
}

impl CompassError {
    /// Errors the caller can recover from by keeping whatever overrides it already holds.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CompassError::GatewayUnavailable(_)
                | CompassError::ApiError(_)
                | CompassError::ParseError(_)
                | CompassError::NoData(_)
        )
    }
}
