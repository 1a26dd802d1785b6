use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Result of one risk computation. Created fresh per authorization request;
/// audited and broadcast, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RiskAssessment {
    /// 0-100 inclusive.
    #[schema(example = 45)]
    pub score: u8,
    /// Per-factor contributions. When an override is active this contains
    /// the single `override` entry.
    pub factors: BTreeMap<String, u8>,
    pub override_active: bool,
}

impl RiskAssessment {
    /// Sum of factor contributions capped at 100. Equals `score` whenever no
    /// override is active.
    pub fn factor_total(&self) -> u8 {
        self.factors
            .values()
            .map(|v| u32::from(*v))
            .sum::<u32>()
            .min(100) as u8
    }
}
