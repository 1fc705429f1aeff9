//! The in-memory result of [`crate::pipeline::Engine::evaluate`].

use chrono::{DateTime, Utc};
use govops_budget::BudgetCheckResult;
use govops_consent::ConsentCheckResult;
use govops_trust::TrustCheckResult;

/// A single governance decision. Sub-results are zero-valued
/// (`Default::default()`) for checks that did not run — callers use this to
/// assert the fixed Trust → Budget → Consent evaluation order from outside.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub permitted: bool,
    pub agent_id: String,
    pub action: String,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    pub trust_result: TrustCheckResult,
    pub budget_result: BudgetCheckResult,
    pub consent_result: ConsentCheckResult,
}
