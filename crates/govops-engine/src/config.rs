//! Engine configuration: one options struct with nested per-manager
//! sections, validated once at construction.

use chrono::Duration;
use govops_trust::TrustLevel;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
#[error("invalid config field '{field}': {message}")]
pub struct ConfigError {
    pub field: String,
    pub message: String,
}

/// Trust-manager section of [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct TrustConfig {
    pub default_level: u8,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            default_level: TrustLevel::Observer.as_u8(),
        }
    }
}

/// Budget-manager section of [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct BudgetConfig {
    pub allow_overspend: bool,
    pub default_period: Duration,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            allow_overspend: false,
            default_period: Duration::days(30),
        }
    }
}

/// Audit-ledger section of [`EngineConfig`].
#[derive(Debug, Clone, Default)]
pub struct AuditConfig {
    /// `0` means unbounded. Negative values are rejected at construction;
    /// since this is unsigned, a caller supplying a negative number from a
    /// signed source must reject it before reaching here.
    pub max_records: usize,
}

/// Top-level engine configuration. Validated once by
/// [`crate::pipeline::Engine::new`]; invalid values return a
/// [`ConfigError`] naming the offending field.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub default_scope: String,
    pub default_agent_id: String,
    pub trust: TrustConfig,
    pub budget: BudgetConfig,
    pub audit: AuditConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_scope: "default".to_string(),
            default_agent_id: String::new(),
            trust: TrustConfig::default(),
            budget: BudgetConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl EngineConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.default_scope.is_empty() {
            return Err(ConfigError {
                field: "defaultScope".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.trust.default_level > 5 {
            return Err(ConfigError {
                field: "trust.defaultLevel".to_string(),
                message: format!("must lie in [0,5], got {}", self.trust.default_level),
            });
        }
        if self.budget.default_period < Duration::zero() {
            return Err(ConfigError {
                field: "budget.defaultPeriod".to_string(),
                message: "must not be negative".to_string(),
            });
        }
        Ok(())
    }
}
