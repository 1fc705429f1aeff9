//! Per-category spending envelopes with period rollover.
//!
//! Budgets are always static — no adaptive budgeting, no forecasting. An
//! [`Envelope`] tracks a limit, settled spend, and optional committed
//! (reserved-not-yet-settled) amount against a period that resets lazily on
//! access. [`BudgetManager`] owns the table of envelopes and enforces
//! strict or permissive overspend behavior on `record`.

#![forbid(unsafe_code)]

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{info, warn};

/// An envelope's reset cadence. `Total` never resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Total,
    For(Duration),
}

/// A named spending bucket with a static limit that resets on a period
/// boundary. Uniquely keyed by `category`.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub category: String,
    pub limit: f64,
    pub period: Period,
    pub spent: f64,
    /// Reserved-not-yet-settled amount. Cleared on rollover, same as `spent`
    /// — see the committed-amount rollover decision recorded in DESIGN.md.
    pub committed: f64,
    pub starts_at: DateTime<Utc>,
}

impl Envelope {
    pub fn available(&self) -> f64 {
        (self.limit - self.spent - self.committed).max(0.0)
    }

    fn needs_rollover(&self, now: DateTime<Utc>) -> bool {
        match self.period {
            Period::Total => false,
            Period::For(period) => now > self.starts_at + period,
        }
    }

    fn rollover_if_elapsed(&mut self, now: DateTime<Utc>) {
        if self.needs_rollover(now) {
            self.spent = 0.0;
            self.committed = 0.0;
            self.starts_at = now;
        }
    }
}

/// Result of [`BudgetManager::check`]. The zero value (`Default::default()`)
/// is what a short-circuited pipeline stage leaves behind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BudgetCheckResult {
    pub permitted: bool,
    pub available: f64,
    pub requested: f64,
    pub category: String,
    pub reason: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum BudgetError {
    #[error("category must not be empty")]
    EmptyCategory,
    #[error("limit must be >= 0, got {0}")]
    InvalidLimit(f64),
    #[error("amount must be >= 0, got {0}")]
    InvalidAmount(f64),
    #[error("envelope for category '{0}' already exists")]
    EnvelopeExists(String),
    #[error("no envelope found for category '{0}'")]
    EnvelopeNotFound(String),
    #[error("budget denied for category '{category}': requested {requested}, available {available}")]
    BudgetDenied {
        category: String,
        requested: f64,
        available: f64,
    },
}

pub type Result<T> = std::result::Result<T, BudgetError>;

/// Owns the category → envelope table and enforces overspend policy.
pub struct BudgetManager {
    envelopes: RwLock<HashMap<String, Envelope>>,
    default_period: Duration,
    allow_overspend: bool,
}

impl BudgetManager {
    pub fn new(default_period: Duration, allow_overspend: bool) -> Self {
        Self {
            envelopes: RwLock::new(HashMap::new()),
            default_period,
            allow_overspend,
        }
    }

    /// Register a new envelope. `period == Period::For(Duration::zero())`
    /// substitutes the manager's configured default period.
    pub fn create_envelope(&self, category: &str, limit: f64, period: Period) -> Result<Envelope> {
        if category.is_empty() {
            return Err(BudgetError::EmptyCategory);
        }
        if limit < 0.0 {
            return Err(BudgetError::InvalidLimit(limit));
        }

        let mut envelopes = self.envelopes.write();
        if envelopes.contains_key(category) {
            return Err(BudgetError::EnvelopeExists(category.to_string()));
        }

        let period = match period {
            Period::For(d) if d == Duration::zero() => Period::For(self.default_period),
            other => other,
        };

        let envelope = Envelope {
            category: category.to_string(),
            limit,
            period,
            spent: 0.0,
            committed: 0.0,
            starts_at: Utc::now(),
        };

        info!(category = %category, limit, "envelope created");
        envelopes.insert(category.to_string(), envelope.clone());
        Ok(envelope)
    }

    /// Pure read (aside from lazy rollover bookkeeping):
    /// `permitted := amount <= available` (ties permit). Never errors;
    /// a missing envelope denies with a descriptive reason instead.
    pub fn check(&self, category: &str, amount: f64) -> BudgetCheckResult {
        let mut envelopes = self.envelopes.write();
        let Some(envelope) = envelopes.get_mut(category) else {
            return BudgetCheckResult {
                permitted: false,
                available: 0.0,
                requested: amount,
                category: category.to_string(),
                reason: format!("no envelope exists for category '{category}'"),
            };
        };

        envelope.rollover_if_elapsed(Utc::now());
        let available = envelope.available();
        let permitted = amount <= available;

        let reason = if permitted {
            format!("budget available for category '{category}': {available} >= {amount}")
        } else {
            format!("budget exceeded for category '{category}': requested {amount}, available {available}")
        };

        BudgetCheckResult {
            permitted,
            available,
            requested: amount,
            category: category.to_string(),
            reason,
        }
    }

    /// Settle `amount` against `category`. In strict mode (the default),
    /// fails with [`BudgetError::BudgetDenied`] when `amount > available`.
    /// In permissive mode, records the overspend without error.
    pub fn record(&self, category: &str, amount: f64) -> Result<()> {
        if amount < 0.0 {
            return Err(BudgetError::InvalidAmount(amount));
        }

        let mut envelopes = self.envelopes.write();
        let envelope = envelopes
            .get_mut(category)
            .ok_or_else(|| BudgetError::EnvelopeNotFound(category.to_string()))?;

        envelope.rollover_if_elapsed(Utc::now());
        let available = envelope.available();

        if amount > available && !self.allow_overspend {
            return Err(BudgetError::BudgetDenied {
                category: category.to_string(),
                requested: amount,
                available,
            });
        }

        if amount > available {
            warn!(category = %category, requested = amount, available, "recording overspend in permissive mode");
        }

        envelope.spent += amount;
        info!(category = %category, amount, "budget recorded");
        Ok(())
    }

    /// Reserve `amount` of headroom against `category` without settling it.
    /// Part of the optional committed-amount extension; implementers
    /// wanting atomic check-and-reserve semantics should call this while
    /// holding the result of [`Self::check`] fresh.
    pub fn reserve(&self, category: &str, amount: f64) -> Result<()> {
        if amount < 0.0 {
            return Err(BudgetError::InvalidAmount(amount));
        }
        let mut envelopes = self.envelopes.write();
        let envelope = envelopes
            .get_mut(category)
            .ok_or_else(|| BudgetError::EnvelopeNotFound(category.to_string()))?;

        envelope.rollover_if_elapsed(Utc::now());
        let available = envelope.available();
        if amount > available && !self.allow_overspend {
            return Err(BudgetError::BudgetDenied {
                category: category.to_string(),
                requested: amount,
                available,
            });
        }
        envelope.committed += amount;
        Ok(())
    }

    /// Release a previously-reserved amount back to available headroom.
    pub fn release(&self, category: &str, amount: f64) -> Result<()> {
        if amount < 0.0 {
            return Err(BudgetError::InvalidAmount(amount));
        }
        let mut envelopes = self.envelopes.write();
        let envelope = envelopes
            .get_mut(category)
            .ok_or_else(|| BudgetError::EnvelopeNotFound(category.to_string()))?;
        envelope.committed = (envelope.committed - amount).max(0.0);
        Ok(())
    }

    /// Atomic check-then-record under a single lock hold, avoiding the
    /// check/settle race the pipeline's best-effort `WithBudgetRecord`
    /// convenience otherwise accepts.
    pub fn check_and_record(&self, category: &str, amount: f64) -> Result<BudgetCheckResult> {
        let mut envelopes = self.envelopes.write();
        let Some(envelope) = envelopes.get_mut(category) else {
            return Ok(BudgetCheckResult {
                permitted: false,
                available: 0.0,
                requested: amount,
                category: category.to_string(),
                reason: format!("no envelope exists for category '{category}'"),
            });
        };

        envelope.rollover_if_elapsed(Utc::now());
        let available = envelope.available();
        let permitted = amount <= available;

        if permitted {
            envelope.spent += amount;
        }

        let reason = if permitted {
            format!("budget available for category '{category}': {available} >= {amount}")
        } else {
            format!("budget exceeded for category '{category}': requested {amount}, available {available}")
        };

        Ok(BudgetCheckResult {
            permitted,
            available,
            requested: amount,
            category: category.to_string(),
            reason,
        })
    }

    pub fn envelope(&self, category: &str) -> Option<Envelope> {
        self.envelopes.read().get(category).cloned()
    }
}
