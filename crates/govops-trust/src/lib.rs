//! Scoped, optionally-expiring and decaying trust level assignments.
//!
//! Trust is always operator-set — there is no behavioral scoring, anomaly
//! detection, or automatic promotion here. [`TrustManager`] stores
//! assignments keyed by `(agent_id, scope)`; reading an assignment's
//! effective level applies expiry (a hard cliff back to the configured
//! default) and, optionally, a monotonically-decreasing decay strategy. The
//! stored assignment itself is never mutated by time.

#![forbid(unsafe_code)]

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use thiserror::Error;
use tracing::info;

/// The default scope name used when a caller passes an empty scope.
pub const DEFAULT_SCOPE: &str = "default";

/// A trust level in `[0, 5]`. Comparison is numeric; higher strictly
/// supersedes lower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum TrustLevel {
    Observer = 0,
    Monitor = 1,
    Suggest = 2,
    ActWithApproval = 3,
    ActAndReport = 4,
    Autonomous = 5,
}

impl TrustLevel {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for TrustLevel {
    type Error = TrustError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Observer),
            1 => Ok(Self::Monitor),
            2 => Ok(Self::Suggest),
            3 => Ok(Self::ActWithApproval),
            4 => Ok(Self::ActAndReport),
            5 => Ok(Self::Autonomous),
            other => Err(TrustError::InvalidTrustLevel(other)),
        }
    }
}

impl std::fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Observer => "observer",
            Self::Monitor => "monitor",
            Self::Suggest => "suggest",
            Self::ActWithApproval => "act_with_approval",
            Self::ActAndReport => "act_and_report",
            Self::Autonomous => "autonomous",
        };
        write!(f, "{s}")
    }
}

/// A monotonically-decreasing, reading-only transformation of the stored
/// assignment's level, applied on top of `getLevel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecayStrategy {
    /// After `ttl_ms` since `assigned_at`, the effective level collapses to
    /// [`TrustLevel::Observer`].
    Cliff { ttl_ms: u64 },
    /// After each `step_interval_ms` since `assigned_at`, the effective
    /// level decreases by one, clamped at [`TrustLevel::Observer`].
    Gradual { step_interval_ms: u64 },
}

impl DecayStrategy {
    fn apply(&self, assigned_level: TrustLevel, assigned_at: DateTime<Utc>, now: DateTime<Utc>) -> TrustLevel {
        let elapsed_ms = (now - assigned_at).num_milliseconds().max(0) as u64;
        match self {
            Self::Cliff { ttl_ms } => {
                if elapsed_ms >= *ttl_ms {
                    TrustLevel::Observer
                } else {
                    assigned_level
                }
            }
            Self::Gradual { step_interval_ms } => {
                if *step_interval_ms == 0 {
                    return TrustLevel::Observer;
                }
                let steps = (elapsed_ms / step_interval_ms) as u8;
                let lowered = assigned_level.as_u8().saturating_sub(steps);
                TrustLevel::try_from(lowered).unwrap_or(TrustLevel::Observer)
            }
        }
    }
}

/// A scoped trust assignment. Uniquely keyed by `(agent_id, scope)`;
/// reassignment replaces the prior record rather than mutating it.
#[derive(Debug, Clone)]
pub struct TrustAssignment {
    pub agent_id: String,
    pub scope: String,
    pub level: TrustLevel,
    pub assigned_at: DateTime<Utc>,
    pub assigned_by: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub decay: Option<DecayStrategy>,
}

/// Options for [`TrustManager::set_level`].
#[derive(Debug, Clone, Default)]
pub struct SetLevelOptions {
    pub assigned_by: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub decay: Option<DecayStrategy>,
}

/// Result of [`TrustManager::check_level`]. Never carries an error —
/// governance denials are data, not failures. The zero value
/// (`Default::default()`) is what a short-circuited pipeline stage leaves
/// behind when this check never ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustCheckResult {
    pub permitted: bool,
    pub current_level: u8,
    pub required_level: u8,
    pub reason: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrustError {
    #[error("agent id must not be empty")]
    EmptyAgentId,
    #[error("invalid trust level {0}, must be in [0,5]")]
    InvalidTrustLevel(u8),
}

pub type Result<T> = std::result::Result<T, TrustError>;

fn normalize_scope(scope: &str) -> String {
    if scope.is_empty() {
        DEFAULT_SCOPE.to_string()
    } else {
        scope.to_string()
    }
}

/// Scoped trust assignments over a shared in-memory table.
pub struct TrustManager {
    assignments: RwLock<HashMap<(String, String), TrustAssignment>>,
    default_level: TrustLevel,
}

impl TrustManager {
    pub fn new(default_level: TrustLevel) -> Self {
        Self {
            assignments: RwLock::new(HashMap::new()),
            default_level,
        }
    }

    /// Assign `level` to `(agent_id, scope)`, replacing any prior assignment.
    pub fn set_level(
        &self,
        agent_id: &str,
        level: u8,
        scope: &str,
        opts: SetLevelOptions,
    ) -> Result<TrustAssignment> {
        if agent_id.is_empty() {
            return Err(TrustError::EmptyAgentId);
        }
        let level = TrustLevel::try_from(level)?;
        let scope = normalize_scope(scope);
        let assigned_by = opts.assigned_by.unwrap_or_else(|| "owner".to_string());

        let assignment = TrustAssignment {
            agent_id: agent_id.to_string(),
            scope: scope.clone(),
            level,
            assigned_at: Utc::now(),
            assigned_by,
            expires_at: opts.expires_at,
            decay: opts.decay,
        };

        info!(
            agent_id = %agent_id,
            scope = %scope,
            level = %level,
            "trust level assigned"
        );

        self.assignments
            .write()
            .insert((agent_id.to_string(), scope), assignment.clone());
        Ok(assignment)
    }

    /// The effective level for `(agent_id, scope)`: the configured default
    /// when no assignment exists or it has expired, otherwise the assigned
    /// level with decay applied. Never errors.
    pub fn get_level(&self, agent_id: &str, scope: &str) -> TrustLevel {
        let scope = normalize_scope(scope);
        let assignments = self.assignments.read();
        let Some(assignment) = assignments.get(&(agent_id.to_string(), scope)) else {
            return self.default_level;
        };

        let now = Utc::now();
        if let Some(expires_at) = assignment.expires_at {
            if now > expires_at {
                return self.default_level;
            }
        }

        match &assignment.decay {
            Some(decay) => decay.apply(assignment.level, assignment.assigned_at, now),
            None => assignment.level,
        }
    }

    /// `permitted := getLevel(...) >= required`. Never errors.
    pub fn check_level(&self, agent_id: &str, required: TrustLevel, scope: &str) -> TrustCheckResult {
        let current = self.get_level(agent_id, scope);
        let permitted = current >= required;
        let reason = if permitted {
            format!(
                "agent '{agent_id}' trust level {current} meets required level {required}"
            )
        } else {
            format!(
                "agent '{agent_id}' trust level {current} is below required level {required}"
            )
        };

        TrustCheckResult {
            permitted,
            current_level: current.as_u8(),
            required_level: required.as_u8(),
            reason,
        }
    }
}

impl Default for TrustManager {
    fn default() -> Self {
        Self::new(TrustLevel::Observer)
    }
}
