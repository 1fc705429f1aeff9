//! Agent/action consent register.
//!
//! Grants are a positive set keyed by `(agent_id, action)`. Revocation
//! flips a grant's `granted` flag rather than deleting it, so a revoked
//! grant stays discoverable and a later `record` reinstates it in place.

#![forbid(unsafe_code)]

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use thiserror::Error;
use tracing::info;

/// A single `(agent_id, action)` consent entry. Reinstated in place by a
/// later `record`, never replaced wholesale.
#[derive(Debug, Clone)]
pub struct ConsentGrant {
    pub agent_id: String,
    pub action: String,
    pub granted: bool,
    pub granted_by: String,
    pub updated_at: DateTime<Utc>,
}

/// Result of [`ConsentRegister::check`]. The zero value is what a
/// short-circuited pipeline stage leaves behind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsentCheckResult {
    pub permitted: bool,
    pub reason: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConsentError {
    #[error("agentId must not be empty")]
    EmptyAgentId,
    #[error("action must not be empty")]
    EmptyAction,
    #[error("grantedBy must not be empty")]
    EmptyGrantedBy,
    #[error("no active consent grant found for agent '{agent_id}' action '{action}'")]
    ConsentNotFound { agent_id: String, action: String },
}

pub type Result<T> = std::result::Result<T, ConsentError>;

/// Owns the `(agent_id, action)` → grant table.
#[derive(Default)]
pub struct ConsentRegister {
    grants: RwLock<HashMap<(String, String), ConsentGrant>>,
}

impl ConsentRegister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant consent, requiring all three arguments non-empty. Reinstates a
    /// previously revoked grant in place rather than replacing it.
    pub fn record(&self, agent_id: &str, action: &str, granted_by: &str) -> Result<ConsentGrant> {
        if agent_id.is_empty() {
            return Err(ConsentError::EmptyAgentId);
        }
        if action.is_empty() {
            return Err(ConsentError::EmptyAction);
        }
        if granted_by.is_empty() {
            return Err(ConsentError::EmptyGrantedBy);
        }

        let mut grants = self.grants.write();
        let key = (agent_id.to_string(), action.to_string());
        let grant = ConsentGrant {
            agent_id: agent_id.to_string(),
            action: action.to_string(),
            granted: true,
            granted_by: granted_by.to_string(),
            updated_at: Utc::now(),
        };
        info!(agent_id, action, "consent granted");
        grants.insert(key, grant.clone());
        Ok(grant)
    }

    /// `permitted := granted[(agentId, action)] == true`. Never errors —
    /// an absent entry simply denies.
    pub fn check(&self, action: &str, agent_id: &str) -> ConsentCheckResult {
        let grants = self.grants.read();
        match grants.get(&(agent_id.to_string(), action.to_string())) {
            Some(grant) if grant.granted => ConsentCheckResult {
                permitted: true,
                reason: format!("consent granted for agent '{agent_id}' action '{action}'"),
            },
            Some(_) => ConsentCheckResult {
                permitted: false,
                reason: format!("consent revoked for agent '{agent_id}' action '{action}'"),
            },
            None => ConsentCheckResult {
                permitted: false,
                reason: format!("no consent grant recorded for agent '{agent_id}' action '{action}'"),
            },
        }
    }

    /// Fails with [`ConsentError::ConsentNotFound`] unless an active
    /// (`granted == true`) grant currently exists.
    pub fn revoke(&self, agent_id: &str, action: &str) -> Result<()> {
        let mut grants = self.grants.write();
        let key = (agent_id.to_string(), action.to_string());
        match grants.get_mut(&key) {
            Some(grant) if grant.granted => {
                grant.granted = false;
                grant.updated_at = Utc::now();
                info!(agent_id, action, "consent revoked");
                Ok(())
            }
            _ => Err(ConsentError::ConsentNotFound {
                agent_id: agent_id.to_string(),
                action: action.to_string(),
            }),
        }
    }

    pub fn grant(&self, agent_id: &str, action: &str) -> Option<ConsentGrant> {
        self.grants.read().get(&(agent_id.to_string(), action.to_string())).cloned()
    }
}
