//! The evaluation pipeline: composes trust, budget, and consent checks in a
//! fixed order and records exactly one audit record per call.

use std::sync::Arc;

use chrono::Utc;
use govops_audit::{AuditError, AuditLedger, AuditStore, LogInput};
use govops_budget::{BudgetCheckResult, BudgetManager};
use govops_consent::{ConsentCheckResult, ConsentRegister};
use govops_trust::{TrustCheckResult, TrustLevel, TrustManager};
use thiserror::Error;
use tracing::warn;

use crate::cancel::CancelToken;
use crate::config::{ConfigError, EngineConfig};
use crate::decision::Decision;

/// Fails engine construction: either the supplied [`EngineConfig`] is
/// invalid, or the audit ledger could not load its existing records from
/// storage.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("audit ledger initialisation failed: {0}")]
    Audit(#[from] AuditError),
}

/// Fails `evaluate` itself, as distinct from a governance denial (which is
/// data carried on the returned [`Decision`], not an error).
#[derive(Debug, Error)]
pub enum EvaluateError {
    #[error("evaluation cancelled")]
    Cancelled,
    /// A storage failure occurred while writing the audit record. The
    /// decision was still computed in memory; callers should log it
    /// locally since it was never durably recorded.
    #[error("audit log failed: {source}")]
    AuditLog {
        decision: Box<Decision>,
        #[source]
        source: AuditError,
    },
}

/// Options for [`Engine::evaluate`], built fluently. Mirrors the reference
/// `WithX` functional-option names from the governance pipeline design.
#[derive(Debug, Clone, Default)]
pub struct EvaluateOptions {
    agent_id: Option<String>,
    scope: Option<String>,
    required_trust: Option<TrustLevel>,
    budget_check: Option<(String, f64)>,
    budget_record: bool,
    consent_action: Option<String>,
    consent_agent: Option<String>,
    cancel: Option<CancelToken>,
}

impl EvaluateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_required_trust(mut self, level: TrustLevel) -> Self {
        self.required_trust = Some(level);
        self
    }

    pub fn with_budget_check(mut self, category: impl Into<String>, amount: f64) -> Self {
        self.budget_check = Some((category.into(), amount));
        self
    }

    /// After a permit, best-effort settle the checked budget amount.
    /// Failure to settle does not reverse the permit.
    pub fn with_budget_record(mut self) -> Self {
        self.budget_record = true;
        self
    }

    /// Consent is checked against `action`, for the agent passed to
    /// [`Engine::evaluate`] unless [`Self::with_consent_agent`] overrides it.
    pub fn with_consent_check(mut self, action: impl Into<String>) -> Self {
        self.consent_action = Some(action.into());
        self
    }

    pub fn with_consent_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.consent_agent = Some(agent_id.into());
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Composes [`TrustManager`], [`BudgetManager`], [`ConsentRegister`], and
/// [`AuditLedger`] behind the single `evaluate` entry point. Subsystem
/// handles remain directly callable for out-of-band administration.
pub struct Engine {
    config: EngineConfig,
    trust: TrustManager,
    budget: BudgetManager,
    consent: ConsentRegister,
    audit: AuditLedger,
}

impl Engine {
    /// Validates `config`, then builds fresh managers over `store`. The
    /// audit ledger replays `store`'s existing records to recover its chain
    /// tip, so re-opening an engine over a populated store continues the
    /// same chain rather than starting a new one.
    pub fn new(store: Arc<dyn AuditStore>, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;

        let default_level = TrustLevel::try_from(config.trust.default_level)
            .expect("validated in range [0,5] by EngineConfig::validate");

        let trust = TrustManager::new(default_level);
        let budget = BudgetManager::new(config.budget.default_period, config.budget.allow_overspend);
        let consent = ConsentRegister::new();
        let audit = AuditLedger::new(store, config.audit.max_records)?;

        Ok(Self {
            config,
            trust,
            budget,
            consent,
            audit,
        })
    }

    pub fn trust(&self) -> &TrustManager {
        &self.trust
    }

    pub fn budget(&self) -> &BudgetManager {
        &self.budget
    }

    pub fn consent(&self) -> &ConsentRegister {
        &self.consent
    }

    pub fn audit(&self) -> &AuditLedger {
        &self.audit
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run a single action through Trust → Budget → Consent, in that fixed,
    /// non-configurable order, short-circuiting on the first denial.
    /// Exactly one audit record is written regardless of outcome.
    pub fn evaluate(&self, action: &str, opts: EvaluateOptions) -> Result<Decision, EvaluateError> {
        if let Some(token) = &opts.cancel {
            if token.is_cancelled() {
                return Err(EvaluateError::Cancelled);
            }
        }

        let agent_id = opts.agent_id.clone().unwrap_or_else(|| self.config.default_agent_id.clone());
        let scope = opts.scope.clone().unwrap_or_else(|| self.config.default_scope.clone());

        let mut decision = Decision {
            permitted: true,
            agent_id,
            action: action.to_string(),
            timestamp: Utc::now(),
            reason: String::new(),
            trust_result: TrustCheckResult::default(),
            budget_result: BudgetCheckResult::default(),
            consent_result: ConsentCheckResult::default(),
        };

        if let Some(required) = opts.required_trust {
            let result = self.trust.check_level(&decision.agent_id, required, &scope);
            decision.trust_result = result.clone();
            if !result.permitted {
                decision.permitted = false;
                decision.reason = result.reason;
                return self.finish(decision, &opts);
            }
        }

        if let Some((category, amount)) = &opts.budget_check {
            let result = self.budget.check(category, *amount);
            decision.budget_result = result.clone();
            if !result.permitted {
                decision.permitted = false;
                decision.reason = result.reason;
                return self.finish(decision, &opts);
            }
        }

        if let Some(consent_action) = &opts.consent_action {
            let consent_agent = opts.consent_agent.clone().unwrap_or_else(|| decision.agent_id.clone());
            let result = self.consent.check(consent_action, &consent_agent);
            decision.consent_result = result.clone();
            if !result.permitted {
                decision.permitted = false;
                decision.reason = result.reason;
                return self.finish(decision, &opts);
            }
        }

        decision.reason = format!("all governance checks passed for action '{}'", decision.action);

        if opts.budget_record {
            if let Some((category, amount)) = &opts.budget_check {
                if let Err(err) = self.budget.record(category, *amount) {
                    warn!(category = %category, error = %err, "best-effort budget settlement failed after permit");
                }
            }
        }

        self.finish(decision, &opts)
    }

    fn finish(&self, decision: Decision, opts: &EvaluateOptions) -> Result<Decision, EvaluateError> {
        let input = LogInput {
            agent_id: decision.agent_id.clone(),
            action: decision.action.clone(),
            permitted: decision.permitted,
            trust_level: opts.required_trust.map(|_| decision.trust_result.current_level),
            required_level: opts.required_trust.map(TrustLevel::as_u8),
            budget_used: opts.budget_check.as_ref().map(|(_, amount)| *amount),
            budget_remaining: opts.budget_check.as_ref().map(|_| decision.budget_result.available),
            reason: Some(decision.reason.clone()),
            metadata: None,
        };

        match self.audit.log(input) {
            Ok(_) => Ok(decision),
            Err(source) => Err(EvaluateError::AuditLog {
                decision: Box::new(decision),
                source,
            }),
        }
    }
}
