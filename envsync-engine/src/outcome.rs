//! Per-template outcomes and the run summary.

use chrono::{DateTime, Utc};

use envsync_core::{EnvironmentId, RevisionId, Signature};

use crate::error::FailureKind;
use crate::pipeline::RunMode;
use crate::reconcile::{Decision, DecisionReason};

/// Result of reconciling one template. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Environment name, or the source directory name when the template
    /// could not be parsed.
    pub name: String,
    /// `None` when the template never reached the reconciler.
    pub decision: Option<Decision>,
    pub reason: Option<DecisionReason>,
    pub succeeded: bool,
    pub failure: Option<FailureKind>,
    pub error_detail: Option<String>,
    pub signature: Option<Signature>,
    pub environment_id: Option<EnvironmentId>,
    /// Revision published by this run.
    pub revision_id: Option<RevisionId>,
}

impl RunOutcome {
    pub(crate) fn success(name: impl Into<String>, decision: Decision) -> Self {
        Self {
            name: name.into(),
            decision: Some(decision),
            reason: None,
            succeeded: true,
            failure: None,
            error_detail: None,
            signature: None,
            environment_id: None,
            revision_id: None,
        }
    }

    pub(crate) fn failure(
        name: impl Into<String>,
        decision: Option<Decision>,
        kind: FailureKind,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            decision,
            reason: None,
            succeeded: false,
            failure: Some(kind),
            error_detail: Some(detail.into()),
            signature: None,
            environment_id: None,
            revision_id: None,
        }
    }

    pub(crate) fn with_reason(mut self, reason: DecisionReason) -> Self {
        self.reason = Some(reason);
        self
    }

    pub(crate) fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = Some(signature);
        self
    }

    pub(crate) fn with_environment(mut self, id: Option<EnvironmentId>) -> Self {
        self.environment_id = id;
        self
    }

    pub(crate) fn with_revision(mut self, id: RevisionId) -> Self {
        self.revision_id = Some(id);
        self
    }
}

/// Aggregate of one run, outcomes sorted by name.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub mode: RunMode,
    pub outcomes: Vec<RunOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    fn count(&self, decision: Decision) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.succeeded && o.decision == Some(decision))
            .count()
    }

    pub fn created(&self) -> usize {
        self.count(Decision::Create)
    }

    pub fn revised(&self) -> usize {
        self.count(Decision::Revise)
    }

    pub fn unchanged(&self) -> usize {
        self.count(Decision::NoOp)
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.succeeded).count()
    }

    /// `true` when every template succeeded; `Create`/`Revise` still count
    /// as success.
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn outcome(&self, name: &str) -> Option<&RunOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }
}
