//! Reconciliation decisions.
//!
//! | Observed | Recorded signature | Decision |
//! |---|---|---|
//! | absent | n/a | `Create` |
//! | present | equal | `NoOp` |
//! | present | differs or absent | `Revise` |
//!
//! A missing signature always means `Revise`. A template asking for
//! restricted revisions on an environment without one is also revised.
//!
//! Everything here is pure. Inputs are pre-fetched by the reader.

use std::fmt;

use envsync_core::{EnvironmentId, Signature, TemplateDefinition};

use crate::reader::RemoteEnvironment;

/// Action needed to align one environment with its template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    NoOp,
    Create,
    Revise,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::NoOp => "no-op",
            Decision::Create => "create",
            Decision::Revise => "revise",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which row of the decision table applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionReason {
    NotFound,
    SignatureMatches,
    SignatureDiffers,
    SignatureAbsent,
    RestrictionMissing,
}

impl DecisionReason {
    pub fn describe(&self) -> &'static str {
        match self {
            DecisionReason::NotFound => "environment does not exist",
            DecisionReason::SignatureMatches => "up to date",
            DecisionReason::SignatureDiffers => "template changed",
            DecisionReason::SignatureAbsent => "no recorded signature",
            DecisionReason::RestrictionMissing => "revision restriction missing",
        }
    }
}

/// A decision plus what the executor needs to carry it out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub decision: Decision,
    pub reason: DecisionReason,
    /// Freshly computed signature of the template.
    pub signature: Signature,
    /// Existing environment, for `NoOp` and `Revise`.
    pub environment: Option<EnvironmentId>,
    /// Whether the existing environment already has a restricted revision.
    pub has_restricted_revision: bool,
}

/// Decide what to do for `def` given what exists remotely.
pub fn reconcile(def: &TemplateDefinition, observed: Option<&RemoteEnvironment>) -> Reconciliation {
    let signature = Signature::compute(def);

    let Some(remote) = observed else {
        return Reconciliation {
            decision: Decision::Create,
            reason: DecisionReason::NotFound,
            signature,
            environment: None,
            has_restricted_revision: false,
        };
    };

    let (decision, reason) = match &remote.latest_revision_signature {
        None => (Decision::Revise, DecisionReason::SignatureAbsent),
        Some(recorded) if *recorded != signature => (Decision::Revise, DecisionReason::SignatureDiffers),
        Some(_) if def.restrictions.is_restricted && !remote.has_restricted_revision => {
            (Decision::Revise, DecisionReason::RestrictionMissing)
        }
        Some(_) => (Decision::NoOp, DecisionReason::SignatureMatches),
    };

    Reconciliation {
        decision,
        reason,
        signature,
        environment: Some(remote.id.clone()),
        has_restricted_revision: remote.has_restricted_revision,
    }
}

/// The decision alone.
pub fn decide(def: &TemplateDefinition, observed: Option<&RemoteEnvironment>) -> Decision {
    reconcile(def, observed).decision
}
