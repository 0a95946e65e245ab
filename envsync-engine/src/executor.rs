//! Action executor.
//!
//! ## `Create`
//!
//! 1. create-environment (retried; after a transient failure the listing is
//!    checked so a create that actually landed is adopted, not repeated).
//! 2. create-revision tagged with the template signature (retried the same
//!    way; an active revision already carrying the signature is adopted).
//! 3. restrict the new revision if the template asks for it.
//!
//! A failure after step 1 leaves an environment without a tracked revision.
//! The outcome is `PartiallyApplied`; the next run observes no signature,
//! decides `Revise` and finishes the job.
//!
//! ## `Revise`
//!
//! Steps 2 and 3 against the existing environment.
//!
//! ## `NoOp`
//!
//! No remote calls.

use envsync_core::{EnvironmentId, RevisionId, Signature, TemplateDefinition};
use envsync_platform::{
    retry::{with_retry, with_retry_and_check},
    CreateEnvironment, CreateRevision, Operation, PlatformApi, RemoteError, RetryPolicy,
};

use crate::error::FailureKind;
use crate::outcome::RunOutcome;
use crate::reconcile::{Decision, Reconciliation};

/// Where a publish sequence stopped.
enum PublishError {
    Revision(RemoteError),
    Restriction(RevisionId, RemoteError),
}

/// Applies decisions against the platform.
pub struct ActionExecutor<P> {
    platform: P,
    retry: RetryPolicy,
}

impl<P: PlatformApi> ActionExecutor<P> {
    pub fn new(platform: P, retry: RetryPolicy) -> Self {
        Self { platform, retry }
    }

    /// Carry out `plan` for `def` and report the outcome. Never returns an
    /// error: failures are recorded in the outcome.
    pub fn apply(&self, def: &TemplateDefinition, plan: &Reconciliation) -> RunOutcome {
        let name = def.name.as_str();
        let outcome = match plan.decision {
            Decision::NoOp => {
                tracing::debug!("'{name}' unchanged ({})", plan.signature.short());
                RunOutcome::success(name, Decision::NoOp).with_environment(plan.environment.clone())
            }
            Decision::Create => self.create(def, &plan.signature),
            Decision::Revise => match &plan.environment {
                Some(id) => self.revise(def, id, &plan.signature, plan.has_restricted_revision),
                None => RunOutcome::failure(
                    name,
                    Some(Decision::Revise),
                    FailureKind::RemoteValidation,
                    "revise decided without an observed environment",
                ),
            },
        };
        outcome
            .with_reason(plan.reason)
            .with_signature(plan.signature.clone())
    }

    fn create(&self, def: &TemplateDefinition, signature: &Signature) -> RunOutcome {
        let name = def.name.as_str();
        let request = CreateEnvironment::from_definition(def);

        let created = with_retry_and_check(
            &self.retry,
            Operation::CreateEnvironment,
            || self.platform.create_environment(&request),
            || self.find_environment(def),
        );
        let env_id = match created {
            Ok(id) => id,
            Err(err) => {
                tracing::error!("creating '{name}' failed: {err}");
                return RunOutcome::failure(
                    name,
                    Some(Decision::Create),
                    FailureKind::from_remote(&err),
                    err.to_string(),
                );
            }
        };
        tracing::info!("created environment '{name}' ({env_id})");

        match self.publish(def, &env_id, signature, false) {
            Ok(rev_id) => RunOutcome::success(name, Decision::Create)
                .with_environment(Some(env_id))
                .with_revision(rev_id),
            Err(PublishError::Revision(err)) => {
                tracing::error!("'{name}' created as {env_id} but its revision was not published: {err}");
                RunOutcome::failure(
                    name,
                    Some(Decision::Create),
                    FailureKind::PartiallyApplied,
                    format!(
                        "environment {env_id} was created without a tracked revision ({err}); re-run to publish it"
                    ),
                )
                .with_environment(Some(env_id))
            }
            Err(PublishError::Restriction(rev_id, err)) => {
                Self::restriction_failure(name, Decision::Create, env_id, rev_id, err)
            }
        }
    }

    fn revise(
        &self,
        def: &TemplateDefinition,
        env_id: &EnvironmentId,
        signature: &Signature,
        already_restricted: bool,
    ) -> RunOutcome {
        let name = def.name.as_str();
        match self.publish(def, env_id, signature, already_restricted) {
            Ok(rev_id) => RunOutcome::success(name, Decision::Revise)
                .with_environment(Some(env_id.clone()))
                .with_revision(rev_id),
            Err(PublishError::Revision(err)) => {
                tracing::error!("publishing a revision of '{name}' failed: {err}");
                RunOutcome::failure(
                    name,
                    Some(Decision::Revise),
                    FailureKind::from_remote(&err),
                    err.to_string(),
                )
                .with_environment(Some(env_id.clone()))
            }
            Err(PublishError::Restriction(rev_id, err)) => {
                Self::restriction_failure(name, Decision::Revise, env_id.clone(), rev_id, err)
            }
        }
    }

    /// Publish a signature-tagged revision, then restrict it if required.
    fn publish(
        &self,
        def: &TemplateDefinition,
        env_id: &EnvironmentId,
        signature: &Signature,
        already_restricted: bool,
    ) -> Result<RevisionId, PublishError> {
        let request = CreateRevision::from_definition(def, signature);
        let rev_id = with_retry_and_check(
            &self.retry,
            Operation::CreateRevision,
            || self.platform.create_revision(env_id, &request),
            || self.find_revision(env_id, signature),
        )
        .map_err(PublishError::Revision)?;
        tracing::info!(
            "published revision {rev_id} of '{}' ({})",
            def.name,
            signature.short()
        );

        if def.restrictions.is_restricted && !already_restricted {
            with_retry(&self.retry, Operation::RestrictRevision, || {
                self.platform.restrict_revision(env_id, &rev_id)
            })
            .map_err(|e| PublishError::Restriction(rev_id.clone(), e))?;
            tracing::info!("restricted revision {rev_id} of '{}'", def.name);
        }
        Ok(rev_id)
    }

    /// Active revision of `env_id` if it already carries `signature`.
    fn find_revision(&self, env_id: &EnvironmentId, signature: &Signature) -> Option<RevisionId> {
        match self.platform.get_environment(env_id) {
            Ok(details) if details.recorded_signature().as_ref() == Some(signature) => {
                details.latest_revision_id.or(details.selected_revision_id)
            }
            Ok(_) => None,
            Err(err) => {
                tracing::debug!("could not verify revision of {env_id}: {err}");
                None
            }
        }
    }

    fn find_environment(&self, def: &TemplateDefinition) -> Option<EnvironmentId> {
        match self.platform.list_environments() {
            Ok(listed) => listed
                .into_iter()
                .find(|env| env.name == def.name)
                .map(|env| env.id),
            Err(err) => {
                tracing::debug!("could not verify creation of '{}': {err}", def.name);
                None
            }
        }
    }

    fn restriction_failure(
        name: &str,
        decision: Decision,
        env_id: EnvironmentId,
        rev_id: RevisionId,
        err: RemoteError,
    ) -> RunOutcome {
        tracing::error!("revision {rev_id} of '{name}' published but not restricted: {err}");
        RunOutcome::failure(
            name,
            Some(decision),
            FailureKind::PartiallyApplied,
            format!("revision {rev_id} was published but not restricted ({err}); re-run to restrict it"),
        )
        .with_environment(Some(env_id))
        .with_revision(rev_id)
    }
}
