//! One reconciliation run: load → observe → decide → apply → summarize.

use std::fmt;
use std::path::Path;

use chrono::Utc;

use envsync_core::{load_templates_at, TemplateSet};
use envsync_platform::{PlatformApi, RetryPolicy};

use crate::error::{FailureKind, RunError};
use crate::executor::ActionExecutor;
use crate::outcome::{RunOutcome, RunSummary};
use crate::reader::RemoteStateReader;
use crate::reconcile::reconcile;

/// Whether decisions are carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Create and revise environments.
    Apply,
    /// Decide only; no mutating calls.
    Plan,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Apply => "apply",
            RunMode::Plan => "plan",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Load every template under `templates_root` and reconcile it.
pub fn run<P: PlatformApi>(
    platform: &P,
    templates_root: &Path,
    mode: RunMode,
    retry: RetryPolicy,
) -> Result<RunSummary, RunError> {
    tracing::info!("loading templates from {}", templates_root.display());
    let set = load_templates_at(templates_root)?;
    run_templates(platform, set, mode, retry)
}

/// Reconcile an already loaded template set.
///
/// Remote state is read before any mutation. A read failure aborts the run
/// with [`RunError::RemoteUnavailable`]; per-template failures are recorded
/// in the summary and never stop the other templates.
pub fn run_templates<P: PlatformApi>(
    platform: &P,
    set: TemplateSet,
    mode: RunMode,
    retry: RetryPolicy,
) -> Result<RunSummary, RunError> {
    let started_at = Utc::now();
    let TemplateSet { templates, failures } = set;

    let mut outcomes: Vec<RunOutcome> = failures
        .into_iter()
        .map(|failure| {
            tracing::error!("skipping {}: {}", failure.source_name, failure.error);
            RunOutcome::failure(
                failure.source_name,
                None,
                FailureKind::MalformedTemplate,
                failure.error.to_string(),
            )
        })
        .collect();

    if !templates.is_empty() {
        let reader = RemoteStateReader::new(platform, retry);
        let observed = reader.observe(templates.iter().map(|t| &t.name))?;
        tracing::info!(
            "{} of {} template(s) exist remotely",
            observed.len(),
            templates.len()
        );

        let executor = ActionExecutor::new(platform, retry);
        for def in &templates {
            let plan = reconcile(def, observed.get(&def.name));
            tracing::info!(
                "{}: {} ({})",
                def.name,
                plan.decision,
                plan.reason.describe()
            );
            let outcome = match mode {
                RunMode::Apply => executor.apply(def, &plan),
                RunMode::Plan => RunOutcome::success(def.name.as_str(), plan.decision)
                    .with_reason(plan.reason)
                    .with_signature(plan.signature.clone())
                    .with_environment(plan.environment.clone()),
            };
            outcomes.push(outcome);
        }
    }

    outcomes.sort_by(|a, b| a.name.cmp(&b.name));
    let summary = RunSummary {
        mode,
        outcomes,
        started_at,
        finished_at: Utc::now(),
    };
    tracing::info!(
        "{mode} finished: {} created, {} revised, {} unchanged, {} failed",
        summary.created(),
        summary.revised(),
        summary.unchanged(),
        summary.failed()
    );
    Ok(summary)
}
