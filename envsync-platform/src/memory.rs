//! In-memory [`PlatformApi`] for tests and local dry runs.
//!
//! Behaves like the real platform for the calls the engine makes, counts
//! every call, and lets tests queue failures per operation:
//!
//! ```
//! use envsync_platform::{MemoryPlatform, Operation, RemoteError, PlatformApi};
//!
//! let platform = MemoryPlatform::new();
//! platform.fail_next(
//!     Operation::ListEnvironments,
//!     RemoteError::transient(Operation::ListEnvironments, "timeout"),
//! );
//! assert!(platform.list_environments().is_err());
//! assert!(platform.list_environments().is_ok());
//! ```

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use envsync_core::{EnvironmentId, EnvironmentName, RevisionId};

use crate::api::{
    CreateEnvironment, CreateRevision, EnvironmentDetails, EnvironmentSummary, Operation,
    PlatformApi,
};
use crate::error::RemoteError;

/// A revision as stored by [`MemoryPlatform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRevision {
    pub id: RevisionId,
    pub request: CreateRevision,
}

/// An environment as stored by [`MemoryPlatform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEnvironment {
    pub id: EnvironmentId,
    pub name: EnvironmentName,
    /// `None` for environments seeded directly by a test.
    pub created_with: Option<CreateEnvironment>,
    /// Oldest first; the last one is served by default.
    pub revisions: Vec<StoredRevision>,
    pub restricted_revision: Option<RevisionId>,
}

impl StoredEnvironment {
    pub fn latest_revision(&self) -> Option<&StoredRevision> {
        self.revisions.last()
    }
}

#[derive(Debug, Clone)]
struct Fault {
    error: RemoteError,
    /// Apply the side effect before failing, like a response lost on the wire.
    after_commit: bool,
}

#[derive(Debug, Default)]
struct State {
    environments: Vec<StoredEnvironment>,
    faults: HashMap<Operation, VecDeque<Fault>>,
    calls: BTreeMap<Operation, usize>,
    next_id: u64,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{:04}", self.next_id)
    }

    fn enter(&mut self, op: Operation) -> Option<Fault> {
        *self.calls.entry(op).or_default() += 1;
        self.faults.get_mut(&op).and_then(|queue| queue.pop_front())
    }

    fn find(&mut self, op: Operation, id: &EnvironmentId) -> Result<&mut StoredEnvironment, RemoteError> {
        self.environments
            .iter_mut()
            .find(|env| &env.id == id)
            .ok_or_else(|| RemoteError::rejected(op, 404, format!("environment {id} not found")))
    }
}

/// Thread-safe in-memory platform.
#[derive(Debug, Default)]
pub struct MemoryPlatform {
    state: Mutex<State>,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not hide the state from the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // -----------------------------------------------------------------------
    // Setup
    // -----------------------------------------------------------------------

    /// Add an environment with the given revision tags (no revision when
    /// `tags` is `None`).
    pub fn seed_environment(&self, name: &str, tags: Option<Vec<String>>) -> EnvironmentId {
        let mut state = self.lock();
        let id = EnvironmentId(state.next_id("env"));
        let revisions = match tags {
            Some(tags) => {
                let rev_id = RevisionId(state.next_id("rev"));
                vec![StoredRevision {
                    id: rev_id,
                    request: seeded_revision(tags),
                }]
            }
            None => Vec::new(),
        };
        state.environments.push(StoredEnvironment {
            id: id.clone(),
            name: EnvironmentName::from(name),
            created_with: None,
            revisions,
            restricted_revision: None,
        });
        id
    }

    /// Fail the next call of `op` with `error`, without side effects.
    pub fn fail_next(&self, op: Operation, error: RemoteError) {
        self.push_fault(op, error, false);
    }

    /// Fail the next `times` calls of `op`.
    pub fn fail_times(&self, op: Operation, times: usize, error: RemoteError) {
        for _ in 0..times {
            self.push_fault(op, error.clone(), false);
        }
    }

    /// Apply the next call of `op`, then report `error` anyway.
    pub fn fail_next_after_commit(&self, op: Operation, error: RemoteError) {
        self.push_fault(op, error, true);
    }

    fn push_fault(&self, op: Operation, error: RemoteError, after_commit: bool) {
        self.lock()
            .faults
            .entry(op)
            .or_default()
            .push_back(Fault { error, after_commit });
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub fn environments(&self) -> Vec<StoredEnvironment> {
        self.lock().environments.clone()
    }

    pub fn environment(&self, name: &str) -> Option<StoredEnvironment> {
        self.lock()
            .environments
            .iter()
            .find(|env| env.name.as_str() == name)
            .cloned()
    }

    /// Calls of `op` so far, failed ones included.
    pub fn calls(&self, op: Operation) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Calls that could have changed remote state.
    pub fn mutating_calls(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|(op, _)| op.is_mutating())
            .map(|(_, n)| n)
            .sum()
    }

    pub fn reset_calls(&self) {
        self.lock().calls.clear();
    }
}

fn seeded_revision(tags: Vec<String>) -> CreateRevision {
    use crate::api::RevisionFields;

    CreateRevision {
        fields: RevisionFields {
            image: String::new(),
            dockerfile_instructions: String::new(),
            environment_variables: Vec::new(),
            pre_setup_script: String::new(),
            post_setup_script: String::new(),
            pre_run_script: String::new(),
            post_run_script: String::new(),
            skip_cache: false,
            summary: String::new(),
            supported_clusters: Vec::new(),
            tags,
            use_vpn: false,
            workspace_tools: Vec::new(),
        },
    }
}

impl PlatformApi for MemoryPlatform {
    fn list_environments(&self) -> Result<Vec<EnvironmentSummary>, RemoteError> {
        let mut state = self.lock();
        if let Some(fault) = state.enter(Operation::ListEnvironments) {
            return Err(fault.error);
        }
        Ok(state
            .environments
            .iter()
            .map(|env| EnvironmentSummary {
                id: env.id.clone(),
                name: env.name.clone(),
            })
            .collect())
    }

    fn get_environment(&self, id: &EnvironmentId) -> Result<EnvironmentDetails, RemoteError> {
        let op = Operation::GetEnvironment;
        let mut state = self.lock();
        if let Some(fault) = state.enter(op) {
            return Err(fault.error);
        }
        let env = state.find(op, id)?;
        let latest = env.latest_revision();
        Ok(EnvironmentDetails {
            id: env.id.clone(),
            active_revision_tags: latest.map(|r| r.request.fields.tags.clone()).unwrap_or_default(),
            latest_revision_id: latest.map(|r| r.id.clone()),
            selected_revision_id: latest.map(|r| r.id.clone()),
            restricted_revision_id: env.restricted_revision.clone(),
        })
    }

    fn create_environment(
        &self,
        request: &CreateEnvironment,
    ) -> Result<EnvironmentId, RemoteError> {
        let op = Operation::CreateEnvironment;
        let mut state = self.lock();
        let fault = state.enter(op);
        if let Some(Fault { error, after_commit: false }) = fault {
            return Err(error);
        }
        if state.environments.iter().any(|env| env.name == request.name) {
            return Err(RemoteError::rejected(
                op,
                409,
                format!("environment '{}' already exists", request.name),
            ));
        }
        let id = EnvironmentId(state.next_id("env"));
        state.environments.push(StoredEnvironment {
            id: id.clone(),
            name: request.name.clone(),
            created_with: Some(request.clone()),
            revisions: Vec::new(),
            restricted_revision: None,
        });
        match fault {
            Some(fault) => Err(fault.error),
            None => Ok(id),
        }
    }

    fn create_revision(
        &self,
        environment: &EnvironmentId,
        request: &CreateRevision,
    ) -> Result<RevisionId, RemoteError> {
        let op = Operation::CreateRevision;
        let mut state = self.lock();
        let fault = state.enter(op);
        if let Some(Fault { error, after_commit: false }) = fault {
            return Err(error);
        }
        let rev_id = RevisionId(state.next_id("rev"));
        let env = state.find(op, environment)?;
        env.revisions.push(StoredRevision {
            id: rev_id.clone(),
            request: request.clone(),
        });
        match fault {
            Some(fault) => Err(fault.error),
            None => Ok(rev_id),
        }
    }

    fn restrict_revision(
        &self,
        environment: &EnvironmentId,
        revision: &RevisionId,
    ) -> Result<(), RemoteError> {
        let op = Operation::RestrictRevision;
        let mut state = self.lock();
        let fault = state.enter(op);
        if let Some(Fault { error, after_commit: false }) = fault {
            return Err(error);
        }
        let env = state.find(op, environment)?;
        if !env.revisions.iter().any(|r| &r.id == revision) {
            return Err(RemoteError::rejected(
                op,
                404,
                format!("revision {revision} not found"),
            ));
        }
        env.restricted_revision = Some(revision.clone());
        match fault {
            Some(fault) => Err(fault.error),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use envsync_core::{BuildSpec, Signature, TemplateDefinition};

    fn def() -> TemplateDefinition {
        TemplateDefinition::new("test_env", BuildSpec::from_image("A"))
    }

    #[test]
    fn create_then_revise_is_visible_in_details() {
        let platform = MemoryPlatform::new();
        let d = def();
        let id = platform
            .create_environment(&CreateEnvironment::from_definition(&d))
            .expect("create");
        let details = platform.get_environment(&id).expect("details");
        assert!(details.latest_revision_id.is_none());
        assert!(details.recorded_signature().is_none());

        let sig = Signature::compute(&d);
        let rev = platform
            .create_revision(&id, &CreateRevision::from_definition(&d, &sig))
            .expect("revision");
        let details = platform.get_environment(&id).expect("details");
        assert_eq!(details.latest_revision_id, Some(rev));
        assert_eq!(details.recorded_signature(), Some(sig));
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let platform = MemoryPlatform::new();
        let req = CreateEnvironment::from_definition(&def());
        platform.create_environment(&req).expect("first");
        let err = platform.create_environment(&req).unwrap_err();
        assert!(matches!(err, RemoteError::Rejected { status: 409, .. }));
    }

    #[test]
    fn after_commit_fault_applies_side_effect() {
        let platform = MemoryPlatform::new();
        platform.fail_next_after_commit(
            Operation::CreateEnvironment,
            RemoteError::transient(Operation::CreateEnvironment, "reset by peer"),
        );
        let err = platform
            .create_environment(&CreateEnvironment::from_definition(&def()))
            .unwrap_err();
        assert!(err.is_transient());
        assert!(platform.environment("test_env").is_some());
    }

    #[test]
    fn calls_are_counted_including_failures() {
        let platform = MemoryPlatform::new();
        platform.fail_times(
            Operation::ListEnvironments,
            2,
            RemoteError::transient(Operation::ListEnvironments, "x"),
        );
        let _ = platform.list_environments();
        let _ = platform.list_environments();
        let _ = platform.list_environments();
        assert_eq!(platform.calls(Operation::ListEnvironments), 3);
        assert_eq!(platform.mutating_calls(), 0);
    }

    #[test]
    fn restrict_unknown_revision_is_rejected() {
        let platform = MemoryPlatform::new();
        let id = platform.seed_environment("x", Some(vec![]));
        let err = platform
            .restrict_revision(&id, &RevisionId::from("nope"))
            .unwrap_err();
        assert!(!err.is_transient());
    }
}
