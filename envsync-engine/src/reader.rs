//! Remote state reader.
//!
//! Reads the environment listing once per run and fetches details only for
//! environments whose names match a template. Environments managed by
//! someone else are listed but never looked at. Nothing is cached across
//! runs; the platform is the source of truth.

use std::collections::BTreeMap;

use envsync_core::{EnvironmentId, EnvironmentName, RevisionId, Signature};
use envsync_platform::{
    retry::with_retry, EnvironmentDetails, Operation, PlatformApi, RetryPolicy,
};

use crate::error::RunError;

/// Observed state of one environment that exists remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEnvironment {
    pub name: EnvironmentName,
    pub id: EnvironmentId,
    pub latest_revision_id: Option<RevisionId>,
    /// Signature tag on the active revision. `None` for environments this
    /// tool never revised or revisions that predate signatures.
    pub latest_revision_signature: Option<Signature>,
    pub has_restricted_revision: bool,
}

impl RemoteEnvironment {
    fn from_details(name: EnvironmentName, details: EnvironmentDetails) -> Self {
        Self {
            name,
            latest_revision_signature: details.recorded_signature(),
            latest_revision_id: details.latest_revision_id.or(details.selected_revision_id),
            has_restricted_revision: details.restricted_revision_id.is_some(),
            id: details.id,
        }
    }
}

/// Observed state for the names of interest. A name with no entry does not
/// exist remotely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedState {
    environments: BTreeMap<EnvironmentName, RemoteEnvironment>,
}

impl ObservedState {
    pub fn get(&self, name: &EnvironmentName) -> Option<&RemoteEnvironment> {
        self.environments.get(name)
    }

    pub fn len(&self) -> usize {
        self.environments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.environments.is_empty()
    }

    pub fn insert(&mut self, env: RemoteEnvironment) {
        self.environments.insert(env.name.clone(), env);
    }
}

impl FromIterator<RemoteEnvironment> for ObservedState {
    fn from_iter<I: IntoIterator<Item = RemoteEnvironment>>(iter: I) -> Self {
        let mut state = Self::default();
        for env in iter {
            state.insert(env);
        }
        state
    }
}

/// Read-only view of the platform. Every failure is run-level.
pub struct RemoteStateReader<P> {
    platform: P,
    retry: RetryPolicy,
}

impl<P: PlatformApi> RemoteStateReader<P> {
    pub fn new(platform: P, retry: RetryPolicy) -> Self {
        Self { platform, retry }
    }

    /// Name → id for every environment the platform lists. When the platform
    /// lists a name twice the first entry wins.
    pub fn list_environments(&self) -> Result<BTreeMap<EnvironmentName, EnvironmentId>, RunError> {
        let listed = with_retry(&self.retry, Operation::ListEnvironments, || {
            self.platform.list_environments()
        })
        .map_err(RunError::RemoteUnavailable)?;

        let mut by_name = BTreeMap::new();
        for env in listed {
            if by_name.contains_key(&env.name) {
                tracing::warn!("platform lists '{}' more than once; using the first", env.name);
                continue;
            }
            by_name.insert(env.name, env.id);
        }
        Ok(by_name)
    }

    /// Signature recorded on the active revision of `name`. `None` when the
    /// environment does not exist or its revision carries no signature.
    pub fn latest_revision_signature(
        &self,
        name: &EnvironmentName,
    ) -> Result<Option<Signature>, RunError> {
        match self.list_environments()?.get(name) {
            Some(id) => Ok(self.details(id)?.recorded_signature()),
            None => Ok(None),
        }
    }

    /// Observed state for `names`.
    pub fn observe<'a, I>(&self, names: I) -> Result<ObservedState, RunError>
    where
        I: IntoIterator<Item = &'a EnvironmentName>,
    {
        let listed = self.list_environments()?;
        tracing::debug!("platform lists {} environment(s)", listed.len());

        let mut state = ObservedState::default();
        for name in names {
            let Some(id) = listed.get(name) else {
                continue;
            };
            let details = self.details(id)?;
            state.insert(RemoteEnvironment::from_details(name.clone(), details));
        }
        Ok(state)
    }

    fn details(&self, id: &EnvironmentId) -> Result<EnvironmentDetails, RunError> {
        with_retry(&self.retry, Operation::GetEnvironment, || {
            self.platform.get_environment(id)
        })
        .map_err(RunError::RemoteUnavailable)
    }
}
