//! Blocking HTTP implementation of [`PlatformApi`].
//!
//! | Operation | Request |
//! |---|---|
//! | list | `GET v4/environments/self` |
//! | details | `GET api/environments/v1/environments/{id}` |
//! | create environment | `POST api/environments/beta/environments` |
//! | create revision | `POST api/environments/beta/environments/{id}/revisions` |
//! | restrict revision | `PATCH api/environments/beta/environments/{id}/revisions/{rev}` |
//!
//! Every request carries the configured timeout; a timeout surfaces as a
//! transport error and is classified transient.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use envsync_core::{EnvironmentId, EnvironmentName, RevisionId};

use crate::api::{
    CreateEnvironment, CreateRevision, EnvironmentDetails, EnvironmentSummary, Operation,
    PlatformApi,
};
use crate::config::{Credential, PlatformConfig};
use crate::error::RemoteError;

const LIST_PATH: &str = "v4/environments/self";
const DETAILS_PATH: &str = "api/environments/v1/environments";
const MUTATE_PATH: &str = "api/environments/beta/environments";

/// Longest error body kept in a [`RemoteError`] message.
const MAX_ERROR_BODY: usize = 512;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    data: Vec<ListedEnvironment>,
}

#[derive(Debug, Deserialize)]
struct ListedEnvironment {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    environment: DetailsBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailsBody {
    id: String,
    #[serde(default)]
    active_revision_tags: Option<Vec<String>>,
    #[serde(default)]
    latest_revision: Option<RevisionRef>,
    #[serde(default)]
    selected_revision: Option<RevisionRef>,
    #[serde(default)]
    restricted_revision: Option<RevisionRef>,
}

#[derive(Debug, Deserialize)]
struct RevisionRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CreateEnvironmentResponse {
    #[serde(default)]
    environment: Option<IdOnly>,
}

#[derive(Debug, Deserialize)]
struct CreateRevisionResponse {
    #[serde(default)]
    revision: Option<IdOnly>,
}

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// [`PlatformApi`] over HTTPS.
pub struct HttpPlatform {
    agent: ureq::Agent,
    config: PlatformConfig,
}

impl HttpPlatform {
    pub fn new(config: PlatformConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.request_timeout)
            .user_agent(concat!("envsync/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent, config }
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        let request = self
            .agent
            .request(method, &self.url(path))
            .set("Accept", "application/json");
        match &self.config.credential {
            Credential::ApiKey(key) => request.set("X-Domino-Api-Key", key),
            Credential::AuthToken(token) => {
                request.set("Authorization", &format!("Bearer {token}"))
            }
            Credential::None => request,
        }
    }

    fn decode<T: DeserializeOwned>(
        operation: Operation,
        response: Result<ureq::Response, ureq::Error>,
    ) -> Result<T, RemoteError> {
        let response = response.map_err(|e| map_ureq_error(operation, e))?;
        response
            .into_json::<T>()
            .map_err(|e| RemoteError::decode(operation, e.to_string()))
    }

    fn find_id_by_name(&self, name: &EnvironmentName) -> Result<Option<EnvironmentId>, RemoteError> {
        Ok(self
            .list_environments()?
            .into_iter()
            .find(|env| &env.name == name)
            .map(|env| env.id))
    }
}

impl PlatformApi for HttpPlatform {
    fn list_environments(&self) -> Result<Vec<EnvironmentSummary>, RemoteError> {
        let op = Operation::ListEnvironments;
        let body: ListResponse = Self::decode(op, self.request("GET", LIST_PATH).call())?;
        Ok(body
            .data
            .into_iter()
            .map(|env| EnvironmentSummary {
                id: EnvironmentId(env.id),
                name: EnvironmentName(env.name),
            })
            .collect())
    }

    fn get_environment(&self, id: &EnvironmentId) -> Result<EnvironmentDetails, RemoteError> {
        let op = Operation::GetEnvironment;
        let path = format!("{DETAILS_PATH}/{id}");
        let body: DetailsResponse = Self::decode(op, self.request("GET", &path).call())?;
        let env = body.environment;
        Ok(EnvironmentDetails {
            id: EnvironmentId(env.id),
            active_revision_tags: env.active_revision_tags.unwrap_or_default(),
            latest_revision_id: env.latest_revision.map(|r| RevisionId(r.id)),
            selected_revision_id: env.selected_revision.map(|r| RevisionId(r.id)),
            restricted_revision_id: env.restricted_revision.map(|r| RevisionId(r.id)),
        })
    }

    fn create_environment(
        &self,
        request: &CreateEnvironment,
    ) -> Result<EnvironmentId, RemoteError> {
        let op = Operation::CreateEnvironment;
        let body: CreateEnvironmentResponse =
            Self::decode(op, self.request("POST", MUTATE_PATH).send_json(request))?;
        if let Some(env) = body.environment {
            return Ok(EnvironmentId(env.id));
        }

        // Older platform versions answer without the created object.
        tracing::debug!("create response for '{}' had no id; looking it up", request.name);
        self.find_id_by_name(&request.name)?.ok_or_else(|| {
            RemoteError::decode(
                op,
                format!("environment '{}' not listed after creation", request.name),
            )
        })
    }

    fn create_revision(
        &self,
        environment: &EnvironmentId,
        request: &CreateRevision,
    ) -> Result<RevisionId, RemoteError> {
        let op = Operation::CreateRevision;
        let path = format!("{MUTATE_PATH}/{environment}/revisions");
        let body: CreateRevisionResponse =
            Self::decode(op, self.request("POST", &path).send_json(request))?;
        if let Some(revision) = body.revision {
            return Ok(RevisionId(revision.id));
        }

        // The revision exists at this point; a failed lookup must not be
        // retried as if the POST had failed.
        tracing::debug!("create-revision response for {environment} had no id; looking it up");
        let details = self.get_environment(environment).map_err(|err| {
            RemoteError::decode(op, format!("revision published but its id could not be read: {err}"))
        })?;
        details
            .latest_revision_id
            .or(details.selected_revision_id)
            .ok_or_else(|| RemoteError::decode(op, "no revision id in response or details"))
    }

    fn restrict_revision(
        &self,
        environment: &EnvironmentId,
        revision: &RevisionId,
    ) -> Result<(), RemoteError> {
        let op = Operation::RestrictRevision;
        let path = format!("{MUTATE_PATH}/{environment}/revisions/{revision}");
        self.request("PATCH", &path)
            .send_json(serde_json::json!({ "isRestricted": true }))
            .map(|_| ())
            .map_err(|e| map_ureq_error(op, e))
    }
}

fn map_ureq_error(operation: Operation, err: ureq::Error) -> RemoteError {
    match err {
        ureq::Error::Status(status, response) => {
            let body = response.into_string().unwrap_or_default();
            RemoteError::from_status(operation, status, truncate(body.trim()))
        }
        ureq::Error::Transport(transport) => RemoteError::transient(operation, transport.to_string()),
    }
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}
