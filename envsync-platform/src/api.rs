//! The remote platform as seen by the reconciler.
//!
//! [`PlatformApi`] covers exactly the calls the engine makes. Request
//! payloads are built from a normalized [`TemplateDefinition`] and serialize
//! to the platform's camelCase JSON.

use std::fmt;

use serde::Serialize;

use envsync_core::{
    ClusterType, EnvironmentId, EnvironmentName, EnvironmentVariable, RevisionId, Signature,
    TemplateDefinition, Visibility, WorkspaceTool,
};

use crate::error::RemoteError;

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Remote operation names, used for error context, retries and call counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operation {
    ListEnvironments,
    GetEnvironment,
    CreateEnvironment,
    CreateRevision,
    RestrictRevision,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::ListEnvironments => "list-environments",
            Operation::GetEnvironment => "get-environment",
            Operation::CreateEnvironment => "create-environment",
            Operation::CreateRevision => "create-revision",
            Operation::RestrictRevision => "restrict-revision",
        }
    }

    /// Whether the operation changes remote state.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Operation::CreateEnvironment | Operation::CreateRevision | Operation::RestrictRevision
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Observed state
// ---------------------------------------------------------------------------

/// One entry of the environment listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentSummary {
    pub id: EnvironmentId,
    pub name: EnvironmentName,
}

/// Full state of one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentDetails {
    pub id: EnvironmentId,
    /// Tags of the revision currently served by default.
    pub active_revision_tags: Vec<String>,
    pub latest_revision_id: Option<RevisionId>,
    pub selected_revision_id: Option<RevisionId>,
    pub restricted_revision_id: Option<RevisionId>,
}

impl EnvironmentDetails {
    /// Signature recorded on the active revision, if this tool wrote one.
    pub fn recorded_signature(&self) -> Option<Signature> {
        Signature::find_in_tags(&self.active_revision_tags)
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Launch configuration of a workspace tool, as the platform expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceToolPayload {
    pub name: String,
    pub title: String,
    pub icon_url: String,
    pub start_scripts: Vec<String>,
    pub supported_file_extensions: Vec<String>,
    pub proxy_config: ProxyConfigPayload,
}

/// Proxy settings; the platform wants the object even when unused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfigPayload {
    pub internal_path: String,
    pub port: Option<u16>,
    pub require_subdomain: bool,
    pub rewrite: bool,
}

impl WorkspaceToolPayload {
    fn from_tool(name: &str, tool: &WorkspaceTool) -> Self {
        let proxy = tool.proxy_config.as_ref();
        Self {
            name: name.to_string(),
            title: tool.title.clone(),
            icon_url: tool.icon_url.clone(),
            start_scripts: tool.start_scripts.clone(),
            supported_file_extensions: tool.supported_file_extensions.clone(),
            proxy_config: ProxyConfigPayload {
                internal_path: proxy.map(|p| p.internal_path.clone()).unwrap_or_default(),
                port: proxy.map(|p| p.port),
                require_subdomain: proxy.is_some_and(|p| p.require_subdomain),
                rewrite: proxy.is_some_and(|p| p.rewrite),
            },
        }
    }
}

/// Build fields shared by environment creation and revision publishing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionFields {
    pub image: String,
    pub dockerfile_instructions: String,
    pub environment_variables: Vec<EnvironmentVariable>,
    pub pre_setup_script: String,
    pub post_setup_script: String,
    pub pre_run_script: String,
    pub post_run_script: String,
    pub skip_cache: bool,
    pub summary: String,
    pub supported_clusters: Vec<ClusterType>,
    pub tags: Vec<String>,
    pub use_vpn: bool,
    pub workspace_tools: Vec<WorkspaceToolPayload>,
}

impl RevisionFields {
    fn from_definition(def: &TemplateDefinition) -> Self {
        let spec = &def.build_spec;
        Self {
            image: spec.image.clone(),
            dockerfile_instructions: spec.dockerfile_instructions.clone(),
            environment_variables: spec.environment_variables.clone(),
            pre_setup_script: spec.pre_setup_script.clone(),
            post_setup_script: spec.post_setup_script.clone(),
            pre_run_script: spec.pre_run_script.clone(),
            post_run_script: spec.post_run_script.clone(),
            skip_cache: spec.skip_cache,
            summary: spec.summary.clone(),
            supported_clusters: spec.supported_clusters.clone(),
            tags: spec.tags.clone(),
            use_vpn: spec.use_vpn,
            workspace_tools: def
                .workspace_tools
                .iter()
                .map(|(name, tool)| WorkspaceToolPayload::from_tool(name, tool))
                .collect(),
        }
    }
}

/// Body of a create-environment call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEnvironment {
    pub name: EnvironmentName,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub visibility: Visibility,
    #[serde(rename = "orgOwnerId", skip_serializing_if = "Option::is_none")]
    pub organization_owner_id: Option<String>,
    pub is_restricted: bool,
    pub add_base_dependencies: bool,
    #[serde(flatten)]
    pub fields: RevisionFields,
}

impl CreateEnvironment {
    pub fn from_definition(def: &TemplateDefinition) -> Self {
        Self {
            name: def.name.clone(),
            description: def.description.clone(),
            visibility: def.restrictions.visibility,
            organization_owner_id: def.restrictions.organization_owner_id.clone(),
            is_restricted: def.restrictions.is_restricted,
            add_base_dependencies: def.build_spec.add_base_dependencies,
            fields: RevisionFields::from_definition(def),
        }
    }
}

/// Body of a create-revision call. Carries the signature tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRevision {
    #[serde(flatten)]
    pub fields: RevisionFields,
}

impl CreateRevision {
    pub fn from_definition(def: &TemplateDefinition, signature: &Signature) -> Self {
        let mut fields = RevisionFields::from_definition(def);
        fields.tags.push(signature.to_tag());
        Self { fields }
    }

    /// Signature carried in the tags, if any.
    pub fn signature(&self) -> Option<Signature> {
        Signature::find_in_tags(&self.fields.tags)
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Calls the reconciler makes against the platform.
///
/// Implementations perform exactly one attempt per call; retrying is the
/// caller's concern (see [`crate::retry`]).
pub trait PlatformApi {
    /// Every environment visible to the caller, including ones this tool
    /// does not manage.
    fn list_environments(&self) -> Result<Vec<EnvironmentSummary>, RemoteError>;

    fn get_environment(&self, id: &EnvironmentId) -> Result<EnvironmentDetails, RemoteError>;

    fn create_environment(&self, request: &CreateEnvironment)
        -> Result<EnvironmentId, RemoteError>;

    fn create_revision(
        &self,
        environment: &EnvironmentId,
        request: &CreateRevision,
    ) -> Result<RevisionId, RemoteError>;

    fn restrict_revision(
        &self,
        environment: &EnvironmentId,
        revision: &RevisionId,
    ) -> Result<(), RemoteError>;
}

impl<P: PlatformApi + ?Sized> PlatformApi for &P {
    fn list_environments(&self) -> Result<Vec<EnvironmentSummary>, RemoteError> {
        (**self).list_environments()
    }

    fn get_environment(&self, id: &EnvironmentId) -> Result<EnvironmentDetails, RemoteError> {
        (**self).get_environment(id)
    }

    fn create_environment(
        &self,
        request: &CreateEnvironment,
    ) -> Result<EnvironmentId, RemoteError> {
        (**self).create_environment(request)
    }

    fn create_revision(
        &self,
        environment: &EnvironmentId,
        request: &CreateRevision,
    ) -> Result<RevisionId, RemoteError> {
        (**self).create_revision(environment, request)
    }

    fn restrict_revision(
        &self,
        environment: &EnvironmentId,
        revision: &RevisionId,
    ) -> Result<(), RemoteError> {
        (**self).restrict_revision(environment, revision)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use envsync_core::{BuildSpec, ProxyConfig};

    fn definition() -> TemplateDefinition {
        let mut def = TemplateDefinition::new("test_env", BuildSpec::from_image("base:1"));
        def.build_spec.tags = vec!["python".into()];
        def.workspace_tools.insert(
            "jupyterlab".into(),
            WorkspaceTool {
                title: "JupyterLab".into(),
                icon_url: "/icon.svg".into(),
                start_scripts: vec!["/start.sh".into()],
                supported_file_extensions: vec![".ipynb".into()],
                proxy_config: Some(ProxyConfig {
                    port: 8888,
                    internal_path: "/x".into(),
                    require_subdomain: false,
                    rewrite: true,
                }),
            },
        );
        def
    }

    #[test]
    fn revision_request_appends_signature_tag() {
        let def = definition();
        let sig = Signature::compute(&def);
        let req = CreateRevision::from_definition(&def, &sig);
        assert_eq!(req.fields.tags[0], "python");
        assert_eq!(req.signature(), Some(sig));
    }

    #[test]
    fn create_request_has_no_signature_tag() {
        let req = CreateEnvironment::from_definition(&definition());
        assert!(Signature::find_in_tags(&req.fields.tags).is_none());
    }

    #[test]
    fn create_request_json_shape() {
        let mut def = definition();
        def.restrictions.organization_owner_id = Some("5f0c1a2b3c4d5e6f7a8b9c0d".into());
        let json = serde_json::to_value(CreateEnvironment::from_definition(&def)).expect("json");
        assert_eq!(json["name"], "test_env");
        assert_eq!(json["visibility"], "Private");
        assert_eq!(json["orgOwnerId"], "5f0c1a2b3c4d5e6f7a8b9c0d");
        assert_eq!(json["image"], "base:1");
        assert_eq!(json["workspaceTools"][0]["name"], "jupyterlab");
        assert_eq!(json["workspaceTools"][0]["proxyConfig"]["port"], 8888);
        assert!(json.get("description").is_none());
    }

    #[test]
    fn tool_without_proxy_sends_empty_proxy_config() {
        let mut def = definition();
        if let Some(tool) = def.workspace_tools.get_mut("jupyterlab") {
            tool.proxy_config = None;
        }
        let json = serde_json::to_value(CreateRevision::from_definition(
            &def,
            &Signature::compute(&def),
        ))
        .expect("json");
        let proxy = &json["workspaceTools"][0]["proxyConfig"];
        assert!(proxy["port"].is_null());
        assert_eq!(proxy["rewrite"], false);
    }

    #[test]
    fn mutating_operations() {
        assert!(!Operation::ListEnvironments.is_mutating());
        assert!(!Operation::GetEnvironment.is_mutating());
        assert!(Operation::CreateRevision.is_mutating());
    }
}
