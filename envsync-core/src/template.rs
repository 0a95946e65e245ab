//! Strict template schema.
//!
//! A template file is a single YAML document with camelCase keys. Unknown
//! keys are rejected. Parsing happens in two steps: serde decodes the raw
//! document, then [`normalize`] validates it and fills defaults so the rest
//! of the pipeline only sees [`TemplateDefinition`]s.
//!
//! ```yaml
//! name: test_env
//! buildSpec:
//!   image: quay.io/org/base:py3.11
//!   dockerfileInstructions: |
//!     RUN pip install polars
//! restrictions:
//!   visibility: global
//! workspaceTools:
//!   jupyterlab:
//!     iconUrl: /assets/jupyter.svg
//!     start: ["/opt/domino/workspaces/jupyterlab/start"]
//! ```
//!
//! `buildSpec` may also be a bare string, shorthand for `{image: <string>}`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use crate::error::{malformed, TemplateError};
use crate::signature;
use crate::types::{
    BuildSpec, ClusterType, EnvironmentName, EnvironmentVariable, ProxyConfig, Restrictions,
    TemplateDefinition, Visibility, WorkspaceTool,
};

// ---------------------------------------------------------------------------
// Raw documents
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawTemplate {
    name: String,
    #[serde(default)]
    description: Option<String>,
    build_spec: serde_yaml::Value,
    #[serde(default)]
    restrictions: Option<RawRestrictions>,
    #[serde(default)]
    workspace_tools: Option<BTreeMap<String, RawWorkspaceTool>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawBuildSpec {
    image: String,
    #[serde(default)]
    dockerfile_instructions: Option<String>,
    #[serde(default)]
    environment_variables: Option<Vec<RawEnvironmentVariable>>,
    #[serde(default)]
    pre_setup_script: Option<String>,
    #[serde(default)]
    post_setup_script: Option<String>,
    #[serde(default)]
    pre_run_script: Option<String>,
    #[serde(default)]
    post_run_script: Option<String>,
    #[serde(default)]
    skip_cache: Option<bool>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    supported_clusters: Option<Vec<String>>,
    #[serde(default)]
    use_vpn: Option<bool>,
    #[serde(default)]
    add_base_dependencies: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEnvironmentVariable {
    name: String,
    #[serde(deserialize_with = "scalar_string")]
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawRestrictions {
    #[serde(default)]
    visibility: Option<String>,
    #[serde(default)]
    organization_owner_id: Option<String>,
    #[serde(default)]
    is_restricted: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawWorkspaceTool {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    icon_url: Option<String>,
    start: Vec<String>,
    #[serde(default)]
    supported_file_extensions: Option<Vec<String>>,
    #[serde(default)]
    http_proxy: Option<RawProxyConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawProxyConfig {
    port: u16,
    #[serde(default)]
    internal_path: Option<String>,
    #[serde(default)]
    require_subdomain: Option<bool>,
    #[serde(default)]
    rewrite: Option<bool>,
}

/// YAML happily types `value: 8080` as an integer; environment variables are
/// always strings on the platform side.
fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Null => Ok(String::new()),
        _ => Err(D::Error::custom("expected a scalar value")),
    }
}

// ---------------------------------------------------------------------------
// Parse + normalize
// ---------------------------------------------------------------------------

/// Read and parse a template file.
pub fn load_file(path: &Path) -> Result<TemplateDefinition, TemplateError> {
    let contents = std::fs::read_to_string(path).map_err(|e| TemplateError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_str(&contents, path)
}

/// Parse a template document. `path` is only used for error context and
/// recorded as the definition's source.
pub fn parse_str(contents: &str, path: &Path) -> Result<TemplateDefinition, TemplateError> {
    let raw: RawTemplate = serde_yaml::from_str(contents).map_err(|e| TemplateError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    normalize(raw, path)
}

fn normalize(raw: RawTemplate, path: &Path) -> Result<TemplateDefinition, TemplateError> {
    let name = EnvironmentName::from(raw.name.trim());
    if !name.is_url_safe() {
        return Err(malformed(
            path,
            format!(
                "environment name '{}' must be non-empty and use only letters, digits, '-', '.', '_' or '~'",
                raw.name
            ),
        ));
    }

    let build_spec = normalize_build_spec(raw.build_spec, path)?;
    let restrictions = normalize_restrictions(raw.restrictions, path)?;

    let mut workspace_tools = BTreeMap::new();
    for (tool_name, tool) in raw.workspace_tools.unwrap_or_default() {
        let tool = normalize_workspace_tool(&tool_name, tool, path)?;
        workspace_tools.insert(tool_name, tool);
    }

    Ok(TemplateDefinition {
        name,
        description: raw.description.filter(|d| !d.trim().is_empty()),
        build_spec,
        restrictions,
        workspace_tools,
        source: path.to_path_buf(),
    })
}

fn normalize_build_spec(value: serde_yaml::Value, path: &Path) -> Result<BuildSpec, TemplateError> {
    let raw: RawBuildSpec = match value {
        serde_yaml::Value::String(image) => RawBuildSpec::image_only(image),
        serde_yaml::Value::Mapping(_) => serde_yaml::from_value(value)
            .map_err(|e| malformed(path, format!("invalid buildSpec: {e}")))?,
        serde_yaml::Value::Null => return Err(malformed(path, "buildSpec is required")),
        _ => {
            return Err(malformed(
                path,
                "buildSpec must be a mapping or a base image reference",
            ))
        }
    };

    let image = raw.image.trim().to_string();
    if image.is_empty() {
        return Err(malformed(path, "buildSpec.image must not be empty"));
    }

    let mut environment_variables = Vec::new();
    for var in raw.environment_variables.unwrap_or_default() {
        if var.name.trim().is_empty() {
            return Err(malformed(path, "environment variable with an empty name"));
        }
        environment_variables.push(EnvironmentVariable {
            name: var.name,
            value: var.value,
        });
    }

    let tags = raw.tags.unwrap_or_default();
    if let Some(tag) = tags.iter().find(|t| t.starts_with(signature::TAG_PREFIX)) {
        return Err(malformed(
            path,
            format!("tag '{tag}' uses the reserved '{}' prefix", signature::TAG_PREFIX),
        ));
    }

    let mut supported_clusters = Vec::new();
    for cluster in raw.supported_clusters.unwrap_or_default() {
        let parsed = ClusterType::parse(&cluster).ok_or_else(|| {
            malformed(
                path,
                format!("unknown cluster type '{cluster}'; expected Spark, Ray, Dask or Mpi"),
            )
        })?;
        supported_clusters.push(parsed);
    }
    supported_clusters.sort();
    supported_clusters.dedup();

    Ok(BuildSpec {
        image,
        dockerfile_instructions: raw.dockerfile_instructions.unwrap_or_default(),
        environment_variables,
        pre_setup_script: raw.pre_setup_script.unwrap_or_default(),
        post_setup_script: raw.post_setup_script.unwrap_or_default(),
        pre_run_script: raw.pre_run_script.unwrap_or_default(),
        post_run_script: raw.post_run_script.unwrap_or_default(),
        skip_cache: raw.skip_cache.unwrap_or(false),
        summary: raw.summary.unwrap_or_default(),
        tags,
        supported_clusters,
        use_vpn: raw.use_vpn.unwrap_or(false),
        add_base_dependencies: raw.add_base_dependencies.unwrap_or(true),
    })
}

impl RawBuildSpec {
    fn image_only(image: String) -> Self {
        Self {
            image,
            dockerfile_instructions: None,
            environment_variables: None,
            pre_setup_script: None,
            post_setup_script: None,
            pre_run_script: None,
            post_run_script: None,
            skip_cache: None,
            summary: None,
            tags: None,
            supported_clusters: None,
            use_vpn: None,
            add_base_dependencies: None,
        }
    }
}

fn normalize_restrictions(
    raw: Option<RawRestrictions>,
    path: &Path,
) -> Result<Restrictions, TemplateError> {
    let Some(raw) = raw else {
        return Ok(Restrictions::default());
    };

    let mut visibility = match raw.visibility.as_deref() {
        None => Visibility::Private,
        Some(v) => Visibility::parse(v).ok_or_else(|| {
            malformed(
                path,
                format!("unknown visibility '{v}'; expected private, organization or global"),
            )
        })?,
    };

    let owner = raw
        .organization_owner_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty());

    match &owner {
        Some(id) if !is_object_id(id) => {
            return Err(malformed(
                path,
                format!("organizationOwnerId '{id}' is not a 24-character hex id"),
            ));
        }
        // Organization-owned environments are created privately visible.
        Some(_) => visibility = Visibility::Private,
        None if visibility == Visibility::Organization => {
            return Err(malformed(
                path,
                "organization visibility requires organizationOwnerId",
            ));
        }
        None => {}
    }

    Ok(Restrictions {
        visibility,
        organization_owner_id: owner,
        is_restricted: raw.is_restricted.unwrap_or(false),
    })
}

fn normalize_workspace_tool(
    name: &str,
    raw: RawWorkspaceTool,
    path: &Path,
) -> Result<WorkspaceTool, TemplateError> {
    if name.trim().is_empty() {
        return Err(malformed(path, "workspace tool with an empty name"));
    }
    if raw.start.is_empty() {
        return Err(malformed(
            path,
            format!("workspace tool '{name}' needs at least one start script"),
        ));
    }

    let title = raw
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| name.to_string());

    let mut supported_file_extensions = raw.supported_file_extensions.unwrap_or_default();
    supported_file_extensions.sort();
    supported_file_extensions.dedup();

    Ok(WorkspaceTool {
        title,
        icon_url: raw.icon_url.unwrap_or_default(),
        start_scripts: raw.start,
        supported_file_extensions,
        proxy_config: raw.http_proxy.map(|p| ProxyConfig {
            port: p.port,
            internal_path: p.internal_path.unwrap_or_default(),
            require_subdomain: p.require_subdomain.unwrap_or(false),
            rewrite: p.rewrite.unwrap_or(false),
        }),
    })
}

fn is_object_id(id: &str) -> bool {
    id.len() == 24 && id.chars().all(|c| c.is_ascii_hexdigit())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
