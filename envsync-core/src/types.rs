//! Domain types for environment templates.
//!
//! Everything here is already normalized: raw YAML goes through
//! [`crate::template`] first, so downstream stages never see optional
//! strings, unknown visibility values or unsorted tool maps.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Name of a compute environment; the join key between templates and
/// remote state.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EnvironmentName(pub String);

impl EnvironmentName {
    /// `true` when the name is non-empty and uses only RFC 3986 unreserved
    /// characters (`A-Z a-z 0-9 - . _ ~`).
    pub fn is_url_safe(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EnvironmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for EnvironmentName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EnvironmentName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Platform-assigned identifier of an environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvironmentId(pub String);

impl fmt::Display for EnvironmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for EnvironmentId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Platform-assigned identifier of an environment revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RevisionId(pub String);

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for RevisionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Who can see an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Visibility {
    #[default]
    Private,
    Organization,
    Global,
}

impl Visibility {
    /// Case-insensitive parse; the British spelling `organisation` is accepted.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "private" => Some(Self::Private),
            "organization" | "organisation" => Some(Self::Organization),
            "global" => Some(Self::Global),
            _ => None,
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Private => write!(f, "Private"),
            Visibility::Organization => write!(f, "Organization"),
            Visibility::Global => write!(f, "Global"),
        }
    }
}

/// On-demand cluster types an environment can back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClusterType {
    Spark,
    Ray,
    Dask,
    Mpi,
}

impl ClusterType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "spark" => Some(Self::Spark),
            "ray" => Some(Self::Ray),
            "dask" => Some(Self::Dask),
            "mpi" => Some(Self::Mpi),
            _ => None,
        }
    }
}

impl fmt::Display for ClusterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterType::Spark => write!(f, "Spark"),
            ClusterType::Ray => write!(f, "Ray"),
            ClusterType::Dask => write!(f, "Dask"),
            ClusterType::Mpi => write!(f, "Mpi"),
        }
    }
}

// ---------------------------------------------------------------------------
// Template definition
// ---------------------------------------------------------------------------

/// A single environment variable baked into the image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: String,
}

/// How the environment image is built. Opaque to the reconciler beyond
/// equality and signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSpec {
    pub image: String,
    /// Ordered; instruction order is significant.
    pub dockerfile_instructions: String,
    pub environment_variables: Vec<EnvironmentVariable>,
    pub pre_setup_script: String,
    pub post_setup_script: String,
    pub pre_run_script: String,
    pub post_run_script: String,
    pub skip_cache: bool,
    pub summary: String,
    /// User-supplied revision tags. The signature tag is added on publish.
    pub tags: Vec<String>,
    /// Sorted and deduplicated.
    pub supported_clusters: Vec<ClusterType>,
    pub use_vpn: bool,
    pub add_base_dependencies: bool,
}

impl BuildSpec {
    /// A build spec that only names a base image.
    pub fn from_image(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            dockerfile_instructions: String::new(),
            environment_variables: Vec::new(),
            pre_setup_script: String::new(),
            post_setup_script: String::new(),
            pre_run_script: String::new(),
            post_run_script: String::new(),
            skip_cache: false,
            summary: String::new(),
            tags: Vec::new(),
            supported_clusters: Vec::new(),
            use_vpn: false,
            add_base_dependencies: true,
        }
    }
}

/// Entitlement constraints on an environment and its revisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Restrictions {
    pub visibility: Visibility,
    /// 24-hex-character id of the owning organization, if any.
    pub organization_owner_id: Option<String>,
    /// Restrict each published revision so only entitled users may select it.
    pub is_restricted: bool,
}

/// HTTP proxy settings for a workspace tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    pub port: u16,
    pub internal_path: String,
    pub require_subdomain: bool,
    pub rewrite: bool,
}

/// Launch configuration of a pluggable workspace tool (IDE).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceTool {
    pub title: String,
    pub icon_url: String,
    pub start_scripts: Vec<String>,
    /// Sorted and deduplicated.
    pub supported_file_extensions: Vec<String>,
    pub proxy_config: Option<ProxyConfig>,
}

/// One desired environment, normalized and validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateDefinition {
    pub name: EnvironmentName,
    /// Environment-level description; set on creation, not signed.
    pub description: Option<String>,
    pub build_spec: BuildSpec,
    pub restrictions: Restrictions,
    /// Keyed by tool name; `BTreeMap` keeps iteration order canonical.
    pub workspace_tools: BTreeMap<String, WorkspaceTool>,
    /// File the definition was loaded from.
    pub source: PathBuf,
}

impl TemplateDefinition {
    /// Minimal definition with default restrictions and no workspace tools.
    pub fn new(name: impl Into<EnvironmentName>, build_spec: BuildSpec) -> Self {
        Self {
            name: name.into(),
            description: None,
            build_spec,
            restrictions: Restrictions::default(),
            workspace_tools: BTreeMap::new(),
            source: PathBuf::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_safe_names() {
        assert!(EnvironmentName::from("test_env").is_url_safe());
        assert!(EnvironmentName::from("py3.11-gpu~v2").is_url_safe());
        assert!(!EnvironmentName::from("").is_url_safe());
        assert!(!EnvironmentName::from("has space").is_url_safe());
        assert!(!EnvironmentName::from("a/b").is_url_safe());
    }

    #[test]
    fn visibility_parse_is_case_insensitive() {
        assert_eq!(Visibility::parse("GLOBAL"), Some(Visibility::Global));
        assert_eq!(Visibility::parse("Organisation"), Some(Visibility::Organization));
        assert_eq!(Visibility::parse("public"), None);
    }

    #[test]
    fn cluster_type_display_is_title_case() {
        assert_eq!(ClusterType::parse("spark").map(|c| c.to_string()), Some("Spark".into()));
        assert_eq!(ClusterType::parse("MPI"), Some(ClusterType::Mpi));
        assert_eq!(ClusterType::parse("hadoop"), None);
    }

    #[test]
    fn build_spec_serializes_camel_case() {
        let json = serde_json::to_value(BuildSpec::from_image("img")).expect("serialize");
        assert_eq!(json["image"], "img");
        assert_eq!(json["addBaseDependencies"], true);
        assert!(json.get("dockerfileInstructions").is_some());
    }
}
