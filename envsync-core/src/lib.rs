//! envsync core library: template schema, loader, signatures, errors.
//!
//! Public API surface:
//! - [`types`]: newtypes and normalized template definitions
//! - [`template`]: strict YAML schema and normalization
//! - [`loader`]: template directory discovery
//! - [`signature`]: canonical change-detection digests
//! - [`error`]: [`TemplateError`], [`LoadError`]

pub mod error;
pub mod loader;
pub mod signature;
pub mod template;
pub mod types;

pub use error::{LoadError, TemplateError};
pub use loader::{load_templates_at, LoadFailure, TemplateSet};
pub use signature::Signature;
pub use types::{
    BuildSpec, ClusterType, EnvironmentId, EnvironmentName, EnvironmentVariable, ProxyConfig,
    Restrictions, RevisionId, TemplateDefinition, Visibility, WorkspaceTool,
};
