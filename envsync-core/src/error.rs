//! Error types for envsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that affect a single template source.
///
/// These are recoverable at run level: the template is reported as failed
/// and the remaining templates are still reconciled.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The template file could not be read.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error: includes line context from serde_yaml.
    #[error("failed to parse template at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The document parsed but violates the template schema.
    #[error("malformed template at {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

/// Errors that abort loading of the whole template set.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The resolved templates root does not exist or is not a directory.
    #[error("template directory does not exist: {path}")]
    DirectoryNotFound { path: PathBuf },

    /// No `TARGET_DIRECTORY` given and no `environment_templates` directory nearby.
    #[error("could not find 'environment_templates' in {cwd} or its parent; set TARGET_DIRECTORY or create the folder")]
    RootNotFound { cwd: PathBuf },

    /// Listing the templates root failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The templates root has no template sources at all.
    #[error("no environment templates found under {path}")]
    NoTemplates { path: PathBuf },

    /// Two sources declare the same environment name.
    #[error("duplicate template name '{name}' in {first} and {second}")]
    DuplicateTemplateName {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },
}

/// Convenience constructor for [`TemplateError::Malformed`].
pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> TemplateError {
    TemplateError::Malformed {
        path: path.into(),
        reason: reason.into(),
    }
}
