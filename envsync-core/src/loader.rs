//! Template discovery.
//!
//! # Layout
//!
//! ```text
//! environment_templates/
//!   <dir>/
//!     environment.yaml   (or environment.yml)
//! ```
//!
//! Every subdirectory is one template source. Sources that fail to parse
//! are reported in [`TemplateSet::failures`] and do not stop the load;
//! duplicate environment names do.
//!
//! # API pattern
//!
//! As in the rest of the workspace, functions take the directory they work
//! on explicitly (`_at`) so tests can point them at a `TempDir`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{LoadError, TemplateError};
use crate::template;
use crate::types::TemplateDefinition;

/// Directory name searched for when no explicit root is given.
pub const TEMPLATES_DIR_NAME: &str = "environment_templates";

/// Accepted template file names, in lookup order.
pub const TEMPLATE_FILE_NAMES: [&str; 2] = ["environment.yaml", "environment.yml"];

/// A template source that could not be turned into a definition.
#[derive(Debug)]
pub struct LoadFailure {
    /// Directory name of the source; stands in for the environment name.
    pub source_name: String,
    pub path: PathBuf,
    pub error: TemplateError,
}

/// Result of loading a templates root.
#[derive(Debug, Default)]
pub struct TemplateSet {
    /// Valid definitions, sorted by environment name.
    pub templates: Vec<TemplateDefinition>,
    /// Per-source failures, sorted by source name.
    pub failures: Vec<LoadFailure>,
}

// ---------------------------------------------------------------------------
// 1. Root resolution
// ---------------------------------------------------------------------------

/// Resolve the templates root.
///
/// - `target` given: `environment_templates` is appended unless `target`
///   already ends with it.
/// - `target` absent: `<cwd>/environment_templates`, then
///   `<cwd>/../environment_templates`.
///
/// The resolved directory must exist.
pub fn resolve_root_at(target: Option<&Path>, cwd: &Path) -> Result<PathBuf, LoadError> {
    let root = match target {
        Some(target) => {
            if target.file_name().is_some_and(|n| n == TEMPLATES_DIR_NAME) {
                target.to_path_buf()
            } else {
                target.join(TEMPLATES_DIR_NAME)
            }
        }
        None => {
            let here = cwd.join(TEMPLATES_DIR_NAME);
            let parent = cwd.parent().map(|p| p.join(TEMPLATES_DIR_NAME));
            if here.is_dir() {
                here
            } else if let Some(parent) = parent.filter(|p| p.is_dir()) {
                parent
            } else {
                return Err(LoadError::RootNotFound {
                    cwd: cwd.to_path_buf(),
                });
            }
        }
    };

    if !root.is_dir() {
        return Err(LoadError::DirectoryNotFound { path: root });
    }
    Ok(root)
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load a single template file.
pub fn load_template(path: &Path) -> Result<TemplateDefinition, TemplateError> {
    template::load_file(path)
}

/// Load every template source under `root`.
///
/// Returns `LoadError::NoTemplates` when `root` holds no sources at all and
/// `LoadError::DuplicateTemplateName` when two sources claim one name.
pub fn load_templates_at(root: &Path) -> Result<TemplateSet, LoadError> {
    if !root.is_dir() {
        return Err(LoadError::DirectoryNotFound {
            path: root.to_path_buf(),
        });
    }

    let io = |e| LoadError::Io {
        path: root.to_path_buf(),
        source: e,
    };
    let mut entries: Vec<_> = std::fs::read_dir(root)
        .map_err(io)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .collect();
    entries.sort_by_key(|e| e.file_name());

    let mut set = TemplateSet::default();
    let mut seen: BTreeMap<String, PathBuf> = BTreeMap::new();
    let mut sources = 0usize;

    for entry in entries {
        let source_name = entry.file_name().to_string_lossy().into_owned();
        let Some(path) = template_file_in(&entry.path()) else {
            tracing::warn!("no configuration file found for {source_name}, skipping");
            continue;
        };
        sources += 1;

        match load_template(&path) {
            Ok(def) => {
                if let Some(first) = seen.get(def.name.as_str()) {
                    return Err(LoadError::DuplicateTemplateName {
                        name: def.name.0,
                        first: first.clone(),
                        second: path,
                    });
                }
                tracing::debug!("loaded template '{}' from {}", def.name, path.display());
                seen.insert(def.name.0.clone(), path);
                set.templates.push(def);
            }
            Err(error) => {
                tracing::error!("{error}");
                set.failures.push(LoadFailure {
                    source_name,
                    path,
                    error,
                });
            }
        }
    }

    if sources == 0 {
        return Err(LoadError::NoTemplates {
            path: root.to_path_buf(),
        });
    }

    set.templates.sort_by(|a, b| a.name.cmp(&b.name));
    set.failures.sort_by(|a, b| a.source_name.cmp(&b.source_name));
    Ok(set)
}

fn template_file_in(dir: &Path) -> Option<PathBuf> {
    TEMPLATE_FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_template(root: &Path, dir: &str, body: &str) {
        let d = root.join(dir);
        fs::create_dir_all(&d).expect("mkdir");
        fs::write(d.join("environment.yaml"), body).expect("write");
    }

    #[test]
    fn templates_sorted_by_name_not_directory() {
        let tmp = TempDir::new().unwrap();
        write_template(tmp.path(), "a_dir", "name: zeta\nbuildSpec: A\n");
        write_template(tmp.path(), "b_dir", "name: alpha\nbuildSpec: B\n");

        let set = load_templates_at(tmp.path()).expect("load");
        let names: Vec<_> = set.templates.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["alpha", "zeta"]);
        assert!(set.failures.is_empty());
    }

    #[test]
    fn yml_extension_is_accepted() {
        let tmp = TempDir::new().unwrap();
        let d = tmp.path().join("x");
        fs::create_dir_all(&d).unwrap();
        fs::write(d.join("environment.yml"), "name: x\nbuildSpec: A\n").unwrap();

        let set = load_templates_at(tmp.path()).expect("load");
        assert_eq!(set.templates.len(), 1);
    }

    #[test]
    fn directory_without_template_is_skipped() {
        let tmp = TempDir::new().unwrap();
        write_template(tmp.path(), "good", "name: good\nbuildSpec: A\n");
        fs::create_dir_all(tmp.path().join("docs")).unwrap();
        fs::write(tmp.path().join("README.md"), "hi").unwrap();

        let set = load_templates_at(tmp.path()).expect("load");
        assert_eq!(set.templates.len(), 1);
        assert!(set.failures.is_empty());
    }

    #[test]
    fn empty_root_is_no_templates() {
        let tmp = TempDir::new().unwrap();
        let err = load_templates_at(tmp.path()).unwrap_err();
        assert!(matches!(err, LoadError::NoTemplates { .. }));
    }

    #[test]
    fn missing_root_is_directory_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = load_templates_at(&tmp.path().join("nope")).unwrap_err();
        assert!(matches!(err, LoadError::DirectoryNotFound { .. }));
    }

    #[test]
    fn resolve_appends_templates_dir_name() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join(TEMPLATES_DIR_NAME)).unwrap();

        let root = resolve_root_at(Some(tmp.path()), Path::new("/")).expect("resolve");
        assert!(root.ends_with(TEMPLATES_DIR_NAME));

        let again = resolve_root_at(Some(&root), Path::new("/")).expect("resolve");
        assert_eq!(again, root);
    }

    #[test]
    fn resolve_falls_back_to_parent_directory() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join(TEMPLATES_DIR_NAME)).unwrap();
        let cwd = tmp.path().join("scripts");
        fs::create_dir_all(&cwd).unwrap();

        let root = resolve_root_at(None, &cwd).expect("resolve");
        assert_eq!(root, tmp.path().join(TEMPLATES_DIR_NAME));
    }

    #[test]
    fn resolve_without_candidates_fails() {
        let tmp = TempDir::new().unwrap();
        let cwd = tmp.path().join("a");
        fs::create_dir_all(&cwd).unwrap();
        let err = resolve_root_at(None, &cwd).unwrap_err();
        assert!(matches!(err, LoadError::RootNotFound { .. }));
    }
}
