//! Template loading integration tests: partial failures, duplicates, and
//! signature stability across differently-ordered source documents.

use assert_fs::prelude::*;
use envsync_core::{
    loader::{self, load_templates_at},
    LoadError, Signature, TemplateError,
};
use predicates::prelude::predicate;
use rstest::rstest;

fn template_dir() -> assert_fs::TempDir {
    assert_fs::TempDir::new().expect("tempdir")
}

// ---------------------------------------------------------------------------
// 1. Per-template failures
// ---------------------------------------------------------------------------

#[test]
fn malformed_template_does_not_abort_load() {
    let root = template_dir();
    root.child("good/environment.yaml")
        .write_str("name: good\nbuildSpec: quay.io/base:1\n")
        .unwrap();
    root.child("broken/environment.yaml")
        .write_str("name: broken\n")
        .unwrap();

    let set = load_templates_at(root.path()).expect("load");
    assert_eq!(set.templates.len(), 1);
    assert_eq!(set.templates[0].name.as_str(), "good");

    assert_eq!(set.failures.len(), 1);
    let failure = &set.failures[0];
    assert_eq!(failure.source_name, "broken");
    assert!(matches!(failure.error, TemplateError::Parse { .. }));
    assert!(failure.error.to_string().contains("environment.yaml"));
}

#[rstest]
#[case::corrupt_yaml(": : corrupt : yaml : !!!\n  - broken: [unclosed")]
#[case::not_a_mapping("- this is a list, not a mapping\n")]
#[case::image_empty("name: x\nbuildSpec:\n  image: ''\n")]
#[case::bad_name("name: 'a/b'\nbuildSpec: A\n")]
#[case::bad_tools("name: x\nbuildSpec: A\nworkspaceTools: [vscode]\n")]
fn malformed_inputs_are_reported(#[case] body: &str) {
    let root = template_dir();
    root.child("env/environment.yaml").write_str(body).unwrap();

    let set = load_templates_at(root.path()).expect("load");
    assert!(set.templates.is_empty());
    assert_eq!(set.failures.len(), 1, "body: {body}");
}

// ---------------------------------------------------------------------------
// 2. Run-level failures
// ---------------------------------------------------------------------------

#[test]
fn duplicate_names_fail_the_load() {
    let root = template_dir();
    root.child("one/environment.yaml")
        .write_str("name: shared\nbuildSpec: A\n")
        .unwrap();
    root.child("two/environment.yaml")
        .write_str("name: shared\nbuildSpec: B\n")
        .unwrap();

    let err = load_templates_at(root.path()).unwrap_err();
    match &err {
        LoadError::DuplicateTemplateName { name, first, second } => {
            assert_eq!(name, "shared");
            assert!(first.ends_with("one/environment.yaml"));
            assert!(second.ends_with("two/environment.yaml"));
        }
        other => panic!("expected duplicate, got {other:?}"),
    }
    assert!(err.to_string().contains("shared"));
}

#[test]
fn only_empty_subdirectories_is_no_templates() {
    let root = template_dir();
    root.child("empty").create_dir_all().unwrap();
    let err = load_templates_at(root.path()).unwrap_err();
    assert!(matches!(err, LoadError::NoTemplates { .. }));
}

#[test]
fn resolve_root_with_explicit_target() {
    let base = template_dir();
    base.child("environment_templates").create_dir_all().unwrap();

    let root = loader::resolve_root_at(Some(base.path()), base.path()).expect("resolve");
    base.child("environment_templates")
        .assert(predicate::path::is_dir());
    assert_eq!(root, base.path().join("environment_templates"));
}

#[test]
fn resolve_root_target_without_templates_dir_fails() {
    let base = template_dir();
    let err = loader::resolve_root_at(Some(base.path()), base.path()).unwrap_err();
    assert!(matches!(err, LoadError::DirectoryNotFound { .. }));
}

// ---------------------------------------------------------------------------
// 3. Signature stability across source encodings
// ---------------------------------------------------------------------------

const ORDERED: &str = r#"
name: analytics
buildSpec:
  image: quay.io/org/base:py3.11
  dockerfileInstructions: |
    RUN pip install polars
  supportedClusters: [spark]
restrictions:
  visibility: global
  isRestricted: true
workspaceTools:
  jupyterlab:
    title: JupyterLab
    iconUrl: /assets/jupyter.svg
    start: ["/opt/start-jupyter.sh"]
    httpProxy:
      port: 8888
      rewrite: false
  vscode:
    start: ["/opt/start-vscode.sh"]
"#;

const REORDERED: &str = r#"
workspaceTools:
  vscode:
    start: ["/opt/start-vscode.sh"]
  jupyterlab:
    httpProxy:
      rewrite: false
      port: 8888
    start: ["/opt/start-jupyter.sh"]
    iconUrl: /assets/jupyter.svg
    title: JupyterLab
restrictions:
  isRestricted: true
  visibility: GLOBAL
buildSpec:
  supportedClusters: [Spark]
  dockerfileInstructions: |
    RUN pip install polars
  image: quay.io/org/base:py3.11
name: analytics
"#;

#[test]
fn key_order_does_not_change_signature() {
    let root = template_dir();
    root.child("a/environment.yaml").write_str(ORDERED).unwrap();
    root.child("b/environment.yaml").write_str(REORDERED).unwrap();

    let a = loader::load_template(&root.path().join("a/environment.yaml")).expect("a");
    let b = loader::load_template(&root.path().join("b/environment.yaml")).expect("b");
    assert_eq!(a.build_spec, b.build_spec);
    assert_eq!(Signature::compute(&a), Signature::compute(&b));
}

const UNORDERED_SETS_A: &str = r#"
name: x
buildSpec:
  image: a
  supportedClusters: [spark, ray]
workspaceTools:
  jupyterlab:
    start: ["/opt/jupyter/start.sh"]
    supportedFileExtensions: [".ipynb", ".py"]
"#;

const UNORDERED_SETS_B: &str = r#"
name: x
buildSpec:
  image: a
  supportedClusters: [Ray, spark]
workspaceTools:
  jupyterlab:
    start: ["/opt/jupyter/start.sh"]
    supportedFileExtensions: [".py", ".ipynb", ".py"]
"#;

#[test]
fn set_valued_list_order_does_not_change_signature() {
    let root = template_dir();
    root.child("a/environment.yaml").write_str(UNORDERED_SETS_A).unwrap();
    root.child("b/environment.yaml").write_str(UNORDERED_SETS_B).unwrap();

    let a = loader::load_template(&root.path().join("a/environment.yaml")).expect("a");
    let b = loader::load_template(&root.path().join("b/environment.yaml")).expect("b");
    assert_eq!(a.build_spec.supported_clusters, b.build_spec.supported_clusters);
    assert_eq!(a.workspace_tools, b.workspace_tools);
    assert_eq!(Signature::compute(&a), Signature::compute(&b));
}

#[test]
fn environment_variable_order_changes_signature() {
    let root = template_dir();
    let first = "name: x\nbuildSpec:\n  image: a\n  environmentVariables:\n    - {name: A, value: '1'}\n    - {name: B, value: '2'}\n";
    let second = "name: x\nbuildSpec:\n  image: a\n  environmentVariables:\n    - {name: B, value: '2'}\n    - {name: A, value: '1'}\n";
    root.child("a/environment.yaml").write_str(first).unwrap();
    root.child("b/environment.yaml").write_str(second).unwrap();

    let a = loader::load_template(&root.path().join("a/environment.yaml")).expect("a");
    let b = loader::load_template(&root.path().join("b/environment.yaml")).expect("b");
    assert_ne!(Signature::compute(&a), Signature::compute(&b));
}

#[rstest]
#[case("quay.io/org/base:py3.12")]
#[case("quay.io/org/other:py3.11")]
fn build_spec_changes_change_signature(#[case] image: &str) {
    let root = template_dir();
    root.child("a/environment.yaml").write_str(ORDERED).unwrap();
    root.child("b/environment.yaml")
        .write_str(&ORDERED.replace("quay.io/org/base:py3.11", image))
        .unwrap();

    let a = loader::load_template(&root.path().join("a/environment.yaml")).expect("a");
    let b = loader::load_template(&root.path().join("b/environment.yaml")).expect("b");
    assert_ne!(Signature::compute(&a), Signature::compute(&b));
}

#[test]
fn dockerfile_instruction_order_changes_signature() {
    let root = template_dir();
    let first = "name: x\nbuildSpec:\n  image: a\n  dockerfileInstructions: \"RUN a\\nRUN b\\n\"\n";
    let second = "name: x\nbuildSpec:\n  image: a\n  dockerfileInstructions: \"RUN b\\nRUN a\\n\"\n";
    root.child("a/environment.yaml").write_str(first).unwrap();
    root.child("b/environment.yaml").write_str(second).unwrap();

    let a = loader::load_template(&root.path().join("a/environment.yaml")).expect("a");
    let b = loader::load_template(&root.path().join("b/environment.yaml")).expect("b");
    assert_ne!(Signature::compute(&a), Signature::compute(&b));
}
