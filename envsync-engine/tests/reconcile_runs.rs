//! End-to-end runs against the in-memory platform: idempotence, recovery
//! from partial failures, and templates loaded from disk.

use assert_fs::prelude::*;
use envsync_core::{BuildSpec, Signature, TemplateDefinition, TemplateSet};
use envsync_engine::{run, run_templates, Decision, FailureKind, RunError, RunMode};
use envsync_platform::{MemoryPlatform, Operation, PlatformApi, RemoteError, RetryPolicy};
use rstest::rstest;

fn retry() -> RetryPolicy {
    RetryPolicy::immediate(3)
}

fn templates(defs: Vec<TemplateDefinition>) -> TemplateSet {
    TemplateSet {
        templates: defs,
        failures: Vec::new(),
    }
}

fn test_env(image: &str) -> TemplateDefinition {
    TemplateDefinition::new("test_env", BuildSpec::from_image(image))
}

fn apply(platform: &MemoryPlatform, defs: Vec<TemplateDefinition>) -> envsync_engine::RunSummary {
    run_templates(platform, templates(defs), RunMode::Apply, retry()).expect("run")
}

// ---------------------------------------------------------------------------
// 1. Create, no-op, revise
// ---------------------------------------------------------------------------

#[test]
fn new_template_is_created_with_one_signed_revision() {
    let platform = MemoryPlatform::new();
    let summary = apply(&platform, vec![test_env("A")]);

    let outcome = summary.outcome("test_env").expect("outcome");
    assert!(outcome.succeeded);
    assert_eq!(outcome.decision, Some(Decision::Create));

    let env = platform.environment("test_env").expect("created");
    assert_eq!(env.revisions.len(), 1);
    let tags = &env.revisions[0].request.fields.tags;
    assert!(tags.contains(&Signature::compute(&test_env("A")).to_tag()));
}

#[test]
fn unchanged_rerun_is_noop_without_mutations() {
    let platform = MemoryPlatform::new();
    apply(&platform, vec![test_env("A")]);
    platform.reset_calls();

    let summary = apply(&platform, vec![test_env("A")]);
    assert_eq!(summary.unchanged(), 1);
    assert_eq!(platform.mutating_calls(), 0);
    assert_eq!(platform.environment("test_env").expect("env").revisions.len(), 1);
}

#[test]
fn changed_build_spec_revises_same_environment() {
    let platform = MemoryPlatform::new();
    apply(&platform, vec![test_env("A")]);
    let id = platform.environment("test_env").expect("env").id;

    let summary = apply(&platform, vec![test_env("B")]);
    let outcome = summary.outcome("test_env").expect("outcome");
    assert_eq!(outcome.decision, Some(Decision::Revise));
    assert_eq!(outcome.environment_id, Some(id.clone()));

    let env = platform.environment("test_env").expect("env");
    assert_eq!(env.id, id);
    assert_eq!(env.revisions.len(), 2);
    let details = platform.get_environment(&id).expect("details");
    assert_eq!(details.recorded_signature(), Some(Signature::compute(&test_env("B"))));
}

#[test]
fn second_run_converges_to_noop() {
    let platform = MemoryPlatform::new();
    platform.seed_environment("legacy", Some(vec!["1.0".into()]));
    let defs = || {
        vec![
            TemplateDefinition::new("legacy", BuildSpec::from_image("L")),
            TemplateDefinition::new("fresh", BuildSpec::from_image("F")),
        ]
    };

    let first = apply(&platform, defs());
    assert_eq!(first.created(), 1);
    assert_eq!(first.revised(), 1);

    platform.reset_calls();
    let second = apply(&platform, defs());
    assert_eq!(second.unchanged(), 2);
    assert_eq!(platform.mutating_calls(), 0);
}

#[test]
fn unmanaged_environments_are_left_alone() {
    let platform = MemoryPlatform::new();
    platform.seed_environment("someone_elses", Some(vec!["v1".into()]));
    apply(&platform, vec![test_env("A")]);

    let other = platform.environment("someone_elses").expect("other");
    assert_eq!(other.revisions.len(), 1);
    assert_eq!(platform.calls(Operation::GetEnvironment), 0);
}

// ---------------------------------------------------------------------------
// 2. Failures and recovery
// ---------------------------------------------------------------------------

#[test]
fn partial_create_is_repaired_by_next_run() {
    let platform = MemoryPlatform::new();
    platform.fail_next(
        Operation::CreateRevision,
        RemoteError::from_status(Operation::CreateRevision, 422, "image not found"),
    );

    let first = apply(&platform, vec![test_env("A")]);
    let outcome = first.outcome("test_env").expect("outcome");
    assert_eq!(outcome.failure, Some(FailureKind::PartiallyApplied));
    assert!(!first.is_success());

    let second = apply(&platform, vec![test_env("A")]);
    let outcome = second.outcome("test_env").expect("outcome");
    assert!(outcome.succeeded);
    assert_eq!(outcome.decision, Some(Decision::Revise));
    assert_eq!(platform.environments().len(), 1);

    platform.reset_calls();
    let third = apply(&platform, vec![test_env("A")]);
    assert_eq!(third.unchanged(), 1);
    assert_eq!(platform.mutating_calls(), 0);
}

#[test]
fn lost_revision_response_does_not_duplicate_the_revision() {
    let platform = MemoryPlatform::new();
    platform.seed_environment("test_env", None);
    platform.fail_next_after_commit(
        Operation::CreateRevision,
        RemoteError::transient(Operation::CreateRevision, "read timed out"),
    );

    let summary = apply(&platform, vec![test_env("A")]);
    let outcome = summary.outcome("test_env").expect("outcome");
    assert!(outcome.succeeded);
    assert_eq!(outcome.decision, Some(Decision::Revise));
    assert_eq!(platform.environment("test_env").expect("env").revisions.len(), 1);
    assert_eq!(platform.calls(Operation::CreateRevision), 1);

    platform.reset_calls();
    let again = apply(&platform, vec![test_env("A")]);
    assert_eq!(again.unchanged(), 1);
    assert_eq!(platform.mutating_calls(), 0);
}

#[rstest]
#[case::retries_exhausted(RemoteError::transient(Operation::CreateEnvironment, "timeout"), 3, FailureKind::RetriesExhausted)]
#[case::rejected(RemoteError::rejected(Operation::CreateEnvironment, 422, "bad spec"), 1, FailureKind::RemoteValidation)]
fn create_failures_are_classified(
    #[case] error: RemoteError,
    #[case] times: usize,
    #[case] expected: FailureKind,
) {
    let platform = MemoryPlatform::new();
    platform.fail_times(Operation::CreateEnvironment, times, error);

    let summary = apply(&platform, vec![test_env("A")]);
    let outcome = summary.outcome("test_env").expect("outcome");
    assert_eq!(outcome.failure, Some(expected));
    assert!(platform.environment("test_env").is_none());
}

#[test]
fn unreachable_platform_aborts_the_run() {
    let platform = MemoryPlatform::new();
    platform.fail_times(
        Operation::ListEnvironments,
        3,
        RemoteError::transient(Operation::ListEnvironments, "connection refused"),
    );
    let err = run_templates(&platform, templates(vec![test_env("A")]), RunMode::Apply, retry())
        .unwrap_err();
    assert!(matches!(err, RunError::RemoteUnavailable(_)));
    assert_eq!(platform.mutating_calls(), 0);
}

// ---------------------------------------------------------------------------
// 3. From disk
// ---------------------------------------------------------------------------

#[test]
fn malformed_template_on_disk_does_not_stop_the_run() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    root.child("good/environment.yaml")
        .write_str("name: good\nbuildSpec:\n  image: quay.io/base:1\n")
        .unwrap();
    root.child("broken/environment.yml")
        .write_str("name: broken\nbuildSpec:\n  image: ''\n")
        .unwrap();

    let platform = MemoryPlatform::new();
    let summary = run(&platform, root.path(), RunMode::Apply, retry()).expect("run");

    let broken = summary.outcome("broken").expect("broken");
    assert_eq!(broken.failure, Some(FailureKind::MalformedTemplate));
    assert_eq!(broken.decision, None);
    assert!(summary.outcome("good").expect("good").succeeded);
    assert!(platform.environment("good").is_some());
    assert_eq!(summary.failed(), 1);
}

#[test]
fn plan_reports_without_changing_anything() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    root.child("test_env/environment.yaml")
        .write_str("name: test_env\nbuildSpec: A\n")
        .unwrap();

    let platform = MemoryPlatform::new();
    let summary = run(&platform, root.path(), RunMode::Plan, retry()).expect("plan");
    assert_eq!(summary.mode, RunMode::Plan);
    assert_eq!(
        summary.outcome("test_env").and_then(|o| o.decision),
        Some(Decision::Create)
    );
    assert!(platform.environments().is_empty());
    assert_eq!(platform.mutating_calls(), 0);
}

#[test]
fn missing_root_is_a_load_error() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let platform = MemoryPlatform::new();
    let err = run(&platform, &root.path().join("nope"), RunMode::Apply, retry()).unwrap_err();
    assert!(matches!(err, RunError::Load(_)));
    assert_eq!(platform.calls(Operation::ListEnvironments), 0);
}
