//! # envsync-engine
//!
//! Reconciles loaded templates against the platform.
//!
//! Call [`pipeline::run`] to load a templates root, observe remote state,
//! decide and apply an action per template, and get a [`RunSummary`] back.
//! The stages are usable on their own:
//!
//! - [`reader::RemoteStateReader`]: observed state, read once per run
//! - [`reconcile::reconcile`]: pure decision: no-op, create or revise
//! - [`executor::ActionExecutor`]: applies a decision with retries

pub mod error;
pub mod executor;
pub mod outcome;
pub mod pipeline;
pub mod reader;
pub mod reconcile;

pub use error::{FailureKind, RunError};
pub use executor::ActionExecutor;
pub use outcome::{RunOutcome, RunSummary};
pub use pipeline::{run, run_templates, RunMode};
pub use reader::{ObservedState, RemoteEnvironment, RemoteStateReader};
pub use reconcile::{decide, reconcile, Decision, DecisionReason, Reconciliation};
