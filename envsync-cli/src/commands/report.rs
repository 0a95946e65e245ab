//! Run summary rendering: table for humans, JSON for pipelines.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use envsync_engine::{Decision, RunMode, RunOutcome, RunSummary};

#[derive(Serialize)]
struct SummaryJson<'a> {
    mode: &'static str,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    success: bool,
    totals: TotalsJson,
    outcomes: Vec<OutcomeJson<'a>>,
}

#[derive(Serialize)]
struct TotalsJson {
    created: usize,
    revised: usize,
    unchanged: usize,
    failed: usize,
}

#[derive(Serialize)]
struct OutcomeJson<'a> {
    name: &'a str,
    decision: Option<&'static str>,
    reason: Option<&'static str>,
    status: &'static str,
    failure: Option<&'static str>,
    error: Option<&'a str>,
    signature: Option<&'a str>,
    environment_id: Option<&'a str>,
    revision_id: Option<&'a str>,
}

#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "environment")]
    name: String,
    #[tabled(rename = "decision")]
    decision: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "detail")]
    detail: String,
}

pub fn print_json(summary: &RunSummary) -> Result<()> {
    let payload = SummaryJson {
        mode: summary.mode.as_str(),
        started_at: summary.started_at,
        finished_at: summary.finished_at,
        success: summary.is_success(),
        totals: TotalsJson {
            created: summary.created(),
            revised: summary.revised(),
            unchanged: summary.unchanged(),
            failed: summary.failed(),
        },
        outcomes: summary
            .outcomes
            .iter()
            .map(|o| OutcomeJson {
                name: &o.name,
                decision: o.decision.as_ref().map(Decision::as_str),
                reason: o.reason.as_ref().map(|r| r.describe()),
                status: status_key(o, summary.mode),
                failure: o.failure.as_ref().map(|f| f.as_str()),
                error: o.error_detail.as_deref(),
                signature: o.signature.as_ref().map(|s| s.as_hex()),
                environment_id: o.environment_id.as_ref().map(|id| id.0.as_str()),
                revision_id: o.revision_id.as_ref().map(|id| id.0.as_str()),
            })
            .collect(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize run summary")?
    );
    Ok(())
}

pub fn print_table(summary: &RunSummary) {
    let elapsed = summary.finished_at - summary.started_at;
    println!(
        "envsync v{} | {} | {} template(s) | {:.1}s",
        env!("CARGO_PKG_VERSION"),
        summary.mode,
        summary.outcomes.len(),
        elapsed.num_milliseconds() as f64 / 1000.0,
    );

    if summary.outcomes.is_empty() {
        println!("No templates to reconcile.");
        return;
    }

    let rows: Vec<OutcomeRow> = summary
        .outcomes
        .iter()
        .map(|o| OutcomeRow {
            name: o.name.clone(),
            decision: o
                .decision
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string()),
            status: status_label(o, summary.mode),
            detail: detail(o),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    let failed = summary.failed();
    let totals = format!(
        "{} created, {} revised, {} unchanged, {} failed",
        summary.created(),
        summary.revised(),
        summary.unchanged(),
        failed,
    );
    if failed > 0 {
        println!("{}", totals.red().bold());
        if summary.outcomes.iter().any(|o| o.failure.is_some() && o.decision.is_some()) {
            println!("Re-run to retry the failed environments; completed ones will be skipped.");
        }
    } else {
        println!("{}", totals.green().bold());
    }
}

fn status_key(outcome: &RunOutcome, mode: RunMode) -> &'static str {
    match (outcome.succeeded, mode, outcome.decision) {
        (false, _, _) => "failed",
        (true, RunMode::Plan, Some(Decision::Create | Decision::Revise)) => "pending",
        (true, _, _) => "ok",
    }
}

fn status_label(outcome: &RunOutcome, mode: RunMode) -> String {
    let key = status_key(outcome, mode);
    match key {
        "failed" => key.to_uppercase().red().bold().to_string(),
        "pending" => key.to_uppercase().yellow().bold().to_string(),
        _ => match outcome.decision {
            Some(Decision::NoOp) => key.to_uppercase().bright_black().to_string(),
            _ => key.to_uppercase().green().bold().to_string(),
        },
    }
}

fn detail(outcome: &RunOutcome) -> String {
    if let Some(error) = &outcome.error_detail {
        let kind = outcome.failure.map(|f| f.as_str()).unwrap_or("error");
        return format!("{kind}: {error}");
    }
    let reason = outcome.reason.map(|r| r.describe()).unwrap_or_default();
    match &outcome.revision_id {
        Some(rev) => format!("{reason} (revision {rev})"),
        None => reason.to_string(),
    }
}
