//! Batch orchestration: run every configured entry in file order and stop
//! at the first failure unless continue-on-error is set.

use crate::backend::Backend;
use crate::config::{AzurePipeline, GitHubWorkflow, WorkflowEntry};
use crate::lifecycle::{EntryReport, Outcome, Runner, SkipReason};
use crate::types::BackendKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub succeeded: usize,
    pub dispatched: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub skipped: usize,
    pub not_attempted: usize,
}

impl Summary {
    pub fn from_reports(reports: &[EntryReport]) -> Self {
        let mut summary = Summary {
            total: reports.len(),
            ..Summary::default()
        };
        for report in reports {
            match report.outcome {
                Outcome::Succeeded => summary.succeeded += 1,
                Outcome::Dispatched => summary.dispatched += 1,
                Outcome::Failed { .. } => summary.failed += 1,
                Outcome::TimedOut { .. } => summary.timed_out += 1,
                Outcome::Skipped { .. } => summary.skipped += 1,
                Outcome::NotAttempted => summary.not_attempted += 1,
            }
        }
        summary
    }

    pub fn failures(&self) -> usize {
        self.failed + self.timed_out
    }
}

// ---------------------------------------------------------------------------
// BatchReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// True when a failure stopped the batch before every entry ran.
    pub halted: bool,
    pub summary: Summary,
    pub entries: Vec<EntryReport>,
}

impl BatchReport {
    pub fn has_failures(&self) -> bool {
        self.summary.failures() > 0
    }
}

pub fn run_batch<G, A>(runner: &Runner<'_, G, A>, entries: &[WorkflowEntry]) -> BatchReport
where
    G: Backend<Target = GitHubWorkflow>,
    A: Backend<Target = AzurePipeline>,
{
    let started_at = Utc::now();
    let mut reports = Vec::with_capacity(entries.len());
    let mut halted = false;

    info!("Processing {} workflow entries", entries.len());

    for (index, entry) in entries.iter().enumerate() {
        if halted {
            reports.push(EntryReport::not_attempted(index, entry));
            continue;
        }

        let report = runner.run_entry(index, entry);
        if report.outcome.is_failure() {
            if runner.options.continue_on_error {
                warn!("{} failed; continuing with the next entry", report.label);
            } else {
                error!("{} failed; stopping the batch", report.label);
                halted = true;
            }
        }
        reports.push(report);
    }

    let summary = Summary::from_reports(&reports);
    info!(
        total = summary.total,
        succeeded = summary.succeeded,
        dispatched = summary.dispatched,
        failed = summary.failed,
        timed_out = summary.timed_out,
        skipped = summary.skipped,
        not_attempted = summary.not_attempted,
        "batch finished"
    );

    BatchReport {
        started_at,
        finished_at: Utc::now(),
        halted,
        summary,
        entries: reports,
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// What a run would do with one entry, without touching the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedEntry {
    pub index: usize,
    pub label: String,
    pub backend: BackendKind,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<SkipReason>,
}

pub fn plan<G, A>(runner: &Runner<'_, G, A>, entries: &[WorkflowEntry]) -> Vec<PlannedEntry>
where
    G: Backend<Target = GitHubWorkflow>,
    A: Backend<Target = AzurePipeline>,
{
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let skip = runner.skip_reason(entry);
            match skip {
                Some(reason) => info!("[dry run] would skip {} ({reason:?})", entry.label()),
                None => info!("[dry run] would trigger {}", entry.label()),
            }
            PlannedEntry {
                index,
                label: entry.label(),
                backend: entry.kind(),
                target: entry.target.to_string(),
                skip,
            }
        })
        .collect()
}
