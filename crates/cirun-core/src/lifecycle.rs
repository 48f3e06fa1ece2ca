//! Per-entry run lifecycle: trigger, resolve the run id, poll until
//! terminal, and turn the result into an [`Outcome`].

use crate::azure::{self, AzureClient};
use crate::backend::{Backend, Dispatched, PollPolicy, Sleeper, Terminal};
use crate::config::{AzurePipeline, GitHubWorkflow, Target, WorkflowEntry};
use crate::credentials::Credentials;
use crate::error::{CirunError, Result};
use crate::github::{self, GitHubClient};
use crate::types::{BackendKind, RunId, RunState};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, error, info, warn};

// ---------------------------------------------------------------------------
// RunOptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Poll each run until it is terminal. When false, a successful dispatch
    /// finishes the entry.
    pub wait: bool,
    pub poll: PollPolicy,
    /// Keep going after an entry fails instead of halting the batch.
    pub continue_on_error: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            wait: true,
            poll: PollPolicy::default(),
            continue_on_error: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Disabled,
    MissingCredential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    DispatchUnauthorized,
    DispatchFailed,
    RunIdUnresolvable,
    RunFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The run finished successfully.
    Succeeded,
    /// Dispatched without waiting for the run.
    Dispatched,
    Failed { kind: FailureKind, message: String },
    TimedOut { waited_secs: u64 },
    Skipped { reason: SkipReason },
    /// Never reached because an earlier entry halted the batch.
    NotAttempted,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Succeeded => "succeeded",
            Outcome::Dispatched => "dispatched",
            Outcome::Failed { .. } => "failed",
            Outcome::TimedOut { .. } => "timed_out",
            Outcome::Skipped { .. } => "skipped",
            Outcome::NotAttempted => "not_attempted",
        }
    }

    /// Failures and timeouts both count against continue-on-error.
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed { .. } | Outcome::TimedOut { .. })
    }

    fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Outcome::Failed {
            kind,
            message: message.into(),
        }
    }

    fn from_dispatch_error(err: &CirunError) -> Self {
        let kind = match err {
            CirunError::Unauthorized { .. } => FailureKind::DispatchUnauthorized,
            _ => FailureKind::DispatchFailed,
        };
        Outcome::failed(kind, err.to_string())
    }
}

// ---------------------------------------------------------------------------
// EntryReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryReport {
    pub index: usize,
    pub label: String,
    pub backend: BackendKind,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    #[serde(flatten)]
    pub outcome: Outcome,
    /// States visited, in order.
    pub states: Vec<RunState>,
    pub elapsed_ms: u64,
}

impl EntryReport {
    pub fn not_attempted(index: usize, entry: &WorkflowEntry) -> Self {
        Self {
            index,
            label: entry.label(),
            backend: entry.kind(),
            target: entry.target.to_string(),
            run_id: None,
            outcome: Outcome::NotAttempted,
            states: vec![RunState::NotStarted],
            elapsed_ms: 0,
        }
    }
}

/// Tracks the state machine of one entry and logs each transition.
struct Lifecycle<'a> {
    label: &'a str,
    states: Vec<RunState>,
    run_id: Option<RunId>,
}

impl<'a> Lifecycle<'a> {
    fn new(label: &'a str) -> Self {
        Self {
            label,
            states: vec![RunState::NotStarted],
            run_id: None,
        }
    }

    fn enter(&mut self, state: RunState) {
        debug!(entry = self.label, %state, "state transition");
        self.states.push(state);
    }

    fn finish(mut self, outcome: Outcome) -> (Option<RunId>, Outcome, Vec<RunState>) {
        let last = match &outcome {
            Outcome::Succeeded => Some(RunState::Succeeded),
            Outcome::Failed { .. } => Some(RunState::Failed),
            Outcome::TimedOut { .. } => Some(RunState::TimedOut),
            Outcome::Skipped { .. } => Some(RunState::Skipped),
            Outcome::Dispatched | Outcome::NotAttempted => None,
        };
        if let Some(state) = last {
            self.enter(state);
        }
        (self.run_id, outcome, self.states)
    }
}

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

/// Base URLs for the two remote APIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub github: String,
    pub azure: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            github: github::DEFAULT_API_URL.to_string(),
            azure: azure::DEFAULT_API_URL.to_string(),
        }
    }
}

/// One client per backend whose credential is present. A missing client
/// means entries of that kind are skipped.
pub struct Backends<G = GitHubClient, A = AzureClient> {
    pub github: Option<G>,
    pub azure: Option<A>,
}

impl Backends {
    pub fn connect(credentials: &Credentials, endpoints: &Endpoints) -> Result<Self> {
        let github = credentials
            .github()
            .map(|token| GitHubClient::with_base_url(token, &endpoints.github))
            .transpose()?;
        let azure = credentials
            .azure()
            .map(|token| AzureClient::with_base_url(token, &endpoints.azure))
            .transpose()?;
        Ok(Self { github, azure })
    }
}

impl<G, A> Backends<G, A> {
    pub fn has(&self, kind: BackendKind) -> bool {
        match kind {
            BackendKind::Github => self.github.is_some(),
            BackendKind::Azure => self.azure.is_some(),
        }
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Drives single entries through their lifecycle against a set of backends.
pub struct Runner<'a, G = GitHubClient, A = AzureClient> {
    pub backends: &'a Backends<G, A>,
    pub options: RunOptions,
    pub sleeper: &'a dyn Sleeper,
}

impl<'a, G, A> Runner<'a, G, A>
where
    G: Backend<Target = GitHubWorkflow>,
    A: Backend<Target = AzurePipeline>,
{
    pub fn new(
        backends: &'a Backends<G, A>,
        options: RunOptions,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self {
            backends,
            options,
            sleeper,
        }
    }

    /// Why `entry` would be skipped, if it would be.
    pub fn skip_reason(&self, entry: &WorkflowEntry) -> Option<SkipReason> {
        if !entry.enabled {
            Some(SkipReason::Disabled)
        } else if !self.backends.has(entry.kind()) {
            Some(SkipReason::MissingCredential)
        } else {
            None
        }
    }

    pub fn run_entry(&self, index: usize, entry: &WorkflowEntry) -> EntryReport {
        let started = Instant::now();
        let label = entry.label();
        let mut lifecycle = Lifecycle::new(&label);

        let outcome = match self.skip_reason(entry) {
            Some(reason) => {
                match reason {
                    SkipReason::Disabled => info!("Skipping {label}: disabled in config"),
                    SkipReason::MissingCredential => warn!(
                        "Skipping {label} due to missing {} token",
                        entry.kind().display_name()
                    ),
                }
                Outcome::Skipped { reason }
            }
            None => match (&entry.target, &self.backends.github, &self.backends.azure) {
                (Target::Github(wf), Some(github), _) => self.drive(github, wf, &mut lifecycle),
                (Target::Azure(p), _, Some(azure)) => self.drive(azure, p, &mut lifecycle),
                _ => Outcome::Skipped {
                    reason: SkipReason::MissingCredential,
                },
            },
        };

        let (run_id, outcome, states) = lifecycle.finish(outcome);
        EntryReport {
            index,
            label,
            backend: entry.kind(),
            target: entry.target.to_string(),
            run_id,
            outcome,
            states,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    fn drive<B: Backend>(
        &self,
        backend: &B,
        target: &B::Target,
        lifecycle: &mut Lifecycle<'_>,
    ) -> Outcome {
        let label = lifecycle.label;

        let dispatched = match backend.dispatch(target) {
            Ok(d) => d,
            Err(e) => {
                error!("{e}");
                return Outcome::from_dispatch_error(&e);
            }
        };
        lifecycle.enter(RunState::Triggered);
        lifecycle.run_id = dispatched.run_id();

        if !self.options.wait {
            info!("Dispatched {label}; not waiting for completion");
            return Outcome::Dispatched;
        }

        let run = match dispatched {
            Dispatched::Run(id) => id,
            Dispatched::Accepted => {
                lifecycle.enter(RunState::Resolving);
                let settle = backend.settle_delay();
                if !settle.is_zero() {
                    debug!(entry = label, ?settle, "waiting for the run to be listed");
                    self.sleeper.sleep(settle);
                }
                match backend.resolve_run_id(target) {
                    Ok(Some(id)) => id,
                    Ok(None) => {
                        error!("Could not find the run started for {label}");
                        return Outcome::failed(
                            FailureKind::RunIdUnresolvable,
                            "no run found after dispatch",
                        );
                    }
                    Err(e) => {
                        error!("Could not look up the run started for {label}: {e}");
                        return Outcome::failed(FailureKind::RunIdUnresolvable, e.to_string());
                    }
                }
            }
        };
        lifecycle.run_id = Some(run);
        lifecycle.enter(RunState::Polling);
        info!("Waiting for run {run} of {label} to complete");

        match backend.await_terminal(target, run, &self.options.poll, self.sleeper) {
            Terminal::Succeeded { polls } => {
                info!("Run {run} of {label} succeeded after {polls} status check(s)");
                Outcome::Succeeded
            }
            Terminal::Failed { polls } => {
                error!("Run {run} of {label} failed after {polls} status check(s)");
                Outcome::failed(FailureKind::RunFailed, format!("run {run} failed"))
            }
            Terminal::TimedOut { polls } => {
                let waited = waited_secs(&self.options.poll, polls);
                error!("Timed out waiting for run {run} of {label} after {waited}s");
                Outcome::TimedOut { waited_secs: waited }
            }
        }
    }
}

/// Sleep time spent across `polls` status checks.
fn waited_secs(policy: &PollPolicy, polls: u32) -> u64 {
    let sleeps = polls.saturating_sub(1);
    (policy.interval * sleeps).as_secs()
}
