//! `cirun-core`: trigger GitHub Actions workflows and Azure DevOps
//! pipelines from a config file and track each run to a terminal state.
//!
//! ```text
//! Config ──▶ batch::run_batch ──▶ Runner::run_entry ──▶ Backend
//!                 │                     │                  ├─ GitHubClient
//!                 │                     │                  └─ AzureClient
//!                 ◀── halt / continue ◀─┘ Outcome
//! ```

pub mod azure;
pub mod backend;
pub mod batch;
pub mod config;
pub mod credentials;
pub mod error;
pub mod github;
pub(crate) mod http;
pub mod lifecycle;
pub mod types;

pub use backend::{Backend, Dispatched, PollPolicy, Sleeper, Terminal, ThreadSleeper};
pub use batch::{plan, run_batch, BatchReport, PlannedEntry, Summary};
pub use config::{Config, Target, WorkflowEntry};
pub use credentials::Credentials;
pub use error::{CirunError, Result};
pub use lifecycle::{
    Backends, Endpoints, EntryReport, FailureKind, Outcome, RunOptions, Runner, SkipReason,
};
pub use types::{BackendKind, RunId, RunState, RunStatus};
