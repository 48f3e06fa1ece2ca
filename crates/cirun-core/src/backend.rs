//! The capability both CI backends implement: dispatch a run, optionally
//! look up its id, and poll it until it reaches a terminal status.

use crate::error::Result;
use crate::types::{BackendKind, RunId, RunStatus};
use std::time::Duration;
use tracing::{debug, warn};

/// What a successful dispatch hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// The API returned the new run's id directly.
    Run(RunId),
    /// The API accepted the request without an id; it must be looked up.
    Accepted,
}

impl Dispatched {
    pub fn run_id(self) -> Option<RunId> {
        match self {
            Dispatched::Run(id) => Some(id),
            Dispatched::Accepted => None,
        }
    }
}

/// How a wait for a terminal status ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Succeeded { polls: u32 },
    Failed { polls: u32 },
    TimedOut { polls: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3600),
            interval: Duration::from_secs(30),
        }
    }
}

/// Blocking pause between remote calls. Swapped out in tests.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

pub trait Backend {
    /// The configured thing a run is started for.
    type Target;

    fn kind(&self) -> BackendKind;

    fn dispatch(&self, target: &Self::Target) -> Result<Dispatched>;

    /// Pause between an `Accepted` dispatch and `resolve_run_id`, so the
    /// remote run listing has a chance to show the new run.
    fn settle_delay(&self) -> Duration {
        Duration::ZERO
    }

    /// Find the id of a run whose dispatch returned `Accepted`.
    fn resolve_run_id(&self, _target: &Self::Target) -> Result<Option<RunId>> {
        Ok(None)
    }

    fn poll(&self, target: &Self::Target, run: RunId) -> Result<RunStatus>;

    /// Poll every `policy.interval` until the run is terminal or the sleeps
    /// would exceed `policy.timeout`. A failed poll is logged and retried on
    /// the next tick. The number of polls lies between
    /// `timeout / interval` and one more than that.
    fn await_terminal(
        &self,
        target: &Self::Target,
        run: RunId,
        policy: &PollPolicy,
        sleeper: &dyn Sleeper,
    ) -> Terminal {
        let mut waited = Duration::ZERO;
        let mut polls = 0u32;
        loop {
            polls += 1;
            match self.poll(target, run) {
                Ok(RunStatus::Succeeded) => return Terminal::Succeeded { polls },
                Ok(RunStatus::Failed) => return Terminal::Failed { polls },
                Ok(RunStatus::Pending) => {
                    debug!(backend = %self.kind(), run = %run, polls, "run still in progress");
                }
                Err(e) => {
                    warn!(backend = %self.kind(), run = %run, "status check failed, will retry: {e}");
                }
            }
            if policy.interval.is_zero() || waited + policy.interval > policy.timeout {
                return Terminal::TimedOut { polls };
            }
            sleeper.sleep(policy.interval);
            waited += policy.interval;
        }
    }
}
