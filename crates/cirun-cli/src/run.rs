use crate::output;
use anyhow::Context;
use clap::Args;
use cirun_core::{
    azure, github, plan, run_batch, Backends, CirunError, Config, Credentials, Endpoints,
    PollPolicy, RunOptions, Runner, ThreadSleeper,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct RunArgs {
    /// Path to the configuration file
    #[arg(long, value_name = "PATH")]
    pub config: PathBuf,

    /// GitHub token for authentication
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Azure DevOps token for authentication
    #[arg(long, env = "AZURE_DEVOPS_TOKEN", hide_env_values = true)]
    pub azure_token: Option<String>,

    /// Trigger runs without waiting for them to complete
    #[arg(long)]
    pub no_wait: bool,

    /// Seconds of sleep between status checks allowed before a run counts as
    /// timed out. Time spent inside each status request is not counted.
    #[arg(long, value_name = "SECONDS", default_value_t = 3600)]
    pub timeout: u64,

    /// Seconds between status checks
    #[arg(
        long,
        value_name = "SECONDS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub poll_interval: u64,

    /// Continue with the next entry when one fails
    #[arg(long)]
    pub continue_on_error: bool,

    /// Validate the config and show what would run, without triggering anything
    #[arg(long)]
    pub dry_run: bool,

    /// Output the batch report as JSON
    #[arg(long, short = 'j')]
    pub json: bool,

    /// GitHub API base URL
    #[arg(long, env = "CIRUN_GITHUB_API_URL", default_value = github::DEFAULT_API_URL)]
    pub github_api_url: String,

    /// Azure DevOps base URL
    #[arg(long, env = "CIRUN_AZURE_API_URL", default_value = azure::DEFAULT_API_URL)]
    pub azure_api_url: String,

    /// Seconds to wait after a GitHub dispatch before looking up the run
    #[arg(long, value_name = "SECONDS", default_value_t = 5, hide = true)]
    pub settle_seconds: u64,
}

// ---------------------------------------------------------------------------
// CliExit: typed non-zero exit codes
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum CliExit {
    /// Config or credentials unusable; nothing was dispatched.
    Config(String),
    /// Setup failed for a reason unrelated to the config, such as the HTTP
    /// client failing to initialize.
    Setup(String),
    /// An entry failed and continue-on-error was off.
    BatchFailed { failed: usize },
}

impl CliExit {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliExit::Config(_) => 2,
            CliExit::Setup(_) | CliExit::BatchFailed { .. } => 1,
        }
    }

    fn from_core(err: CirunError) -> Self {
        if err.is_structural() {
            CliExit::Config(err.to_string())
        } else {
            CliExit::Setup(err.to_string())
        }
    }
}

impl std::fmt::Display for CliExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliExit::Config(message) | CliExit::Setup(message) => f.write_str(message),
            CliExit::BatchFailed { failed } => {
                let noun = if *failed == 1 { "entry" } else { "entries" };
                write!(f, "batch stopped after {failed} failed {noun}")
            }
        }
    }
}

impl std::error::Error for CliExit {}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

pub fn run(args: RunArgs) -> anyhow::Result<()> {
    let credentials = Credentials::new(args.github_token, args.azure_token);
    credentials.ensure_any().map_err(CliExit::from_core)?;

    let config = Config::load(&args.config).map_err(CliExit::from_core)?;
    info!(
        "Loaded {} workflow entries ({} enabled) from {}",
        config.workflows.len(),
        config.enabled_count(),
        args.config.display()
    );

    let endpoints = Endpoints {
        github: args.github_api_url,
        azure: args.azure_api_url,
    };
    let mut backends = Backends::connect(&credentials, &endpoints).map_err(CliExit::from_core)?;
    let settle = Duration::from_secs(args.settle_seconds);
    backends.github = backends
        .github
        .map(|client| client.settle_after_dispatch(settle));

    let options = RunOptions {
        wait: !args.no_wait,
        poll: PollPolicy {
            timeout: Duration::from_secs(args.timeout),
            interval: Duration::from_secs(args.poll_interval),
        },
        continue_on_error: args.continue_on_error,
    };
    let sleeper = ThreadSleeper;
    let runner = Runner::new(&backends, options, &sleeper);

    if args.dry_run {
        let planned = plan(&runner, &config.workflows);
        return output::print_plan(&planned, args.json).context("failed to write plan");
    }

    let report = run_batch(&runner, &config.workflows);
    output::print_report(&report, args.json).context("failed to write report")?;

    if report.has_failures() && !options.continue_on_error {
        return Err(CliExit::BatchFailed {
            failed: report.summary.failures(),
        }
        .into());
    }
    Ok(())
}
