mod output;
mod run;

use clap::Parser;
use run::{CliExit, RunArgs};

#[derive(Parser)]
#[command(
    name = "cirun",
    about = "CI/CD orchestrator: trigger GitHub Actions workflows and Azure DevOps pipelines from a config file",
    version
)]
struct Cli {
    #[command(flatten)]
    args: RunArgs,

    /// Log request-level detail (RUST_LOG overrides)
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run::run(cli.args) {
        eprintln!("error: {e:#}");
        let code = e
            .downcast_ref::<CliExit>()
            .map(CliExit::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}
