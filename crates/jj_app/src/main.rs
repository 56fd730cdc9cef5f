mod builds;
mod cli;
mod k8s;
mod run;
mod select;
mod terminal;

use std::process::ExitCode;

use clap::Parser;
use jj_engine::RunOutcome;
use jj_logging::{jj_error, jj_info, LogDestination, DEFAULT_LOG_FILE};
use log::LevelFilter;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            jj_error!("{err:#}");
            eprintln!("\nError: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(cli: &Cli) {
    let level = if cli.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let destination = if cli.log_to_terminal {
        LogDestination::Both(DEFAULT_LOG_FILE.into())
    } else {
        LogDestination::default()
    };
    jj_logging::initialize(destination, level);
}

async fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Command::Run(args) => {
            let settings = cli.server.client_settings()?;
            Ok(report(run::run(settings, args).await?))
        }
        Command::Builds(args) => {
            builds::builds(cli.server.client_settings()?, args).await?;
            Ok(ExitCode::SUCCESS)
        }
        // Talks to the cluster only; no build server needed.
        Command::K8s(args) => {
            k8s::k8s(args.into_pods()).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Prints how the chain ended. A cancellation the user asked for is not a
/// failure, whatever the server did with it.
fn report(outcome: RunOutcome) -> ExitCode {
    match outcome {
        RunOutcome::Completed => ExitCode::SUCCESS,
        RunOutcome::Failed(err) => {
            jj_error!("run failed: {err}");
            eprintln!("\nError: {err}");
            ExitCode::FAILURE
        }
        RunOutcome::Cancelled(outcome) => {
            jj_info!("run ended by interrupt: {outcome}");
            println!("{outcome}");
            ExitCode::SUCCESS
        }
    }
}
