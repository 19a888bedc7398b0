use std::process::ExitCode;

use clap::{Parser, Subcommand};
use commands::{
    plan::{self, PlanArgs},
    run::{self, RunArgs},
    summarize::{self, SummarizeArgs},
};

mod commands;
mod logging;

#[derive(Parser, Debug)]
#[command(name = "nsrun", about = "Nested sampling batch scheduler")]
struct Cli {
    /// Log at debug level unless NSRUN_LOG says otherwise.
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a batch plan YAML with default settings.
    Plan(PlanArgs),
    /// Execute a batch plan with the reference sampler.
    Run(RunArgs),
    /// Print per-group outcome counts of a batch report.
    Summarize(SummarizeArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let result = match &cli.command {
        Command::Plan(args) => plan::run(args),
        Command::Run(args) => run::run(args),
        Command::Summarize(args) => summarize::run(args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "nsrun failed");
            eprintln!("error: {err}");
            ExitCode::from(u8::try_from(err.exit_status()).unwrap_or(1))
        }
    }
}
