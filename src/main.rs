mod cli;
mod error;
mod series;
mod simulate;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::error::exit_code_for_error;
use crate::series::run_series;
use crate::simulate::run_simulate;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .try_init()
        .ok();

    let cli = Cli::parse();
    let result: Result<()> = match cli.command {
        Some(Commands::Simulate(sim)) => run_simulate(sim),
        Some(Commands::Series(series)) => run_series(series),
        None => {
            Cli::command().print_help().ok();
            println!();
            Ok(())
        }
    };

    if let Err(err) = result {
        let code = exit_code_for_error(&err);
        eprintln!("error: {err:?}");
        std::process::exit(code);
    }
}
