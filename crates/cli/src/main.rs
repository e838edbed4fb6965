// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! crashd - remote diagnostics collector

mod commands;
mod completions;
mod config;
mod output;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use commands::{check, run};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "crashd",
    version,
    about = "crashd - Collect diagnostics from remote machines"
)]
pub(crate) struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/crashd/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log more (repeat for trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a diagnostics script against its FROM hosts
    Run(run::RunArgs),
    /// Parse and validate a script without connecting anywhere
    Check(check::CheckArgs),
    /// Print shell completions
    Completions(completions::CompletionsArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Completions(args) => {
            completions::generate_completions::<Cli>(args.shell);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check(args) => check::check(args),
        Commands::Run(args) => {
            let file = config::load(cli.config.as_deref())?;
            run::run(args, file).await
        }
    }
}

/// Logs go to stderr; stdout carries only the report
fn setup_logging(verbose: u8) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
