// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `crashd run <script>` - Collect diagnostics from the script's hosts

use crate::config::FileConfig;
use crate::output::{self, OutputFormat, ReportView};
use anyhow::Result;
use clap::Args;
use crashd_adapters::{SshAdapter, TracedSessionAdapter};
use crashd_engine::{ExecutorConfig, Executor, UnresolvedPolicy};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Script file
    pub script: PathBuf,

    /// Workdir root when the script has no WORKDIR path
    #[arg(long)]
    pub workdir: Option<PathBuf>,

    /// Bundle path when the script has no OUTPUT path
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Hosts worked on at once
    #[arg(long, value_name = "N")]
    pub max_concurrency: Option<usize>,

    /// Per-command timeout unless the script declares TIMEOUT (e.g. 30s, 2m)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,

    /// Bound on establishing each SSH session
    #[arg(long, value_parser = humantime::parse_duration)]
    pub connect_timeout: Option<Duration>,

    /// Cancel the whole run after this long
    #[arg(long, value_parser = humantime::parse_duration)]
    pub run_timeout: Option<Duration>,

    /// abort-run, abort-host or skip-action when an action uses an unbound variable
    #[arg(long, value_name = "POLICY")]
    pub on_unresolved: Option<UnresolvedPolicy>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

impl RunArgs {
    /// Flags over file values over defaults
    pub fn executor_config(&self, file: &FileConfig) -> ExecutorConfig {
        let mut config = file.executor_config();
        if let Some(dir) = &self.workdir {
            config.default_workdir = dir.clone();
        }
        if let Some(output) = &self.output {
            config.default_output = output.clone();
        }
        if let Some(n) = self.max_concurrency {
            config.max_concurrency = n;
        }
        if let Some(t) = self.timeout {
            config.command_timeout = t;
        }
        if let Some(t) = self.connect_timeout {
            config.connect_timeout = t;
        }
        if self.run_timeout.is_some() {
            config.run_timeout = self.run_timeout;
        }
        if let Some(policy) = self.on_unresolved {
            config.unresolved = policy;
        }
        config
    }
}

pub async fn run(args: RunArgs, file: FileConfig) -> Result<ExitCode> {
    let script = super::load_script(&args.script)?;
    let config = args.executor_config(&file);
    tracing::debug!(?config, "executor config");

    let adapter = TracedSessionAdapter::new(SshAdapter::new(file.ssh_config()));
    let executor = Executor::new(adapter, config);

    let cancel = executor.cancel_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling run");
            cancel.cancel();
        }
    });

    let result = executor.run(&script).await;
    interrupt.abort();
    let report = result?;

    output::print(&ReportView(&report), args.format);
    Ok(ExitCode::from(output::exit_status(report.status)))
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
