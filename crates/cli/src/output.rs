// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output formatting for CLI commands

use clap::ValueEnum;
use crashd_engine::{ActionStatus, HostReport, RunReport, RunStatus};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Print output in the specified format
pub fn print<T: Serialize + fmt::Display>(value: &T, format: OutputFormat) {
    match format {
        OutputFormat::Text => print!("{}", value),
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(value) {
                println!("{}", json);
            }
        }
    }
}

/// Process exit status for a finished run
pub fn exit_status(status: RunStatus) -> u8 {
    match status {
        RunStatus::Completed => 0,
        RunStatus::Failed => 1,
        RunStatus::PartiallyFailed => 2,
        RunStatus::Cancelled => 130,
    }
}

/// Human-readable rendering of a [`RunReport`]
#[derive(Serialize)]
#[serde(transparent)]
pub struct ReportView<'a>(pub &'a RunReport);

impl fmt::Display for ReportView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;
        let elapsed = humantime::format_duration(Duration::from_millis(report.elapsed_ms));
        writeln!(f, "run {} in {}", report.status, elapsed)?;
        writeln!(f, "workdir: {}", report.workdir.display())?;

        for host in &report.hosts {
            write_host(f, host)?;
        }

        writeln!(f, "output: {}", report.output.display())?;
        if let Some(kubeconfig) = &report.kubeconfig {
            writeln!(f, "kubeconfig: {}", kubeconfig.display())?;
        }
        Ok(())
    }
}

fn write_host(f: &mut fmt::Formatter<'_>, host: &HostReport) -> fmt::Result {
    write!(
        f,
        "  {:<24} {:<10} {} ok, {} failed, {} skipped",
        host.address.as_deref().unwrap_or(&host.host),
        host.status.to_string(),
        host.count(ActionStatus::Succeeded),
        host.count(ActionStatus::Failed),
        host.count(ActionStatus::Skipped),
    )?;
    match &host.error {
        Some(error) => writeln!(f, " ({error})")?,
        None => writeln!(f)?,
    }

    for action in &host.actions {
        write!(
            f,
            "    {:>4}  {:<8} {:<7} {}",
            action.line,
            action.kind.to_string(),
            action.status.to_string(),
            action.label
        )?;
        if let Some(artifact) = &action.artifact {
            write!(f, " -> {}", artifact.display())?;
        }
        if let Some(error) = &action.error {
            write!(f, " [{error}]")?;
        }
        writeln!(f)?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
