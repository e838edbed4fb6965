// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `crashd check <script>` - Validate a script offline

use crate::output::{self, OutputFormat};
use anyhow::{Context, Result};
use clap::Args;
use crashd_script::{CommandKind, Script, Statement, ValidationError};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Script file
    pub script: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// What a valid script will do, in declaration order
#[derive(Debug, Serialize)]
pub struct CheckSummary {
    pub hosts: Vec<String>,
    pub preambles: Vec<StatementView>,
    pub actions: Vec<StatementView>,
}

#[derive(Debug, Serialize)]
pub struct StatementView {
    pub line: usize,
    pub kind: CommandKind,
    pub text: String,
}

impl From<&Statement> for StatementView {
    fn from(statement: &Statement) -> Self {
        Self {
            line: statement.line,
            kind: statement.kind(),
            text: statement.command.label(),
        }
    }
}

impl CheckSummary {
    pub fn new(script: &Script) -> Result<Self, ValidationError> {
        script.validate()?;
        let hosts = script.from()?.command.hosts.clone();

        let mut preambles: Vec<StatementView> = CommandKind::ALL
            .into_iter()
            .filter(|kind| kind.is_preamble())
            .flat_map(|kind| script.preambles(kind))
            .map(StatementView::from)
            .collect();
        preambles.sort_by_key(|s| s.line);

        Ok(Self {
            hosts,
            preambles,
            actions: script.actions().iter().map(StatementView::from).collect(),
        })
    }
}

impl fmt::Display for CheckSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "hosts: {}", self.hosts.join(" "))?;
        writeln!(f, "preambles:")?;
        for s in &self.preambles {
            writeln!(f, "  {:>4}  {}", s.line, s)?;
        }
        writeln!(f, "actions:")?;
        for s in &self.actions {
            writeln!(f, "  {:>4}  {}", s.line, s)?;
        }
        Ok(())
    }
}

impl fmt::Display for StatementView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.text)
    }
}

pub fn check(args: CheckArgs) -> Result<ExitCode> {
    let script = super::load_script(&args.script)?;
    let summary = CheckSummary::new(&script)
        .with_context(|| format!("{}", args.script.display()))?;
    output::print(&summary, args.format);
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
#[path = "check_tests.rs"]
mod tests;
