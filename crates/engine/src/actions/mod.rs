// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-kind action executors
//!
//! Each executor expands its command's fields against the action's scope
//! before touching the session.

mod capture;
mod copy;
mod run;

use crate::workdir::{HostDir, WorkdirError};
use crashd_adapters::{RemoteSession, SessionError};
use crashd_script::{Command, CommandKind, ExpandError, Scope};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Everything an action needs to run on one host
pub struct ActionContext<'a, S> {
    pub session: &'a S,
    pub host_dir: &'a HostDir,
    pub scope: Scope<'a>,
    pub timeout: Duration,
}

/// A successfully executed action
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionOutcome {
    pub artifact: Option<PathBuf>,
}

/// Errors from a single action
#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Unresolved(#[from] ExpandError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("exited with status {status}{}", stderr_suffix(.stderr))]
    NonZeroExit {
        status: i32,
        stderr: String,
        /// Output written before the failure was recorded
        artifact: Option<PathBuf>,
    },
    #[error(transparent)]
    Workdir(#[from] WorkdirError),
    #[error("{0} is not an action")]
    NotAnAction(CommandKind),
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

impl ActionError {
    /// The host's session is unusable after this error
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, ActionError::Session(e) if e.is_connection_lost())
    }

    /// Artifact left behind by a failed action
    pub fn artifact(&self) -> Option<&PathBuf> {
        match self {
            ActionError::NonZeroExit { artifact, .. } => artifact.as_ref(),
            _ => None,
        }
    }

    pub fn exit_status(&self) -> Option<i32> {
        match self {
            ActionError::NonZeroExit { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Run one action against a host's session
pub async fn execute<S: RemoteSession>(
    command: &Command,
    ctx: &ActionContext<'_, S>,
) -> Result<ActionOutcome, ActionError> {
    match command {
        Command::Capture(c) => capture::execute(c, ctx).await,
        Command::Copy(c) => copy::execute(c, ctx).await,
        Command::Run(c) => run::execute(c, ctx).await,
        Command::From(_)
        | Command::Env(_)
        | Command::Workdir(_)
        | Command::Output(_)
        | Command::As(_)
        | Command::Timeout(_)
        | Command::Kubeconfig(_) => Err(ActionError::NotAnAction(command.kind())),
    }
}

#[cfg(test)]
#[path = "actions_tests.rs"]
mod tests;
