// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured run results

use crashd_script::CommandKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Overall outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    /// Every host ran; individual actions may still have failed
    Completed,
    /// At least one host failed and at least one did not
    PartiallyFailed,
    /// Every host failed, or the run was aborted
    Failed,
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Completed => "completed",
            RunStatus::PartiallyFailed => "partially-failed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostStatus {
    Succeeded,
    Failed,
    Cancelled,
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HostStatus::Succeeded => "succeeded",
            HostStatus::Failed => "failed",
            HostStatus::Cancelled => "cancelled",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ActionStatus::Succeeded => "ok",
            ActionStatus::Failed => "failed",
            ActionStatus::Skipped => "skipped",
        })
    }
}

/// Why a host failed or stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostErrorKind {
    InvalidHostSpec,
    Connection,
    Authentication,
    Workdir,
    /// An action with an abort policy failed
    Aborted,
    AllActionsFailed,
    Cancelled,
    /// The host task panicked
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostError {
    pub kind: HostErrorKind,
    pub message: String,
}

impl HostError {
    pub fn new(kind: HostErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Result of one declared action on one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub line: usize,
    pub kind: CommandKind,
    /// Declared (unexpanded) command text or path
    pub label: String,
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

/// Everything one FROM entry produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostReport {
    /// Machine id, or the FROM entry as written when it did not resolve
    pub host: String,
    /// `user@host[:port]` for resolved machines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub status: HostStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<HostError>,
    /// In declaration order
    pub actions: Vec<ActionRecord>,
    pub artifacts: Vec<PathBuf>,
}

impl HostReport {
    pub fn new(host: impl Into<String>, address: Option<String>) -> Self {
        Self {
            host: host.into(),
            address,
            status: HostStatus::Succeeded,
            error: None,
            actions: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    /// A host that never got as far as connecting
    pub fn failed(host: impl Into<String>, error: HostError) -> Self {
        let mut report = Self::new(host, None);
        report.fail(error);
        report
    }

    pub fn fail(&mut self, error: HostError) {
        self.status = HostStatus::Failed;
        self.error = Some(error);
    }

    pub fn cancel(&mut self, message: impl Into<String>) {
        self.status = HostStatus::Cancelled;
        self.error = Some(HostError::new(HostErrorKind::Cancelled, message));
    }

    pub fn record(&mut self, record: ActionRecord) {
        if let Some(artifact) = &record.artifact {
            self.artifacts.push(artifact.clone());
        }
        self.actions.push(record);
    }

    pub fn count(&self, status: ActionStatus) -> usize {
        self.actions.iter().filter(|a| a.status == status).count()
    }

    /// Some action failed and none succeeded
    pub fn all_actions_failed(&self) -> bool {
        self.count(ActionStatus::Failed) > 0 && self.count(ActionStatus::Succeeded) == 0
    }
}

/// Final, serializable outcome of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub workdir: PathBuf,
    /// Where the external bundler should write the archive
    pub output: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,
    /// In FROM order
    pub hosts: Vec<HostReport>,
    pub elapsed_ms: u64,
}

impl RunReport {
    pub fn host(&self, host: &str) -> Option<&HostReport> {
        self.hosts.iter().find(|h| h.host == host)
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &PathBuf> {
        self.hosts.iter().flat_map(|h| h.artifacts.iter())
    }

    pub fn failed_hosts(&self) -> usize {
        self.hosts
            .iter()
            .filter(|h| h.status == HostStatus::Failed)
            .count()
    }
}

/// Run status from host outcomes
///
/// `stop` is set when the run was cancelled or aborted before finishing.
pub(crate) fn run_status(hosts: &[HostReport], stop: Option<StopReason>) -> RunStatus {
    match stop {
        Some(StopReason::Cancelled) => return RunStatus::Cancelled,
        Some(StopReason::Aborted) => return RunStatus::Failed,
        None => {}
    }
    let failed = hosts
        .iter()
        .filter(|h| h.status == HostStatus::Failed)
        .count();
    if failed == 0 {
        RunStatus::Completed
    } else if failed == hosts.len() {
        RunStatus::Failed
    } else {
        RunStatus::PartiallyFailed
    }
}

/// Why in-flight host work was told to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Caller cancellation or run timeout
    Cancelled,
    /// A host hit the abort-run unresolved policy
    Aborted,
}

#[cfg(test)]
#[path = "report_tests.rs"]
mod tests;
