// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Executor configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound on concurrently connected hosts when not configured
pub const DEFAULT_MAX_CONCURRENCY: usize = 16;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_OUTPUT: &str = "crashd-bundle.tar.gz";

/// What happens when an action references an unbound variable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnresolvedPolicy {
    /// Stop every host and fail the run
    AbortRun,
    /// Stop the affected host's remaining actions
    #[default]
    AbortHost,
    /// Record the action as skipped and carry on
    SkipAction,
}

impl UnresolvedPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            UnresolvedPolicy::AbortRun => "abort-run",
            UnresolvedPolicy::AbortHost => "abort-host",
            UnresolvedPolicy::SkipAction => "skip-action",
        }
    }
}

impl fmt::Display for UnresolvedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnresolvedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "abort-run" => Ok(UnresolvedPolicy::AbortRun),
            "abort-host" => Ok(UnresolvedPolicy::AbortHost),
            "skip-action" | "skip" => Ok(UnresolvedPolicy::SkipAction),
            other => Err(format!(
                "unknown policy {other:?} (expected abort-run, abort-host or skip-action)"
            )),
        }
    }
}

/// Run-wide executor settings
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Hosts worked on at once; capped to the host count
    pub max_concurrency: usize,
    /// Bound on establishing each session
    pub connect_timeout: Duration,
    /// Per-command bound unless the script declares TIMEOUT
    pub command_timeout: Duration,
    /// Whole-run bound; expiry cancels the run
    pub run_timeout: Option<Duration>,
    pub unresolved: UnresolvedPolicy,
    /// Workdir root when the script has no WORKDIR path
    pub default_workdir: PathBuf,
    /// Bundle path when the script has no OUTPUT path
    pub default_output: PathBuf,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            run_timeout: None,
            unresolved: UnresolvedPolicy::default(),
            default_workdir: std::env::temp_dir().join("crashd"),
            default_output: PathBuf::from(DEFAULT_OUTPUT),
        }
    }
}

impl ExecutorConfig {
    /// Worker count for `hosts` targets
    pub fn concurrency_for(&self, hosts: usize) -> usize {
        self.max_concurrency.max(1).min(hosts.max(1))
    }
}
