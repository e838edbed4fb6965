// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! crashd execution engine
//!
//! Turns a validated [`crashd_script::Script`] into per-host sessions,
//! artifacts on disk and a [`RunReport`].

pub mod actions;
pub mod config;
mod error;
mod executor;
pub mod hosts;
mod report;
pub mod workdir;

pub use config::{ExecutorConfig, UnresolvedPolicy};
pub use error::RunError;
pub use executor::{CancelHandle, Executor, RunPhase};
pub use hosts::{parse_host_spec, resolve_hosts, HostTarget, Resolution, ResolveError};
pub use report::{
    ActionRecord, ActionStatus, HostError, HostErrorKind, HostReport, HostStatus, RunReport,
    RunStatus, StopReason,
};
pub use workdir::{resolve_root, sanitize, HostDir, HostDirs, WorkdirError};
