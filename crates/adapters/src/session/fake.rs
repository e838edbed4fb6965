// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake session adapter for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{CommandOutput, Machine, RemoteSession, SessionAdapter, SessionError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Recorded session call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    Open { host: String, user: String },
    Run { host: String, command: String },
    Fetch { host: String, path: String },
    Close { host: String },
}

impl SessionCall {
    pub fn host(&self) -> &str {
        match self {
            SessionCall::Open { host, .. }
            | SessionCall::Run { host, .. }
            | SessionCall::Fetch { host, .. }
            | SessionCall::Close { host } => host,
        }
    }
}

#[derive(Debug, Clone)]
enum Response {
    Output(CommandOutput),
    Error(String),
}

#[derive(Default)]
struct FakeState {
    unreachable: HashSet<String>,
    rejected: HashSet<String>,
    responses: HashMap<(Option<String>, String), Response>,
    files: HashMap<(String, String), Vec<u8>>,
    delays: HashMap<String, Duration>,
    connection_drops: HashMap<String, String>,
    calls: Vec<SessionCall>,
    open: usize,
}

/// Fake session adapter for testing
///
/// Hosts are keyed by [`Machine::id`]. Unscripted commands succeed with empty
/// output, except `echo` which prints its arguments.
#[derive(Clone, Default)]
pub struct FakeSessionAdapter {
    state: Arc<Mutex<FakeState>>,
}

impl FakeSessionAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<SessionCall> {
        self.state().calls.clone()
    }

    /// Recorded calls for one host
    pub fn calls_for(&self, host: &str) -> Vec<SessionCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.host() == host)
            .collect()
    }

    /// Sessions opened but not yet closed
    pub fn open_sessions(&self) -> usize {
        self.state().open
    }

    /// Refuse connections to `host`
    pub fn set_unreachable(&self, host: &str) {
        self.state().unreachable.insert(host.to_string());
    }

    /// Reject every credential for `host`
    pub fn set_auth_failure(&self, host: &str) {
        self.state().rejected.insert(host.to_string());
    }

    /// Script the output of `command` on every host
    pub fn set_output(&self, command: &str, output: CommandOutput) {
        self.state()
            .responses
            .insert((None, command.to_string()), Response::Output(output));
    }

    /// Script the output of `command` on one host
    pub fn set_host_output(&self, host: &str, command: &str, output: CommandOutput) {
        self.state().responses.insert(
            (Some(host.to_string()), command.to_string()),
            Response::Output(output),
        );
    }

    /// Make `command` fail to execute on one host
    pub fn set_execution_error(&self, host: &str, command: &str, message: &str) {
        self.state().responses.insert(
            (Some(host.to_string()), command.to_string()),
            Response::Error(message.to_string()),
        );
    }

    /// Place a remote file on `host`
    pub fn add_file(&self, host: &str, path: &str, content: impl Into<Vec<u8>>) {
        self.state()
            .files
            .insert((host.to_string(), path.to_string()), content.into());
    }

    /// Delay every run and fetch on `host`
    pub fn set_delay(&self, host: &str, delay: Duration) {
        self.state().delays.insert(host.to_string(), delay);
    }

    /// Lose the connection to `host` when `command` (or fetch path) is issued
    pub fn drop_connection_on(&self, host: &str, command: &str) {
        self.state()
            .connection_drops
            .insert(host.to_string(), command.to_string());
    }
}

#[async_trait]
impl SessionAdapter for FakeSessionAdapter {
    type Session = FakeSession;

    async fn open(&self, machine: &Machine, _timeout: Duration) -> Result<FakeSession, SessionError> {
        let host = machine.id();
        let mut state = self.state();
        state.calls.push(SessionCall::Open {
            host: host.clone(),
            user: machine.credential.user.clone(),
        });

        if state.unreachable.contains(&host) {
            return Err(SessionError::Connect {
                host,
                message: "connection refused".to_string(),
            });
        }
        if state.rejected.contains(&host) {
            return Err(SessionError::Authentication { host });
        }

        state.open += 1;
        Ok(FakeSession {
            machine: machine.clone(),
            host,
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
            dead: AtomicBool::new(false),
        })
    }
}

/// Fake session state
pub struct FakeSession {
    machine: Machine,
    host: String,
    state: Arc<Mutex<FakeState>>,
    closed: AtomicBool,
    dead: AtomicBool,
}

impl FakeSession {
    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: SessionCall) {
        self.state().calls.push(call);
    }

    async fn wait(&self, timeout: Duration) -> Result<(), SessionError> {
        let delay = self.state().delays.get(&self.host).copied();
        if let Some(delay) = delay {
            if delay >= timeout {
                tokio::time::sleep(timeout).await;
                return Err(SessionError::Timeout(timeout));
            }
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    fn connection_dropped(&self, target: &str) -> Option<SessionError> {
        let dropped = self
            .state()
            .connection_drops
            .get(&self.host)
            .is_some_and(|t| t == target);
        if !dropped {
            return None;
        }
        self.dead.store(true, Ordering::SeqCst);
        Some(SessionError::Connect {
            host: self.host.clone(),
            message: "connection reset by peer".to_string(),
        })
    }
}

#[async_trait]
impl RemoteSession for FakeSession {
    fn machine(&self) -> &Machine {
        &self.machine
    }

    async fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput, SessionError> {
        self.record(SessionCall::Run {
            host: self.host.clone(),
            command: command.to_string(),
        });
        if self.is_closed() {
            return Err(SessionError::SessionClosed);
        }
        self.wait(timeout).await?;
        if let Some(err) = self.connection_dropped(command) {
            return Err(err);
        }

        let response = {
            let state = self.state();
            state
                .responses
                .get(&(Some(self.host.clone()), command.to_string()))
                .or_else(|| state.responses.get(&(None, command.to_string())))
                .cloned()
        };
        match response {
            Some(Response::Output(output)) => Ok(output),
            Some(Response::Error(message)) => Err(SessionError::Execution(message)),
            None => Ok(default_output(command)),
        }
    }

    async fn fetch(
        &self,
        path: &str,
        writer: &mut (dyn AsyncWrite + Unpin + Send),
        timeout: Duration,
    ) -> Result<u64, SessionError> {
        self.record(SessionCall::Fetch {
            host: self.host.clone(),
            path: path.to_string(),
        });
        if self.is_closed() {
            return Err(SessionError::SessionClosed);
        }
        self.wait(timeout).await?;
        if let Some(err) = self.connection_dropped(path) {
            return Err(err);
        }

        let content = self
            .state()
            .files
            .get(&(self.host.clone(), path.to_string()))
            .cloned()
            .ok_or_else(|| SessionError::Transfer {
                path: path.to_string(),
                message: "No such file or directory".to_string(),
            })?;

        let transfer_error = |e: std::io::Error| SessionError::Transfer {
            path: path.to_string(),
            message: e.to_string(),
        };
        writer.write_all(&content).await.map_err(transfer_error)?;
        writer.flush().await.map_err(transfer_error)?;
        Ok(content.len() as u64)
    }

    async fn close(&self) -> Result<(), SessionError> {
        let mut state = self.state();
        state.calls.push(SessionCall::Close {
            host: self.host.clone(),
        });
        if !self.closed.swap(true, Ordering::SeqCst) {
            state.open = state.open.saturating_sub(1);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.dead.load(Ordering::SeqCst)
    }
}

fn default_output(command: &str) -> CommandOutput {
    let words = shell_words::split(command).unwrap_or_default();
    match words.split_first() {
        Some((program, args)) if program == "echo" || program == "/bin/echo" => CommandOutput {
            stdout: format!("{}\n", args.join(" ")).into_bytes(),
            ..CommandOutput::default()
        },
        _ => CommandOutput::default(),
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
