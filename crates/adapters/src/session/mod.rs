// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote session adapters

mod ssh;

pub use ssh::{SshAdapter, SshConfig, SshSession};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeSession, FakeSessionAdapter, SessionCall};

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWrite;

/// Port used when a host spec does not name one
pub const DEFAULT_PORT: u16 = 22;

/// Errors from session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to connect to {host}: {message}")]
    Connect { host: String, message: String },
    #[error("authentication failed for {host}")]
    Authentication { host: String },
    #[error("remote execution failed: {0}")]
    Execution(String),
    #[error("failed to transfer {path}: {message}")]
    Transfer { path: String, message: String },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("session closed")]
    SessionClosed,
}

impl SessionError {
    /// Whether the session can no longer be used after this error
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            SessionError::Connect { .. } | SessionError::SessionClosed
        )
    }
}

/// Identity used to authenticate to a machine
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Credential {
    pub user: String,
    /// Explicit private key; when absent the agent and default keys are tried
    pub key: Option<PathBuf>,
}

impl Credential {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            key: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<PathBuf>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// A resolved remote target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Machine {
    pub host: String,
    pub port: u16,
    pub credential: Credential,
}

impl Machine {
    pub fn new(host: impl Into<String>, port: u16, credential: Credential) -> Self {
        Self {
            host: host.into(),
            port,
            credential,
        }
    }

    /// Stable identifier: the host, plus `:port` when not the default
    pub fn id(&self) -> String {
        if self.port == DEFAULT_PORT {
            self.host.clone()
        } else if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.credential.user, self.id())
    }
}

/// Result of a remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_status: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

/// Adapter that opens authenticated sessions to machines
#[async_trait]
pub trait SessionAdapter: Clone + Send + Sync + 'static {
    type Session: RemoteSession;

    /// Connect and authenticate, giving up after `timeout`
    async fn open(&self, machine: &Machine, timeout: Duration)
        -> Result<Self::Session, SessionError>;
}

/// An open connection to one machine
///
/// A session is owned by a single host task; calls are sequential.
#[async_trait]
pub trait RemoteSession: Send + Sync + 'static {
    fn machine(&self) -> &Machine;

    /// Run `command` through the remote shell
    ///
    /// A non-zero exit status is not an error; it is reported in the output.
    async fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput, SessionError>;

    /// Stream the remote file at `path` into `writer`, returning bytes written
    async fn fetch(
        &self,
        path: &str,
        writer: &mut (dyn AsyncWrite + Unpin + Send),
        timeout: Duration,
    ) -> Result<u64, SessionError>;

    /// Release the connection; calling it again is a no-op
    async fn close(&self) -> Result<(), SessionError>;

    fn is_closed(&self) -> bool;
}
