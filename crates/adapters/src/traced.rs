// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrappers for consistent observability

use crate::session::{CommandOutput, Machine, RemoteSession, SessionAdapter, SessionError};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::io::AsyncWrite;
use tracing::Instrument;

/// Wrapper that adds tracing to any SessionAdapter
#[derive(Clone)]
pub struct TracedSessionAdapter<S> {
    inner: S,
}

impl<S> TracedSessionAdapter<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: SessionAdapter> SessionAdapter for TracedSessionAdapter<S> {
    type Session = TracedSession<S::Session>;

    async fn open(
        &self,
        machine: &Machine,
        timeout: Duration,
    ) -> Result<Self::Session, SessionError> {
        let span = tracing::info_span!("session.open", host = %machine.id());
        async {
            tracing::info!(
                user = %machine.credential.user,
                key = ?machine.credential.key,
                timeout_ms = timeout.as_millis() as u64,
                "connecting"
            );

            let start = Instant::now();
            let result = self.inner.open(machine, timeout).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(inner) => {
                    tracing::info!(elapsed_ms, "session opened");
                    Ok(TracedSession { inner })
                }
                Err(e) => {
                    tracing::error!(elapsed_ms, error = %e, "open failed");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Wrapper that adds tracing to any RemoteSession
pub struct TracedSession<T> {
    inner: T,
}

impl<T> TracedSession<T> {
    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T: RemoteSession> RemoteSession for TracedSession<T> {
    fn machine(&self) -> &Machine {
        self.inner.machine()
    }

    async fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput, SessionError> {
        let span = tracing::info_span!("session.run", host = %self.machine().id());
        async {
            // Precondition: an empty command would open a login shell
            if command.trim().is_empty() {
                tracing::error!("empty command");
                return Err(SessionError::Execution("empty command".to_string()));
            }

            tracing::debug!(command, "running");
            let start = Instant::now();
            let result = self.inner.run(command, timeout).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            match &result {
                Ok(output) => tracing::info!(
                    command,
                    exit_status = output.exit_status,
                    stdout_len = output.stdout.len(),
                    stderr_len = output.stderr.len(),
                    elapsed_ms,
                    "command finished"
                ),
                Err(e) => tracing::error!(command, elapsed_ms, error = %e, "run failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn fetch(
        &self,
        path: &str,
        writer: &mut (dyn AsyncWrite + Unpin + Send),
        timeout: Duration,
    ) -> Result<u64, SessionError> {
        let span = tracing::info_span!("session.fetch", host = %self.machine().id(), path);
        async {
            if path.trim().is_empty() {
                tracing::error!("empty path");
                return Err(SessionError::Transfer {
                    path: path.to_string(),
                    message: "empty path".to_string(),
                });
            }

            let start = Instant::now();
            let result = self.inner.fetch(path, writer, timeout).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            match &result {
                Ok(bytes) => tracing::info!(bytes, elapsed_ms, "fetched"),
                Err(e) => tracing::error!(elapsed_ms, error = %e, "fetch failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn close(&self) -> Result<(), SessionError> {
        let span = tracing::info_span!("session.close", host = %self.machine().id());
        async {
            let result = self.inner.close().await;
            // close() failing is often acceptable (master already gone)
            match &result {
                Ok(()) => tracing::info!("closed"),
                Err(e) => tracing::warn!(error = %e, "close failed (may be expected)"),
            }
            result
        }
        .instrument(span)
        .await
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
