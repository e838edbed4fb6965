// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OpenSSH session adapter
//!
//! Each session owns one ControlMaster connection. Commands and transfers
//! are multiplexed over its control socket, so authentication happens once
//! per machine.

use super::{CommandOutput, Machine, RemoteSession, SessionAdapter, SessionError};
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::Instant;

/// Exit status ssh uses for its own (connection-level) failures
const SSH_FAILURE: i32 = 255;
/// Bound on `-O check` / `-O exit` control requests
const CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

static NEXT_SOCKET: AtomicU64 = AtomicU64::new(0);

/// OpenSSH client settings
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// ssh executable
    pub program: PathBuf,
    /// Directory holding ControlMaster sockets
    pub control_dir: PathBuf,
    /// How long an idle master survives if it is never closed
    pub control_persist: Duration,
    /// Value for `StrictHostKeyChecking`
    pub strict_host_key_checking: String,
    /// Keys tried after the agent, in order; missing files are skipped
    pub default_keys: Vec<PathBuf>,
}

impl Default for SshConfig {
    fn default() -> Self {
        let default_keys = dirs::home_dir()
            .map(|home| {
                ["id_ed25519", "id_ecdsa", "id_rsa"]
                    .iter()
                    .map(|name| home.join(".ssh").join(name))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            program: PathBuf::from("ssh"),
            control_dir: std::env::temp_dir().join("crashd-ssh"),
            control_persist: Duration::from_secs(300),
            strict_host_key_checking: "accept-new".to_string(),
            default_keys,
        }
    }
}

/// One way of proving identity to the remote host
#[derive(Debug, Clone, PartialEq, Eq)]
enum AuthMethod {
    Key(PathBuf),
    Agent(String),
}

impl AuthMethod {
    fn args(&self) -> Vec<String> {
        match self {
            AuthMethod::Key(path) => vec![
                "-i".to_string(),
                path.display().to_string(),
                "-o".to_string(),
                "IdentitiesOnly=yes".to_string(),
                "-o".to_string(),
                "IdentityAgent=none".to_string(),
            ],
            AuthMethod::Agent(socket) => vec!["-o".to_string(), format!("IdentityAgent={socket}")],
        }
    }

    fn describe(&self) -> String {
        match self {
            AuthMethod::Key(path) => format!("key {}", path.display()),
            AuthMethod::Agent(_) => "agent".to_string(),
        }
    }
}

/// SSH adapter backed by the OpenSSH client
#[derive(Clone, Default)]
pub struct SshAdapter {
    config: Arc<SshConfig>,
}

impl SshAdapter {
    pub fn new(config: SshConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &SshConfig {
        &self.config
    }
}

#[async_trait]
impl SessionAdapter for SshAdapter {
    type Session = SshSession;

    async fn open(&self, machine: &Machine, timeout: Duration) -> Result<SshSession, SessionError> {
        let host = machine.id();
        tokio::fs::create_dir_all(&self.config.control_dir)
            .await
            .map_err(|e| SessionError::Connect {
                host: host.clone(),
                message: format!(
                    "cannot create control directory {}: {e}",
                    self.config.control_dir.display()
                ),
            })?;

        let control_path = control_path(
            &self.config.control_dir,
            machine,
            NEXT_SOCKET.fetch_add(1, Ordering::Relaxed),
        );
        let _ = tokio::fs::remove_file(&control_path).await;

        let agent = std::env::var("SSH_AUTH_SOCK").ok();
        let methods = auth_methods(
            machine.credential.key.as_deref(),
            agent.as_deref(),
            &self.config.default_keys,
        );

        let deadline = Instant::now() + timeout;
        for method in methods {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SessionError::Timeout(timeout));
            }

            let mut cmd = Command::new(&self.config.program);
            cmd.args(base_args(&self.config, machine, &control_path, remaining))
                .args(method.args())
                .arg("-o")
                .arg("ControlMaster=yes")
                .arg("-o")
                .arg(format!(
                    "ControlPersist={}s",
                    self.config.control_persist.as_secs()
                ))
                .arg("-N")
                .arg("-f")
                .arg("--")
                .arg(&machine.host)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .kill_on_drop(true);

            let output = match tokio::time::timeout(remaining, cmd.output()).await {
                Err(_) => return Err(SessionError::Timeout(timeout)),
                Ok(Err(e)) => {
                    return Err(SessionError::Connect {
                        host,
                        message: format!("failed to launch ssh: {e}"),
                    })
                }
                Ok(Ok(output)) => output,
            };

            if output.status.success() {
                tracing::debug!(host = %host, method = %method.describe(), "control master established");
                return Ok(SshSession {
                    machine: machine.clone(),
                    program: self.config.program.clone(),
                    base_args: base_args(&self.config, machine, &control_path, CONTROL_TIMEOUT),
                    control_path,
                    dead: AtomicBool::new(false),
                    closed: AtomicBool::new(false),
                });
            }

            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_auth_rejection(&stderr) {
                tracing::debug!(host = %host, method = %method.describe(), "authentication rejected");
                continue;
            }
            return Err(SessionError::Connect {
                host,
                message: failure_message(&stderr, output.status.code()),
            });
        }

        Err(SessionError::Authentication { host })
    }
}

/// An open ControlMaster connection to one machine
pub struct SshSession {
    machine: Machine,
    program: PathBuf,
    base_args: Vec<String>,
    control_path: PathBuf,
    dead: AtomicBool,
    closed: AtomicBool,
}

impl SshSession {
    pub fn control_path(&self) -> &Path {
        &self.control_path
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::SessionClosed);
        }
        Ok(())
    }

    async fn master_alive(&self) -> bool {
        let mut cmd = self.command();
        cmd.arg("-O").arg("check").arg("--").arg(&self.machine.host);
        matches!(
            tokio::time::timeout(CONTROL_TIMEOUT, cmd.output()).await,
            Ok(Ok(output)) if output.status.success()
        )
    }

    /// Exit 255 is either ssh failing or the remote command exiting 255;
    /// the master's health tells them apart.
    async fn transport_lost(&self, status: Option<i32>, stderr: &[u8]) -> Option<SessionError> {
        if status != Some(SSH_FAILURE) || self.master_alive().await {
            return None;
        }
        self.dead.store(true, Ordering::SeqCst);
        tracing::warn!(host = %self.machine.id(), "control master gone, session marked dead");
        Some(SessionError::Connect {
            host: self.machine.id(),
            message: failure_message(&String::from_utf8_lossy(stderr), status),
        })
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    fn machine(&self) -> &Machine {
        &self.machine
    }

    async fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput, SessionError> {
        self.ensure_open()?;

        let mut cmd = self.command();
        cmd.arg("--").arg(&self.machine.host).arg(command);

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Err(_) => return Err(SessionError::Timeout(timeout)),
            Ok(Err(e)) => return Err(SessionError::Execution(e.to_string())),
            Ok(Ok(output)) => output,
        };

        let status = output.status.code();
        if let Some(err) = self.transport_lost(status, &output.stderr).await {
            return Err(err);
        }
        let exit_status = status
            .ok_or_else(|| SessionError::Execution("ssh terminated by signal".to_string()))?;

        Ok(CommandOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_status,
        })
    }

    async fn fetch(
        &self,
        path: &str,
        writer: &mut (dyn AsyncWrite + Unpin + Send),
        timeout: Duration,
    ) -> Result<u64, SessionError> {
        self.ensure_open()?;

        let transfer_error = |message: String| SessionError::Transfer {
            path: path.to_string(),
            message,
        };

        let mut cmd = self.command();
        cmd.arg("--")
            .arg(&self.machine.host)
            .arg(format!("cat -- {}", shell_words::quote(path)))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let transfer = async {
            let mut child = cmd.spawn().map_err(|e| transfer_error(e.to_string()))?;
            let mut stdout = child
                .stdout
                .take()
                .ok_or_else(|| transfer_error("stdout not captured".to_string()))?;
            let mut stderr = child
                .stderr
                .take()
                .ok_or_else(|| transfer_error("stderr not captured".to_string()))?;

            let mut stderr_buf = Vec::new();
            let (copied, _) = tokio::join!(
                tokio::io::copy(&mut stdout, &mut *writer),
                stderr.read_to_end(&mut stderr_buf)
            );
            let copied = copied.map_err(|e| transfer_error(e.to_string()))?;
            writer
                .flush()
                .await
                .map_err(|e| transfer_error(e.to_string()))?;
            let status = child
                .wait()
                .await
                .map_err(|e| transfer_error(e.to_string()))?;
            Ok::<_, SessionError>((copied, status.code(), stderr_buf))
        };

        let (copied, status, stderr) = tokio::time::timeout(timeout, transfer)
            .await
            .map_err(|_| SessionError::Timeout(timeout))??;

        if status == Some(0) {
            return Ok(copied);
        }
        if let Some(err) = self.transport_lost(status, &stderr).await {
            return Err(err);
        }
        Err(transfer_error(failure_message(
            &String::from_utf8_lossy(&stderr),
            status,
        )))
    }

    async fn close(&self) -> Result<(), SessionError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut cmd = self.command();
        cmd.arg("-O").arg("exit").arg("--").arg(&self.machine.host);
        match tokio::time::timeout(CONTROL_TIMEOUT, cmd.output()).await {
            Err(_) => return Err(SessionError::Timeout(CONTROL_TIMEOUT)),
            Ok(Err(e)) => return Err(SessionError::Execution(e.to_string())),
            // Master may already be gone, which is fine
            Ok(Ok(_)) => {}
        }
        let _ = tokio::fs::remove_file(&self.control_path).await;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.dead.load(Ordering::SeqCst)
    }
}

/// Options shared by the master and every multiplexed call
fn base_args(
    config: &SshConfig,
    machine: &Machine,
    control_path: &Path,
    connect_timeout: Duration,
) -> Vec<String> {
    vec![
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-o".to_string(),
        format!("StrictHostKeyChecking={}", config.strict_host_key_checking),
        "-o".to_string(),
        format!("ConnectTimeout={}", connect_timeout.as_secs().max(1)),
        "-o".to_string(),
        format!("ControlPath={}", control_path.display()),
        "-p".to_string(),
        machine.port.to_string(),
        "-l".to_string(),
        machine.credential.user.clone(),
    ]
}

/// Candidate credentials in the order they are tried
///
/// An explicit key wins, then the agent, then default keys that exist.
fn auth_methods(key: Option<&Path>, agent: Option<&str>, defaults: &[PathBuf]) -> Vec<AuthMethod> {
    let mut methods = Vec::new();
    if let Some(key) = key {
        methods.push(AuthMethod::Key(expand_home(key)));
    }
    if let Some(socket) = agent.filter(|s| !s.trim().is_empty()) {
        methods.push(AuthMethod::Agent(socket.to_string()));
    }
    methods.extend(
        defaults
            .iter()
            .filter(|path| path.is_file())
            .map(|path| AuthMethod::Key(path.clone())),
    );
    methods
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Socket path unique to one session; kept short for the sun_path limit
fn control_path(dir: &Path, machine: &Machine, seq: u64) -> PathBuf {
    let mut hasher = DefaultHasher::new();
    machine.credential.user.hash(&mut hasher);
    machine.host.hash(&mut hasher);
    machine.port.hash(&mut hasher);
    dir.join(format!(
        "cm-{:016x}-{}-{seq}",
        hasher.finish(),
        std::process::id()
    ))
}

fn is_auth_rejection(stderr: &str) -> bool {
    stderr.contains("Permission denied")
        || stderr.contains("Too many authentication failures")
        || stderr.contains("no such identity")
}

fn failure_message(stderr: &str, status: Option<i32>) -> String {
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    match status {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    }
}

#[cfg(test)]
#[path = "ssh_tests.rs"]
mod tests;
