// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run orchestration
//!
//! A run validates the script, processes preambles once on a single task,
//! then fans out one task per machine. Each host runs its actions strictly in
//! order over its own session; hosts never share mutable state.

use crate::actions::{self, ActionContext, ActionError};
use crate::config::{ExecutorConfig, UnresolvedPolicy};
use crate::error::RunError;
use crate::hosts::{HostTarget, Resolution, ResolveError};
use crate::report::{
    run_status, ActionRecord, ActionStatus, HostError, HostErrorKind, HostReport, RunReport,
    StopReason,
};
use crate::workdir::{resolve_root, HostDir, HostDirs};
use crashd_adapters::{Credential, Machine, RemoteSession, SessionAdapter, SessionError};
use crashd_script::{
    expand, Bindings, Command, CommandKind, OnFail, Script, Statement, ValidationError,
    WORKDIR_VAR,
};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::Instrument;

/// Stages of a run, logged as they start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Validating,
    Preparing,
    ResolvingHosts,
    Running,
    Finalizing,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunPhase::Validating => "validating",
            RunPhase::Preparing => "preparing",
            RunPhase::ResolvingHosts => "resolving-hosts",
            RunPhase::Running => "running",
            RunPhase::Finalizing => "finalizing",
        })
    }
}

/// Requests cooperative cancellation of an executor's runs
///
/// Cancellation is sticky: once cancelled, later runs on the same executor
/// stop before connecting to any host. Run-level stops (an `abort-run`
/// policy, the run timeout) end only the run that raised them.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<Option<StopReason>>>,
}

impl CancelHandle {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Stop pending and in-flight host work
    pub fn cancel(&self) {
        self.stop(StopReason::Cancelled);
    }

    pub fn is_cancelled(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// First reason wins
    fn stop(&self, reason: StopReason) {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }

    fn reason(&self) -> Option<StopReason> {
        *self.tx.borrow()
    }

    fn signal(&self) -> StopSignal {
        StopSignal {
            rx: self.tx.subscribe(),
        }
    }
}

struct StopSignal {
    rx: watch::Receiver<Option<StopReason>>,
}

impl StopSignal {
    /// Resolves once a stop is requested
    async fn stopped(&mut self) -> StopReason {
        // Copy out of the watch guard; it must not be held across an await
        let reason = self.rx.wait_for(Option::is_some).await.map(|r| *r);
        match reason {
            Ok(reason) => reason.unwrap_or(StopReason::Cancelled),
            Err(_) => std::future::pending().await,
        }
    }
}

/// Preamble results shared by every host
struct Prepared {
    bindings: Bindings,
    workdir: PathBuf,
    output: PathBuf,
    kubeconfig: Option<PathBuf>,
    user: String,
    command_timeout: Duration,
}

/// Read-only state handed to each host task
struct HostJob {
    bindings: Bindings,
    actions: Vec<Statement>,
    workdir: PathBuf,
    connect_timeout: Duration,
    command_timeout: Duration,
    unresolved: UnresolvedPolicy,
    cancel: CancelHandle,
}

/// Drives scripts against machines through a session adapter
pub struct Executor<A> {
    adapter: A,
    config: ExecutorConfig,
    process_env: Vec<(String, String)>,
    cancel: CancelHandle,
}

impl<A: SessionAdapter> Executor<A> {
    /// Create an executor that sees the current process environment
    pub fn new(adapter: A, config: ExecutorConfig) -> Self {
        Self {
            adapter,
            config,
            process_env: std::env::vars().collect(),
            cancel: CancelHandle::new(),
        }
    }

    /// Replace the process environment visible to variable expansion
    pub fn with_env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.process_env = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Execute `script` on every FROM host
    ///
    /// Returns `Err` only when nothing ran: an invalid script, a preamble
    /// that cannot be expanded, or a workdir root that cannot be created.
    /// Host and action failures are reported in the [`RunReport`].
    pub async fn run(&self, script: &Script) -> Result<RunReport, RunError> {
        let start = Instant::now();
        async {
            let result = self.run_inner(script, start).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            match &result {
                Ok(report) => tracing::info!(
                    status = %report.status,
                    hosts = report.hosts.len(),
                    failed = report.failed_hosts(),
                    elapsed_ms,
                    "run finished"
                ),
                Err(e) => tracing::error!(elapsed_ms, error = %e, "run failed before host work"),
            }
            result
        }
        .instrument(tracing::info_span!("run"))
        .await
    }

    async fn run_inner(&self, script: &Script, start: Instant) -> Result<RunReport, RunError> {
        enter_phase(RunPhase::Validating);
        script.validate()?;

        enter_phase(RunPhase::Preparing);
        let prepared = self.prepare(script).await?;

        enter_phase(RunPhase::ResolvingHosts);
        let resolution = self.resolve(script, &prepared)?;

        enter_phase(RunPhase::Running);
        let (stop, forward) = self.run_stop();
        let Prepared {
            bindings,
            workdir,
            output,
            kubeconfig,
            command_timeout,
            ..
        } = prepared;
        let job = Arc::new(HostJob {
            bindings,
            actions: script.actions().to_vec(),
            workdir: workdir.clone(),
            connect_timeout: self.config.connect_timeout,
            command_timeout,
            unresolved: self.config.unresolved,
            cancel: stop.clone(),
        });
        let hosts = self.run_hosts(resolution, job, &stop).await;
        forward.abort();

        enter_phase(RunPhase::Finalizing);
        Ok(RunReport {
            status: run_status(&hosts, stop.reason()),
            workdir,
            output,
            kubeconfig,
            hosts,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Stop channel for one run, fed by the executor's cancel handle
    fn run_stop(&self) -> (CancelHandle, JoinHandle<()>) {
        let stop = CancelHandle::new();
        if self.cancel.is_cancelled() {
            stop.cancel();
        }
        let mut outer = self.cancel.signal();
        let forward = stop.clone();
        let task = tokio::spawn(async move {
            outer.stopped().await;
            forward.cancel();
        });
        (stop, task)
    }

    /// Process preambles in declaration order
    async fn prepare(&self, script: &Script) -> Result<Prepared, RunError> {
        let mut bindings = Bindings::with_process(self.process_env.iter().cloned());

        // Without WORKDIR the default root exists before any expansion
        let mut workdir = None;
        if script.workdir().is_none() {
            let root = resolve_root(None, &self.config.default_workdir).await?;
            bindings.set_builtin(WORKDIR_VAR, root.display().to_string());
            workdir = Some(root);
        }

        let mut output = None;
        let mut kubeconfig = None;
        let mut user = None;
        let mut command_timeout = None;

        let mut statements: Vec<&Statement> = CommandKind::ALL
            .into_iter()
            .filter(|kind| kind.is_preamble() && *kind != CommandKind::From)
            .flat_map(|kind| script.preambles(kind))
            .collect();
        statements.sort_by_key(|s| s.line);

        for statement in statements {
            match &statement.command {
                Command::Env(c) => {
                    let value = expand_preamble(&c.value, &bindings, statement)?;
                    bindings.declare(statement.line, c.name.clone(), value);
                }
                Command::Workdir(c) => {
                    let path = expand_optional(c.path.as_deref(), &bindings, statement)?;
                    let root = resolve_root(path.as_deref(), &self.config.default_workdir).await?;
                    bindings.set_builtin(WORKDIR_VAR, root.display().to_string());
                    workdir = Some(root);
                }
                Command::Output(c) => {
                    output = expand_optional(c.path.as_deref(), &bindings, statement)?
                        .filter(|path| !path.is_empty())
                        .map(PathBuf::from);
                }
                Command::As(c) => user = Some(expand_preamble(&c.user, &bindings, statement)?),
                Command::Timeout(c) => {
                    let value = expand_preamble(&c.value, &bindings, statement)?;
                    command_timeout = Some(parse_timeout(&value, statement.line)?);
                }
                Command::Kubeconfig(c) => {
                    let path = expand_preamble(&c.path, &bindings, statement)?;
                    kubeconfig = Some(PathBuf::from(path));
                }
                Command::From(_) | Command::Capture(_) | Command::Copy(_) | Command::Run(_) => {}
            }
        }

        let workdir = match workdir {
            Some(root) => root,
            None => resolve_root(None, &self.config.default_workdir).await?,
        };
        let user = user
            .filter(|u| !u.is_empty())
            .or_else(|| self.process_var("USER"))
            .unwrap_or_else(|| "root".to_string());

        tracing::info!(
            workdir = %workdir.display(),
            user = %user,
            env = script.envs().count(),
            "preambles processed"
        );

        Ok(Prepared {
            bindings,
            workdir,
            output: output.unwrap_or_else(|| self.config.default_output.clone()),
            kubeconfig,
            user,
            command_timeout: command_timeout.unwrap_or(self.config.command_timeout),
        })
    }

    /// Expand and resolve FROM entries; bad entries are kept as rejections
    fn resolve(&self, script: &Script, prepared: &Prepared) -> Result<Resolution, RunError> {
        let from = script.from()?;
        let statement = Statement::new(from.line, Command::From(from.command.clone()));

        let mut credential = Credential::new(prepared.user.clone());
        if let Some(key) = &from.command.key {
            let key = expand_preamble(key, &prepared.bindings, &statement)?;
            credential = credential.with_key(key);
        }

        let scope = prepared.bindings.scope_at(from.line);
        let mut resolution = Resolution::new();
        for spec in &from.command.hosts {
            match expand(spec, &scope) {
                Ok(expanded) => resolution.push(&expanded, &credential),
                Err(source) => resolution.reject(ResolveError::Unresolved {
                    spec: spec.clone(),
                    source,
                }),
            }
        }

        tracing::info!(
            hosts = resolution.machines().count(),
            rejected = resolution.rejected().count(),
            "hosts resolved"
        );
        Ok(resolution)
    }

    async fn run_hosts(
        &self,
        resolution: Resolution,
        job: Arc<HostJob>,
        stop: &CancelHandle,
    ) -> Vec<HostReport> {
        let targets = resolution.into_targets();
        let machines = targets
            .iter()
            .filter(|t| matches!(t, HostTarget::Machine(_)))
            .count();
        let concurrency = self.config.concurrency_for(machines);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        tracing::debug!(machines, concurrency, "dispatching hosts");

        let timer = self.config.run_timeout.map(|limit| {
            let cancel = stop.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                tracing::warn!(limit_ms = limit.as_millis() as u64, "run timeout reached");
                cancel.cancel();
            })
        });

        let mut names = Vec::with_capacity(targets.len());
        let mut reports: Vec<Option<HostReport>> = Vec::with_capacity(targets.len());
        let mut dirs = HostDirs::new(&job.workdir);
        let mut tasks = JoinSet::new();

        for (index, target) in targets.into_iter().enumerate() {
            match target {
                HostTarget::Rejected(e) => {
                    names.push(e.spec().to_string());
                    reports.push(Some(HostReport::failed(
                        e.spec(),
                        HostError::new(HostErrorKind::InvalidHostSpec, e.to_string()),
                    )));
                }
                HostTarget::Machine(machine) => {
                    let id = machine.id();
                    let worker = HostWorker {
                        adapter: self.adapter.clone(),
                        host_dir: dirs.assign(&id),
                        machine,
                        job: Arc::clone(&job),
                        semaphore: Arc::clone(&semaphore),
                        stop: stop.signal(),
                    };
                    names.push(id);
                    reports.push(None);
                    tasks.spawn(async move { (index, worker.run().await) });
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, report)) => {
                    if let Some(slot) = reports.get_mut(index) {
                        *slot = Some(report);
                    }
                }
                Err(e) => tracing::error!(error = %e, "host task failed"),
            }
        }

        if let Some(timer) = timer {
            timer.abort();
        }

        // A task that panicked left its slot empty
        reports
            .into_iter()
            .zip(names)
            .map(|(report, host)| {
                report.unwrap_or_else(|| {
                    HostReport::failed(
                        host,
                        HostError::new(HostErrorKind::Internal, "host task panicked"),
                    )
                })
            })
            .collect()
    }

    fn process_var(&self, name: &str) -> Option<String> {
        self.process_env
            .iter()
            .find(|(k, v)| k == name && !v.is_empty())
            .map(|(_, v)| v.clone())
    }
}

/// One machine's task
struct HostWorker<A> {
    adapter: A,
    machine: Machine,
    host_dir: HostDir,
    job: Arc<HostJob>,
    semaphore: Arc<Semaphore>,
    stop: StopSignal,
}

impl<A: SessionAdapter> HostWorker<A> {
    async fn run(self) -> HostReport {
        let host = self.machine.id();
        let span = tracing::info_span!("host", host = %host);
        self.run_inner(host).instrument(span).await
    }

    async fn run_inner(mut self, host: String) -> HostReport {
        let mut report = HostReport::new(host.clone(), Some(self.machine.to_string()));

        let permit = tokio::select! {
            biased;
            reason = self.stop.stopped() => {
                report.cancel(stop_message(reason));
                return report;
            }
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit,
        };
        let _permit = permit.ok();

        let opened = tokio::select! {
            biased;
            reason = self.stop.stopped() => {
                report.cancel(stop_message(reason));
                return report;
            }
            opened = self.adapter.open(&self.machine, self.job.connect_timeout) => opened,
        };
        let session = match opened {
            Ok(session) => session,
            Err(e) => {
                report.fail(HostError::new(connect_error_kind(&e), e.to_string()));
                return report;
            }
        };

        let interrupted = tokio::select! {
            biased;
            reason = self.stop.stopped() => Some(reason),
            () = run_actions(&session, &self.job, &self.host_dir, &host, &mut report) => None,
        };
        if let Some(reason) = interrupted {
            tracing::warn!(?reason, "host interrupted");
            report.cancel(stop_message(reason));
        }

        // Always release the session, whatever happened above
        if let Err(e) = session.close().await {
            tracing::warn!(error = %e, "failed to close session");
        }

        tracing::info!(
            status = %report.status,
            actions = report.actions.len(),
            artifacts = report.artifacts.len(),
            "host finished"
        );
        report
    }
}

/// Run every action in declaration order, recording each outcome
async fn run_actions<S: RemoteSession>(
    session: &S,
    job: &HostJob,
    host_dir: &HostDir,
    host: &str,
    report: &mut HostReport,
) {
    let mut halted: Option<HostError> = None;

    for statement in &job.actions {
        let command = &statement.command;
        if let Some(cause) = &halted {
            report.record(ActionRecord {
                error: Some(format!("not run: {}", cause.message)),
                ..action_record(statement, ActionStatus::Skipped)
            });
            continue;
        }

        let ctx = ActionContext {
            session,
            host_dir,
            scope: job.bindings.scope_at(statement.line).for_host(host),
            timeout: job.command_timeout,
        };

        tracing::info!(line = statement.line, fields = ?command.fields(), "executing");
        let start = Instant::now();
        let result = actions::execute(command, &ctx).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(outcome) => {
                tracing::info!(elapsed_ms, "completed");
                report.record(ActionRecord {
                    artifact: outcome.artifact,
                    ..action_record(statement, ActionStatus::Succeeded)
                });
            }
            Err(e) => {
                tracing::warn!(elapsed_ms, error = %e, "action failed");
                let skipped = matches!(e, ActionError::Unresolved(_))
                    && job.unresolved == UnresolvedPolicy::SkipAction;
                let status = if skipped {
                    ActionStatus::Skipped
                } else {
                    ActionStatus::Failed
                };
                report.record(ActionRecord {
                    error: Some(e.to_string()),
                    exit_status: e.exit_status(),
                    artifact: e.artifact().cloned(),
                    ..action_record(statement, status)
                });
                halted = halt_cause(&e, statement, job);
            }
        }
    }

    if let Some(cause) = halted {
        report.fail(cause);
    } else if report.all_actions_failed() {
        report.fail(HostError::new(
            HostErrorKind::AllActionsFailed,
            "every action failed",
        ));
    }
}

/// Whether a failed action stops the rest of the host's sequence
fn halt_cause(e: &ActionError, statement: &Statement, job: &HostJob) -> Option<HostError> {
    let at = || format!("line {}: {}: {e}", statement.line, statement.kind());
    match e {
        ActionError::Unresolved(_) => match job.unresolved {
            UnresolvedPolicy::SkipAction => None,
            UnresolvedPolicy::AbortHost => Some(HostError::new(HostErrorKind::Aborted, at())),
            UnresolvedPolicy::AbortRun => {
                job.cancel.stop(StopReason::Aborted);
                Some(HostError::new(
                    HostErrorKind::Aborted,
                    format!("{}; run aborted", at()),
                ))
            }
        },
        ActionError::Workdir(_) => Some(HostError::new(HostErrorKind::Workdir, e.to_string())),
        _ if e.is_connection_lost() => {
            Some(HostError::new(HostErrorKind::Connection, e.to_string()))
        }
        _ if statement.command.on_fail() == OnFail::AbortHost => {
            Some(HostError::new(HostErrorKind::Aborted, at()))
        }
        _ => None,
    }
}

fn action_record(statement: &Statement, status: ActionStatus) -> ActionRecord {
    ActionRecord {
        line: statement.line,
        kind: statement.kind(),
        label: statement.command.label(),
        status,
        error: None,
        exit_status: None,
        artifact: None,
    }
}

fn expand_preamble(
    template: &str,
    bindings: &Bindings,
    statement: &Statement,
) -> Result<String, RunError> {
    expand(template, &bindings.scope_at(statement.line)).map_err(|source| RunError::Preamble {
        kind: statement.kind(),
        line: statement.line,
        source,
    })
}

fn expand_optional(
    template: Option<&str>,
    bindings: &Bindings,
    statement: &Statement,
) -> Result<Option<String>, RunError> {
    template
        .map(|t| expand_preamble(t, bindings, statement))
        .transpose()
}

fn parse_timeout(value: &str, line: usize) -> Result<Duration, RunError> {
    let malformed = |reason: String| {
        RunError::Validation(ValidationError::Malformed {
            kind: CommandKind::Timeout,
            line,
            reason,
        })
    };
    let timeout =
        humantime::parse_duration(value).map_err(|e| malformed(format!("{value}: {e}")))?;
    if timeout.is_zero() {
        return Err(malformed("timeout must be positive".to_string()));
    }
    Ok(timeout)
}

fn connect_error_kind(e: &SessionError) -> HostErrorKind {
    match e {
        SessionError::Authentication { .. } => HostErrorKind::Authentication,
        _ => HostErrorKind::Connection,
    }
}

fn stop_message(reason: StopReason) -> &'static str {
    match reason {
        StopReason::Cancelled => "run cancelled",
        StopReason::Aborted => "run aborted",
    }
}

fn enter_phase(phase: RunPhase) {
    tracing::info!(%phase, "phase");
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
