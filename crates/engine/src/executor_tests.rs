// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::report::{HostStatus, RunStatus};
use crashd_adapters::{CommandOutput, FakeSessionAdapter, SessionCall};
use crashd_script::parse_script;
use std::path::Path;
use tempfile::{tempdir, TempDir};

struct Harness {
    fake: FakeSessionAdapter,
    tmp: TempDir,
}

impl Harness {
    fn new() -> Self {
        Self {
            fake: FakeSessionAdapter::new(),
            tmp: tempdir().unwrap(),
        }
    }

    fn root(&self) -> &Path {
        self.tmp.path()
    }

    fn config(&self) -> ExecutorConfig {
        ExecutorConfig {
            default_workdir: self.root().join("default"),
            command_timeout: Duration::from_secs(5),
            ..ExecutorConfig::default()
        }
    }

    fn executor(&self, config: ExecutorConfig) -> Executor<FakeSessionAdapter> {
        Executor::new(self.fake.clone(), config).with_env([("USER", "ops")])
    }

    /// Script with WORKDIR pointing into the temp dir
    fn script(&self, body: &str) -> Script {
        let text = body.replace("{root}", &self.root().display().to_string());
        parse_script(&text).unwrap()
    }

    async fn run(&self, body: &str) -> RunReport {
        self.executor(self.config())
            .run(&self.script(body))
            .await
            .unwrap()
    }
}

fn failing(exit_status: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
        exit_status,
    }
}

fn statuses(host: &HostReport) -> Vec<ActionStatus> {
    host.actions.iter().map(|a| a.status).collect()
}

#[tokio::test]
async fn capture_writes_artifact_under_host_dir() {
    let h = Harness::new();
    let report = h
        .run("FROM h1\nWORKDIR {root}\nCAPTURE echo HELLO")
        .await;

    assert_eq!(report.status, RunStatus::Completed);
    let host = report.host("h1").unwrap();
    assert_eq!(host.status, HostStatus::Succeeded);
    assert_eq!(host.address.as_deref(), Some("ops@h1"));

    let artifact = h.root().join("h1").join("echo_HELLO.txt");
    assert_eq!(host.artifacts, vec![artifact.clone()]);
    assert_eq!(std::fs::read_to_string(artifact).unwrap(), "HELLO\n");
}

#[tokio::test]
async fn env_expands_in_workdir_and_actions() {
    let h = Harness::new();
    let report = h
        .run("ENV DIR=diag\nFROM h1\nWORKDIR {root}/${DIR}\nCAPTURE echo ${DIR} on ${CRASHD_HOST}")
        .await;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.workdir, h.root().join("diag"));

    let host = report.host("h1").unwrap();
    let artifact = &host.artifacts[0];
    assert_eq!(artifact.parent().unwrap(), h.root().join("diag").join("h1"));
    assert_eq!(std::fs::read_to_string(artifact).unwrap(), "diag on h1\n");
    assert!(h.fake.calls_for("h1").contains(&SessionCall::Run {
        host: "h1".to_string(),
        command: "echo diag on h1".to_string(),
    }));
}

#[tokio::test]
async fn env_declared_later_is_not_visible() {
    let h = Harness::new();
    let report = h
        .run("FROM h1\nWORKDIR {root}\nCAPTURE echo ${LATE}\nENV LATE=x")
        .await;

    let host = report.host("h1").unwrap();
    assert_eq!(statuses(host), vec![ActionStatus::Failed]);
    assert_eq!(host.status, HostStatus::Failed);
    assert_eq!(host.error.as_ref().unwrap().kind, HostErrorKind::Aborted);
    // Nothing was sent to the host
    assert!(!h
        .fake
        .calls()
        .iter()
        .any(|c| matches!(c, SessionCall::Run { .. })));
}

#[tokio::test]
async fn unreachable_host_fails_alone() {
    let h = Harness::new();
    h.fake.set_unreachable("h2");

    let report = h
        .run("FROM h1 h2\nWORKDIR {root}\nCAPTURE echo HELLO")
        .await;

    assert_eq!(report.status, RunStatus::PartiallyFailed);
    assert_eq!(report.failed_hosts(), 1);

    let h1 = report.host("h1").unwrap();
    assert_eq!(h1.status, HostStatus::Succeeded);
    assert!(h1.artifacts[0].exists());

    let h2 = report.host("h2").unwrap();
    assert_eq!(h2.status, HostStatus::Failed);
    assert_eq!(h2.error.as_ref().unwrap().kind, HostErrorKind::Connection);
    assert!(h2.actions.is_empty());
    assert!(!h.root().join("h2").exists());
}

#[tokio::test]
async fn authentication_failure_is_reported() {
    let h = Harness::new();
    h.fake.set_auth_failure("h1");

    let report = h.run("FROM h1\nWORKDIR {root}\nCAPTURE uptime").await;

    assert_eq!(report.status, RunStatus::Failed);
    let host = report.host("h1").unwrap();
    assert_eq!(host.error.as_ref().unwrap().kind, HostErrorKind::Authentication);
}

#[tokio::test]
async fn invalid_host_specs_are_rejected_in_place() {
    let h = Harness::new();
    let report = h
        .run("FROM h1 bad:port ${NOPE} h2\nWORKDIR {root}\nCAPTURE uptime")
        .await;

    let hosts: Vec<_> = report.hosts.iter().map(|r| r.host.as_str()).collect();
    assert_eq!(hosts, vec!["h1", "bad:port", "${NOPE}", "h2"]);
    assert_eq!(report.status, RunStatus::PartiallyFailed);

    for rejected in ["bad:port", "${NOPE}"] {
        let host = report.host(rejected).unwrap();
        assert_eq!(host.status, HostStatus::Failed);
        assert_eq!(host.error.as_ref().unwrap().kind, HostErrorKind::InvalidHostSpec);
    }
    let opened: Vec<_> = h
        .fake
        .calls()
        .into_iter()
        .filter(|c| matches!(c, SessionCall::Open { .. }))
        .collect();
    assert_eq!(opened.len(), 2);
}

#[tokio::test]
async fn duplicate_hosts_run_once() {
    let h = Harness::new();
    let report = h
        .run("FROM h1 h1:22 h1\nWORKDIR {root}\nCAPTURE uptime")
        .await;

    assert_eq!(report.hosts.len(), 1);
    assert_eq!(h.fake.calls_for("h1").len(), 3); // open, run, close
}

#[tokio::test]
async fn nonzero_exit_keeps_going_and_keeps_output() {
    let h = Harness::new();
    h.fake.set_output("dmesg", failing(1, "permission denied\n"));

    let report = h
        .run("FROM h1\nWORKDIR {root}\nCAPTURE dmesg\nCAPTURE uptime")
        .await;

    assert_eq!(report.status, RunStatus::Completed);
    let host = report.host("h1").unwrap();
    assert_eq!(host.status, HostStatus::Succeeded);
    assert_eq!(
        statuses(host),
        vec![ActionStatus::Failed, ActionStatus::Succeeded]
    );

    let failed = &host.actions[0];
    assert_eq!(failed.exit_status, Some(1));
    let artifact = failed.artifact.as_ref().unwrap();
    assert_eq!(
        std::fs::read_to_string(artifact).unwrap(),
        "permission denied\n"
    );
    assert_eq!(host.artifacts.len(), 2);
}

#[tokio::test]
async fn abort_policy_skips_remaining_actions() {
    let h = Harness::new();
    h.fake.set_output("test -d /var/log", failing(1, ""));

    let report = h
        .run("FROM h1\nWORKDIR {root}\nRUN on-fail:abort test -d /var/log\nCAPTURE uptime\nCOPY /var/log/syslog")
        .await;

    let host = report.host("h1").unwrap();
    assert_eq!(host.status, HostStatus::Failed);
    assert_eq!(host.error.as_ref().unwrap().kind, HostErrorKind::Aborted);
    assert_eq!(
        statuses(host),
        vec![
            ActionStatus::Failed,
            ActionStatus::Skipped,
            ActionStatus::Skipped
        ]
    );
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(h.fake.open_sessions(), 0);
}

#[tokio::test]
async fn every_action_failing_fails_the_host() {
    let h = Harness::new();
    h.fake.set_output("dmesg", failing(1, ""));
    h.fake.set_output("journalctl", failing(1, ""));

    let report = h
        .run("FROM h1\nWORKDIR {root}\nCAPTURE dmesg\nCAPTURE journalctl")
        .await;

    let host = report.host("h1").unwrap();
    assert_eq!(host.status, HostStatus::Failed);
    assert_eq!(
        host.error.as_ref().unwrap().kind,
        HostErrorKind::AllActionsFailed
    );
}

#[tokio::test]
async fn lost_connection_fails_host_and_skips_rest() {
    let h = Harness::new();
    h.fake.drop_connection_on("h1", "uname -a");

    let report = h
        .run("FROM h1 h2\nWORKDIR {root}\nCAPTURE uptime\nCAPTURE uname -a\nCAPTURE df")
        .await;

    let h1 = report.host("h1").unwrap();
    assert_eq!(h1.status, HostStatus::Failed);
    assert_eq!(h1.error.as_ref().unwrap().kind, HostErrorKind::Connection);
    assert_eq!(
        statuses(h1),
        vec![
            ActionStatus::Succeeded,
            ActionStatus::Failed,
            ActionStatus::Skipped
        ]
    );
    assert_eq!(report.host("h2").unwrap().status, HostStatus::Succeeded);
    assert_eq!(report.status, RunStatus::PartiallyFailed);
    assert_eq!(h.fake.open_sessions(), 0);
}

#[tokio::test]
async fn copy_fetches_into_host_dir() {
    let h = Harness::new();
    h.fake.add_file("h1", "/var/log/syslog", "boot ok\n");

    let report = h
        .run("FROM h1\nWORKDIR {root}\nCOPY /var/log/syslog")
        .await;

    let artifact = h.root().join("h1").join("syslog");
    assert_eq!(report.host("h1").unwrap().artifacts, vec![artifact.clone()]);
    assert_eq!(std::fs::read_to_string(artifact).unwrap(), "boot ok\n");
}

#[tokio::test]
async fn reruns_produce_the_same_files() {
    let h = Harness::new();
    let body = "ENV n=1\nFROM h1 h2\nWORKDIR {root}\nCAPTURE echo ${n}\nCAPTURE df -h\nRUN true";

    let first = h.run(body).await;
    let second = h.run(body).await;

    let paths = |r: &RunReport| r.artifacts().cloned().collect::<Vec<_>>();
    assert_eq!(paths(&first), paths(&second));
    assert_eq!(paths(&first).len(), 4);
}

#[tokio::test]
async fn default_workdir_is_created_and_bound() {
    let h = Harness::new();
    let report = h.run("FROM h1\nCAPTURE echo ${CRASHD_WORKDIR}").await;

    let default = h.root().join("default");
    assert_eq!(report.workdir, default);
    assert!(default.is_dir());

    let artifact = &report.host("h1").unwrap().artifacts[0];
    assert!(artifact.starts_with(default.join("h1")));
    assert_eq!(
        std::fs::read_to_string(artifact).unwrap(),
        format!("{}\n", default.display())
    );
}

#[tokio::test]
async fn preambles_shape_the_report() {
    let h = Harness::new();
    let report = h
        .run("FROM h1\nWORKDIR {root}\nOUTPUT {root}/out.tar.gz\nKUBECONFIG {root}/kube.conf\nRUN true")
        .await;

    assert_eq!(report.output, h.root().join("out.tar.gz"));
    assert_eq!(report.kubeconfig, Some(h.root().join("kube.conf")));

    let defaults = h.run("FROM h1\nWORKDIR {root}\nRUN true").await;
    assert_eq!(defaults.output, PathBuf::from(crate::config::DEFAULT_OUTPUT));
    assert_eq!(defaults.kubeconfig, None);
}

#[tokio::test]
async fn user_comes_from_as_then_environment() {
    let h = Harness::new();
    h.run("FROM h1\nWORKDIR {root}\nAS admin\nRUN true").await;
    h.run("FROM h2\nWORKDIR {root}\nRUN true").await;

    let users: Vec<_> = h
        .fake
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            SessionCall::Open { user, .. } => Some(user),
            _ => None,
        })
        .collect();
    assert_eq!(users, vec!["admin", "ops"]);
}

#[tokio::test]
async fn script_timeout_applies_to_actions() {
    let h = Harness::new();
    h.fake.set_delay("h1", Duration::from_millis(200));

    let report = h
        .run("FROM h1\nWORKDIR {root}\nTIMEOUT 20ms\nCAPTURE uptime")
        .await;

    let action = &report.host("h1").unwrap().actions[0];
    assert_eq!(action.status, ActionStatus::Failed);
    assert!(action.error.as_ref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn templated_timeout_must_parse() {
    let h = Harness::new();
    let script = h.script("ENV t=soon\nFROM h1\nWORKDIR {root}\nTIMEOUT ${t}\nRUN true");

    let err = h.executor(h.config()).run(&script).await.unwrap_err();
    assert!(matches!(
        err,
        RunError::Validation(ValidationError::Malformed {
            kind: CommandKind::Timeout,
            line: 4,
            ..
        })
    ));
    assert!(h.fake.calls().is_empty());
}

#[tokio::test]
async fn unresolved_preamble_stops_the_run() {
    let h = Harness::new();
    let script = h.script("FROM h1\nWORKDIR {root}\nOUTPUT ${NOPE}/b.tgz\nRUN true");

    let err = h.executor(h.config()).run(&script).await.unwrap_err();
    assert!(matches!(
        err,
        RunError::Preamble {
            kind: CommandKind::Output,
            line: 3,
            ..
        }
    ));
    assert!(h.fake.calls().is_empty());
}

#[tokio::test]
async fn invalid_script_is_rejected_before_connecting() {
    let h = Harness::new();
    let script = h.script("WORKDIR {root}\nCAPTURE uptime");

    let err = h.executor(h.config()).run(&script).await.unwrap_err();
    assert!(matches!(err, RunError::Validation(ValidationError::MissingPreamble(CommandKind::From))));
    assert!(h.fake.calls().is_empty());
}

#[tokio::test]
async fn skip_policy_skips_only_the_action() {
    let h = Harness::new();
    let config = ExecutorConfig {
        unresolved: UnresolvedPolicy::SkipAction,
        ..h.config()
    };
    let script = h.script("FROM h1\nWORKDIR {root}\nCAPTURE echo ${NOPE}\nCAPTURE uptime");

    let report = h.executor(config).run(&script).await.unwrap();

    let host = report.host("h1").unwrap();
    assert_eq!(host.status, HostStatus::Succeeded);
    assert_eq!(
        statuses(host),
        vec![ActionStatus::Skipped, ActionStatus::Succeeded]
    );
}

#[tokio::test]
async fn abort_run_policy_stops_other_hosts() {
    let h = Harness::new();
    h.fake.set_delay("h2", Duration::from_secs(5));
    let config = ExecutorConfig {
        unresolved: UnresolvedPolicy::AbortRun,
        ..h.config()
    };
    let script = h.script("FROM h1 h2\nWORKDIR {root}\nRUN true\nCAPTURE echo ${NOPE}");

    let report = h.executor(config).run(&script).await.unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    let h1 = report.host("h1").unwrap();
    assert_eq!(h1.status, HostStatus::Failed);
    assert_eq!(h1.error.as_ref().unwrap().kind, HostErrorKind::Aborted);
    assert_eq!(report.host("h2").unwrap().status, HostStatus::Cancelled);
    assert_eq!(h.fake.open_sessions(), 0);
}

#[tokio::test]
async fn cancel_stops_hosts_and_closes_sessions() {
    let h = Harness::new();
    h.fake.set_delay("h1", Duration::from_secs(5));
    h.fake.set_delay("h2", Duration::from_secs(5));

    let executor = h.executor(h.config());
    let cancel = executor.cancel_handle();
    let script = h.script("FROM h1 h2\nWORKDIR {root}\nCAPTURE uptime\nCAPTURE df");

    let (report, ()) = tokio::join!(executor.run(&script), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });
    let report = report.unwrap();

    assert_eq!(report.status, RunStatus::Cancelled);
    for host in &report.hosts {
        assert_eq!(host.status, HostStatus::Cancelled);
        assert_eq!(host.error.as_ref().unwrap().kind, HostErrorKind::Cancelled);
    }
    assert_eq!(h.fake.open_sessions(), 0);
    assert!(cancel.is_cancelled());
}

#[tokio::test]
async fn cancelled_executor_never_connects() {
    let h = Harness::new();
    let executor = h.executor(h.config());
    executor.cancel_handle().cancel();

    let report = executor
        .run(&h.script("FROM h1\nWORKDIR {root}\nRUN true"))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Cancelled);
    assert!(h.fake.calls().is_empty());
}

#[tokio::test]
async fn run_timeout_cancels_the_run() {
    let h = Harness::new();
    h.fake.set_delay("h1", Duration::from_secs(5));
    let config = ExecutorConfig {
        run_timeout: Some(Duration::from_millis(50)),
        ..h.config()
    };

    let report = h
        .executor(config)
        .run(&h.script("FROM h1\nWORKDIR {root}\nCAPTURE uptime"))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Cancelled);
    assert_eq!(h.fake.open_sessions(), 0);
}

#[tokio::test]
async fn abort_run_does_not_outlive_its_run() {
    let h = Harness::new();
    let executor = h.executor(ExecutorConfig {
        unresolved: UnresolvedPolicy::AbortRun,
        ..h.config()
    });

    let first = executor
        .run(&h.script("FROM h1\nWORKDIR {root}\nCAPTURE echo ${NOPE}"))
        .await
        .unwrap();
    assert_eq!(first.status, RunStatus::Failed);

    let second = executor
        .run(&h.script("FROM h1\nWORKDIR {root}\nCAPTURE echo HELLO"))
        .await
        .unwrap();
    assert_eq!(second.status, RunStatus::Completed);
    assert_eq!(second.host("h1").unwrap().status, HostStatus::Succeeded);
    assert!(!executor.cancel_handle().is_cancelled());
}

#[tokio::test]
async fn run_timeout_does_not_outlive_its_run() {
    let h = Harness::new();
    h.fake.set_delay("slow", Duration::from_secs(5));
    let executor = h.executor(ExecutorConfig {
        run_timeout: Some(Duration::from_millis(50)),
        ..h.config()
    });

    let first = executor
        .run(&h.script("FROM slow\nWORKDIR {root}\nCAPTURE uptime"))
        .await
        .unwrap();
    assert_eq!(first.status, RunStatus::Cancelled);

    let second = executor
        .run(&h.script("FROM h1\nWORKDIR {root}\nCAPTURE uptime"))
        .await
        .unwrap();
    assert_eq!(second.status, RunStatus::Completed);
}

#[tokio::test]
async fn colliding_host_ids_get_separate_dirs() {
    let h = Harness::new();
    let report = h
        .run("FROM h:2222 h_2222\nWORKDIR {root}\nCAPTURE echo ${CRASHD_HOST}")
        .await;

    assert_eq!(report.status, RunStatus::Completed);
    let first = &report.host("h:2222").unwrap().artifacts[0];
    let second = &report.host("h_2222").unwrap().artifacts[0];

    assert_eq!(first.parent().unwrap(), h.root().join("h_2222"));
    let suffixed = format!("h_2222-{:08x}", crc32fast::hash(b"h_2222"));
    assert_eq!(second.parent().unwrap(), h.root().join(suffixed));
    assert_eq!(std::fs::read_to_string(first).unwrap(), "h:2222\n");
    assert_eq!(std::fs::read_to_string(second).unwrap(), "h_2222\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hosts_run_on_a_multi_thread_runtime() {
    let h = Harness::new();
    let report = h
        .run("FROM h1 h2 h3\nWORKDIR {root}\nCAPTURE echo HELLO")
        .await;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.artifacts().count(), 3);
}

#[test]
fn run_future_is_send() {
    fn assert_send<T: Send>(_: &T) {}

    let h = Harness::new();
    let executor = h.executor(h.config());
    let script = h.script("FROM h1\nRUN true");
    assert_send(&executor.run(&script));
}

#[tokio::test]
async fn concurrency_limit_bounds_open_sessions() {
    let h = Harness::new();
    for host in ["h1", "h2", "h3"] {
        h.fake.set_delay(host, Duration::from_millis(10));
    }
    let config = ExecutorConfig {
        max_concurrency: 1,
        ..h.config()
    };

    let report = h
        .executor(config)
        .run(&h.script("FROM h1 h2 h3\nWORKDIR {root}\nCAPTURE uptime"))
        .await
        .unwrap();
    assert_eq!(report.status, RunStatus::Completed);

    let mut open = 0usize;
    for call in h.fake.calls() {
        match call {
            SessionCall::Open { .. } => {
                open += 1;
                assert!(open <= 1, "more than one session open at once");
            }
            SessionCall::Close { .. } => open -= 1,
            _ => {}
        }
    }
}

#[yare::parameterized(
    validating = { RunPhase::Validating, "validating" },
    resolving = { RunPhase::ResolvingHosts, "resolving-hosts" },
    finalizing = { RunPhase::Finalizing, "finalizing" },
)]
fn phase_display(phase: RunPhase, expected: &str) {
    assert_eq!(phase.to_string(), expected);
}
