// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runs whose hosts never reach the network

use crate::prelude::*;

#[test]
fn rejected_hosts_fail_the_run() {
    let project = Project::empty();
    project.file("diag.crsh", "FROM bad:port [::1\nWORKDIR out\nCAPTURE uptime\n");

    project
        .crashd()
        .args(&["run", "diag.crsh"])
        .exits(1)
        .stdout_has("run failed")
        .stdout_has("bad:port")
        .stdout_has("invalid host spec");
    assert!(project.path().join("out").is_dir());
}

#[test]
fn json_report() {
    let project = Project::empty();
    project.file("diag.crsh", "FROM bad:0\nWORKDIR out\nCAPTURE uptime\n");

    let output = project
        .crashd()
        .args(&["run", "diag.crsh", "--format", "json"])
        .exits(1);
    let json = output.json();
    assert_eq!(json["status"], "failed");
    assert_eq!(json["hosts"][0]["host"], "bad:0");
    assert_eq!(json["hosts"][0]["error"]["kind"], "invalid-host-spec");
    assert_eq!(json["output"], "crashd-bundle.tar.gz");
}

#[test]
fn unresolved_preamble_aborts_before_hosts() {
    let project = Project::empty();
    project.file("diag.crsh", "FROM h1\nWORKDIR ${CRASHD_SPEC_UNSET}\nRUN true\n");

    project
        .crashd()
        .args(&["run", "diag.crsh"])
        .exits(1)
        .stderr_has("line 2: WORKDIR: unresolved variable: ${CRASHD_SPEC_UNSET}");
}

#[test]
fn default_workdir_flag_is_used() {
    let project = Project::empty();
    project.file("diag.crsh", "FROM bad:port\nCAPTURE uptime\n");

    let output = project
        .crashd()
        .args(&["run", "diag.crsh", "--workdir", "collected", "--format", "json"])
        .exits(1);
    assert!(project.path().join("collected").is_dir());
    assert!(output.json()["workdir"]
        .as_str()
        .unwrap()
        .ends_with("collected"));
}
