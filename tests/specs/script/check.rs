// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::prelude::*;

const SCRIPT: &str = "\
# node diagnostics
FROM 10.0.0.1 10.0.0.2:2222
ENV logdir=/var/log
CAPTURE df -h
COPY ${logdir}/syslog
";

#[test]
fn check_prints_plan() {
    let project = Project::empty();
    project.file("diag.crsh", SCRIPT);

    project
        .crashd()
        .args(&["check", "diag.crsh"])
        .passes()
        .stdout_eq(
            "\
hosts: 10.0.0.1 10.0.0.2:2222
preambles:
     2  FROM 10.0.0.1 10.0.0.2:2222
     3  ENV logdir=/var/log
actions:
     4  CAPTURE df -h
     5  COPY ${logdir}/syslog
",
        );
}

#[test]
fn check_json() {
    let project = Project::empty();
    project.file("diag.crsh", SCRIPT);

    let output = project
        .crashd()
        .args(&["check", "diag.crsh", "--format", "json"])
        .passes();
    let json = output.json();
    assert_eq!(json["hosts"][1], "10.0.0.2:2222");
    assert_eq!(json["actions"][0]["kind"], "CAPTURE");
    assert_eq!(json["actions"][1]["line"], 5);
}

#[test]
fn check_rejects_missing_from() {
    let project = Project::empty();
    project.file("diag.crsh", "CAPTURE uptime\n");

    project
        .crashd()
        .args(&["check", "diag.crsh"])
        .exits(1)
        .stderr_has("missing required preamble: FROM");
}

#[test]
fn check_reports_parse_errors_with_line() {
    let project = Project::empty();
    project.file("diag.crsh", "FROM h1\nGRAB /etc/hosts\n");

    project
        .crashd()
        .args(&["check", "diag.crsh"])
        .exits(1)
        .stderr_has("line 2: unknown command: GRAB");
}

#[test]
fn check_rejects_duplicate_singular_preamble() {
    let project = Project::empty();
    project.file("diag.crsh", "FROM h1\nAS ops\nAS root\nRUN true\n");

    project
        .crashd()
        .args(&["check", "diag.crsh"])
        .fails()
        .stderr_has("AS may only be declared once");
}
