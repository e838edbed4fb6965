// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::prelude::*;

#[test]
fn help_lists_subcommands() {
    Project::empty()
        .crashd()
        .args(&["--help"])
        .passes()
        .stdout_has("run")
        .stdout_has("check")
        .stdout_has("completions");
}

#[test]
fn run_help_lists_flags() {
    Project::empty()
        .crashd()
        .args(&["run", "--help"])
        .passes()
        .stdout_has("--max-concurrency")
        .stdout_has("--on-unresolved")
        .stdout_has("--run-timeout")
        .stdout_has("--format");
}

#[test]
fn version_is_printed() {
    Project::empty()
        .crashd()
        .args(&["--version"])
        .passes()
        .stdout_has("crashd");
}

#[test]
fn completions_are_generated() {
    Project::empty()
        .crashd()
        .args(&["completions", "bash"])
        .passes()
        .stdout_has("crashd");
}
