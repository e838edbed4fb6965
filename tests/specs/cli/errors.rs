// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::prelude::*;

#[test]
fn missing_script_file() {
    Project::empty()
        .crashd()
        .args(&["check", "nope.crsh"])
        .exits(1)
        .stderr_has("failed to read script nope.crsh");
}

#[test]
fn unknown_subcommand_is_a_usage_error() {
    Project::empty().crashd().args(&["explode"]).exits(2);
}

#[test]
fn unknown_policy_is_a_usage_error() {
    let project = Project::empty();
    project.file("diag.crsh", "FROM h1\nRUN true\n");
    project
        .crashd()
        .args(&["run", "diag.crsh", "--on-unresolved", "ignore"])
        .exits(2)
        .stderr_has("unknown policy");
}

#[test]
fn invalid_config_file() {
    let project = Project::empty();
    project.file("diag.crsh", "FROM h1\nRUN true\n");
    project.file("crashd.toml", "max_concurrency = \"many\"\n");
    project
        .crashd()
        .args(&["run", "diag.crsh", "--config", "crashd.toml"])
        .exits(1)
        .stderr_has("invalid config crashd.toml");
}

#[test]
fn config_in_config_home_is_read() {
    let project = Project::empty();
    project.file("diag.crsh", "FROM h1\nRUN true\n");
    project.file(".config/crashd/config.toml", "colour = true\n");
    project
        .crashd()
        .args(&["run", "diag.crsh"])
        .exits(1)
        .stderr_has("invalid config");
}
