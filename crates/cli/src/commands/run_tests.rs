// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use clap::Parser;

#[derive(Parser)]
struct Harness {
    #[command(flatten)]
    args: RunArgs,
}

fn parse(argv: &[&str]) -> RunArgs {
    Harness::try_parse_from(std::iter::once("run").chain(argv.iter().copied()))
        .unwrap()
        .args
}

#[test]
fn flags_override_file_values() {
    let file = FileConfig::parse("max_concurrency = 4\ncommand_timeout = \"1m\"\n").unwrap();
    let args = parse(&[
        "diag.crsh",
        "--max-concurrency",
        "2",
        "--run-timeout",
        "10m",
        "--on-unresolved",
        "skip-action",
        "--workdir",
        "/tmp/out",
    ]);

    let config = args.executor_config(&file);
    assert_eq!(config.max_concurrency, 2);
    assert_eq!(config.command_timeout, Duration::from_secs(60));
    assert_eq!(config.run_timeout, Some(Duration::from_secs(600)));
    assert_eq!(config.unresolved, UnresolvedPolicy::SkipAction);
    assert_eq!(config.default_workdir, PathBuf::from("/tmp/out"));
}

#[test]
fn defaults_without_flags() {
    let args = parse(&["diag.crsh"]);
    assert_eq!(args.script, PathBuf::from("diag.crsh"));
    assert!(matches!(args.format, OutputFormat::Text));

    let config = args.executor_config(&FileConfig::default());
    assert_eq!(config.unresolved, UnresolvedPolicy::AbortHost);
    assert_eq!(config.run_timeout, None);
}

#[yare::parameterized(
    bad_duration = { &["s", "--timeout", "soon"] },
    bad_policy = { &["s", "--on-unresolved", "ignore"] },
    bad_format = { &["s", "--format", "yaml"] },
    missing_script = { &[] },
)]
fn rejects_bad_flags(argv: &[&str]) {
    let argv = std::iter::once("run").chain(argv.iter().copied());
    assert!(Harness::try_parse_from(argv).is_err());
}
