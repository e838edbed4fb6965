// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line-oriented script reader
//!
//! One command per line: `KEYWORD arguments...`. Blank lines and lines
//! starting with `#` are ignored. Keywords are case-insensitive.

use crate::command::{
    AsCommand, CaptureCommand, Command, CommandKind, CopyCommand, EnvCommand, FromCommand,
    KubeconfigCommand, OnFail, OutputCommand, RunCommand, TimeoutCommand, WorkdirCommand,
};
use crate::Script;
use thiserror::Error;

const KEY_PREFIX: &str = "key:";
const ON_FAIL_PREFIX: &str = "on-fail:";

/// Errors that can occur while reading a script
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("line {line}: unknown command: {keyword}")]
    UnknownCommand { line: usize, keyword: String },
    #[error("line {line}: {kind} requires an argument")]
    MissingArgument { line: usize, kind: CommandKind },
    #[error("line {line}: invalid {kind} argument: {message}")]
    InvalidArgument {
        line: usize,
        kind: CommandKind,
        message: String,
    },
}

/// Parse script source into a [`Script`]
///
/// Line numbers are 1-based and become each command's declaration line.
pub fn parse_script(content: &str) -> Result<Script, ParseError> {
    let mut script = Script::new();

    for (index, raw) in content.lines().enumerate() {
        let line = index + 1;
        let text = raw.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }

        let (keyword, rest) = match text.split_once(char::is_whitespace) {
            Some((keyword, rest)) => (keyword, rest.trim()),
            None => (text, ""),
        };
        let kind: CommandKind = keyword.parse().map_err(|_| ParseError::UnknownCommand {
            line,
            keyword: keyword.to_string(),
        })?;

        for command in parse_command(line, kind, rest)? {
            script.push(line, command);
        }
    }

    Ok(script)
}

fn parse_command(line: usize, kind: CommandKind, rest: &str) -> Result<Vec<Command>, ParseError> {
    let invalid = |message: String| ParseError::InvalidArgument {
        line,
        kind,
        message,
    };
    let missing = || ParseError::MissingArgument { line, kind };

    let commands = match kind {
        CommandKind::From => {
            let mut hosts = Vec::new();
            let mut key = None;
            for word in split_words(rest).map_err(invalid)? {
                match word.strip_prefix(KEY_PREFIX) {
                    Some(path) if path.is_empty() => {
                        return Err(invalid("key: needs a path".to_string()))
                    }
                    Some(path) => key = Some(path.to_string()),
                    None => hosts.push(word),
                }
            }
            if hosts.is_empty() {
                return Err(missing());
            }
            vec![Command::From(FromCommand { hosts, key })]
        }

        CommandKind::Env => {
            let words = split_words(rest).map_err(invalid)?;
            if words.is_empty() {
                return Err(missing());
            }
            words
                .into_iter()
                .map(|word| match word.split_once('=') {
                    Some((name, value)) if !name.is_empty() => {
                        Ok(Command::Env(EnvCommand {
                            name: name.to_string(),
                            value: value.to_string(),
                        }))
                    }
                    _ => Err(invalid(format!("expected name=value, got {word:?}"))),
                })
                .collect::<Result<Vec<_>, _>>()?
        }

        CommandKind::Workdir => vec![Command::Workdir(WorkdirCommand {
            path: optional_single(rest).map_err(invalid)?,
        })],

        CommandKind::Output => vec![Command::Output(OutputCommand {
            path: optional_single(rest).map_err(invalid)?,
        })],

        CommandKind::As => vec![Command::As(AsCommand {
            user: optional_single(rest).map_err(invalid)?.ok_or_else(missing)?,
        })],

        CommandKind::Timeout => vec![Command::Timeout(TimeoutCommand {
            value: optional_single(rest).map_err(invalid)?.ok_or_else(missing)?,
        })],

        CommandKind::Kubeconfig => vec![Command::Kubeconfig(KubeconfigCommand {
            path: optional_single(rest).map_err(invalid)?.ok_or_else(missing)?,
        })],

        CommandKind::Capture | CommandKind::Run => {
            let (on_fail, command) = split_on_fail(rest).map_err(invalid)?;
            if command.is_empty() {
                return Err(missing());
            }
            let command = command.to_string();
            if kind == CommandKind::Capture {
                vec![Command::Capture(CaptureCommand { command, on_fail })]
            } else {
                vec![Command::Run(RunCommand { command, on_fail })]
            }
        }

        CommandKind::Copy => {
            let (on_fail, paths) = split_on_fail(rest).map_err(invalid)?;
            let paths = split_words(paths).map_err(invalid)?;
            if paths.is_empty() {
                return Err(missing());
            }
            paths
                .into_iter()
                .map(|path| Command::Copy(CopyCommand { path, on_fail }))
                .collect()
        }
    };

    Ok(commands)
}

fn split_words(rest: &str) -> Result<Vec<String>, String> {
    shell_words::split(rest).map_err(|e| e.to_string())
}

fn optional_single(rest: &str) -> Result<Option<String>, String> {
    let mut words = split_words(rest)?;
    match words.len() {
        0 => Ok(None),
        1 => Ok(words.pop()),
        n => Err(format!("expected a single value, got {n}")),
    }
}

/// Strip a leading `on-fail:<policy>` token, returning the remainder verbatim
fn split_on_fail(rest: &str) -> Result<(OnFail, &str), String> {
    let Some(after) = rest.strip_prefix(ON_FAIL_PREFIX) else {
        return Ok((OnFail::default(), rest));
    };
    let (policy, remainder) = match after.split_once(char::is_whitespace) {
        Some((policy, remainder)) => (policy, remainder.trim_start()),
        None => (after, ""),
    };
    Ok((policy.parse()?, remainder))
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
