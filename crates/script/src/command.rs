// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a keyword does not name a known command
#[derive(Debug, Error, PartialEq)]
#[error("unknown command: {0}")]
pub struct UnknownCommand(pub String);

/// The kind of a script command
///
/// Preambles configure run-wide state and are processed once; actions run
/// once per resolved host in declaration order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandKind {
    From,
    Env,
    Workdir,
    Output,
    As,
    Timeout,
    Kubeconfig,
    Capture,
    Copy,
    Run,
}

impl CommandKind {
    pub const ALL: [CommandKind; 10] = [
        CommandKind::From,
        CommandKind::Env,
        CommandKind::Workdir,
        CommandKind::Output,
        CommandKind::As,
        CommandKind::Timeout,
        CommandKind::Kubeconfig,
        CommandKind::Capture,
        CommandKind::Copy,
        CommandKind::Run,
    ];

    /// Script keyword for this kind
    pub fn keyword(self) -> &'static str {
        match self {
            CommandKind::From => "FROM",
            CommandKind::Env => "ENV",
            CommandKind::Workdir => "WORKDIR",
            CommandKind::Output => "OUTPUT",
            CommandKind::As => "AS",
            CommandKind::Timeout => "TIMEOUT",
            CommandKind::Kubeconfig => "KUBECONFIG",
            CommandKind::Capture => "CAPTURE",
            CommandKind::Copy => "COPY",
            CommandKind::Run => "RUN",
        }
    }

    pub fn is_preamble(self) -> bool {
        !self.is_action()
    }

    pub fn is_action(self) -> bool {
        matches!(
            self,
            CommandKind::Capture | CommandKind::Copy | CommandKind::Run
        )
    }

    /// Preambles that may be declared at most once per script
    pub fn is_singular(self) -> bool {
        self.is_preamble() && self != CommandKind::Env
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for CommandKind {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommandKind::ALL
            .into_iter()
            .find(|kind| kind.keyword().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownCommand(s.to_string()))
    }
}

/// What to do with the rest of a host's actions when an action fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OnFail {
    /// Record the failure and keep going (best effort)
    #[default]
    Continue,
    /// The action is a precondition: stop this host's sequence
    AbortHost,
}

impl FromStr for OnFail {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "continue" => Ok(OnFail::Continue),
            "abort" | "abort-host" => Ok(OnFail::AbortHost),
            other => Err(format!("unknown failure policy: {other}")),
        }
    }
}

/// `FROM host[:port]... [key:<path>]`
#[derive(Debug, Clone, PartialEq)]
pub struct FromCommand {
    /// Host specifiers in declaration order
    pub hosts: Vec<String>,
    /// Shared private key reference for every host
    pub key: Option<String>,
}

/// `ENV name=value`
#[derive(Debug, Clone, PartialEq)]
pub struct EnvCommand {
    pub name: String,
    pub value: String,
}

/// `WORKDIR [path]`
#[derive(Debug, Clone, PartialEq)]
pub struct WorkdirCommand {
    pub path: Option<String>,
}

/// `OUTPUT [path]`
#[derive(Debug, Clone, PartialEq)]
pub struct OutputCommand {
    pub path: Option<String>,
}

/// `AS user` - remote login user
#[derive(Debug, Clone, PartialEq)]
pub struct AsCommand {
    pub user: String,
}

/// `TIMEOUT duration` - default bound for each remote call
#[derive(Debug, Clone, PartialEq)]
pub struct TimeoutCommand {
    pub value: String,
}

/// `KUBECONFIG path`
#[derive(Debug, Clone, PartialEq)]
pub struct KubeconfigCommand {
    pub path: String,
}

/// `CAPTURE command...` - run remotely and keep the output
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureCommand {
    pub command: String,
    pub on_fail: OnFail,
}

/// `COPY path` - retrieve a remote file
#[derive(Debug, Clone, PartialEq)]
pub struct CopyCommand {
    pub path: String,
    pub on_fail: OnFail,
}

/// `RUN command...` - run remotely for side effects only
#[derive(Debug, Clone, PartialEq)]
pub struct RunCommand {
    pub command: String,
    pub on_fail: OnFail,
}

/// A parsed script command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    From(FromCommand),
    Env(EnvCommand),
    Workdir(WorkdirCommand),
    Output(OutputCommand),
    As(AsCommand),
    Timeout(TimeoutCommand),
    Kubeconfig(KubeconfigCommand),
    Capture(CaptureCommand),
    Copy(CopyCommand),
    Run(RunCommand),
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::From(_) => CommandKind::From,
            Command::Env(_) => CommandKind::Env,
            Command::Workdir(_) => CommandKind::Workdir,
            Command::Output(_) => CommandKind::Output,
            Command::As(_) => CommandKind::As,
            Command::Timeout(_) => CommandKind::Timeout,
            Command::Kubeconfig(_) => CommandKind::Kubeconfig,
            Command::Capture(_) => CommandKind::Capture,
            Command::Copy(_) => CommandKind::Copy,
            Command::Run(_) => CommandKind::Run,
        }
    }

    /// Human-readable label, also the source of artifact filenames
    ///
    /// Actions are labelled by their unexpanded command string or path so
    /// the same script always yields the same filenames.
    pub fn label(&self) -> String {
        match self {
            Command::From(c) => c.hosts.join(" "),
            Command::Env(c) => format!("{}={}", c.name, c.value),
            Command::Workdir(c) => c.path.clone().unwrap_or_default(),
            Command::Output(c) => c.path.clone().unwrap_or_default(),
            Command::As(c) => c.user.clone(),
            Command::Timeout(c) => c.value.clone(),
            Command::Kubeconfig(c) => c.path.clone(),
            Command::Capture(c) => c.command.clone(),
            Command::Copy(c) => c.path.clone(),
            Command::Run(c) => c.command.clone(),
        }
    }

    /// Failure policy; preambles never continue past their own failure
    pub fn on_fail(&self) -> OnFail {
        match self {
            Command::Capture(c) => c.on_fail,
            Command::Copy(c) => c.on_fail,
            Command::Run(c) => c.on_fail,
            _ => OnFail::AbortHost,
        }
    }

    /// Key/value pairs describing the command for structured logs
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![("kind", self.kind().to_string())];
        match self {
            Command::From(c) => {
                fields.push(("hosts", c.hosts.join(",")));
                if let Some(key) = &c.key {
                    fields.push(("key", key.clone()));
                }
            }
            Command::Env(c) => fields.push(("name", c.name.clone())),
            Command::Workdir(_) | Command::Output(_) | Command::Kubeconfig(_) => {
                fields.push(("path", self.label()))
            }
            Command::As(c) => fields.push(("user", c.user.clone())),
            Command::Timeout(c) => fields.push(("value", c.value.clone())),
            Command::Capture(c) => fields.push(("command", c.command.clone())),
            Command::Copy(c) => fields.push(("path", c.path.clone())),
            Command::Run(c) => fields.push(("command", c.command.clone())),
        }
        if self.kind().is_action() {
            fields.push(("on_fail", format!("{:?}", self.on_fail())));
        }
        fields
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.label())
    }
}

/// A command together with the line it was declared on
///
/// The line orders commands across the preamble and action collections and
/// decides which ENV bindings a command can see.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub line: usize,
    pub command: Command,
}

impl Statement {
    pub fn new(line: usize, command: Command) -> Self {
        Self { line, command }
    }

    pub fn kind(&self) -> CommandKind {
        self.command.kind()
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
