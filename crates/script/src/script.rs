// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Compiled script: preambles by kind plus the ordered action list

use crate::command::{
    AsCommand, Command, CommandKind, EnvCommand, FromCommand, KubeconfigCommand, OutputCommand,
    Statement, TimeoutCommand, WorkdirCommand,
};
use crate::expand::has_placeholders;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that make a script unrunnable before any remote work starts
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("missing required preamble: {0}")]
    MissingPreamble(CommandKind),
    #[error("line {line}: {kind} may only be declared once")]
    Duplicate { kind: CommandKind, line: usize },
    #[error("line {line}: malformed {kind}: {reason}")]
    Malformed {
        kind: CommandKind,
        line: usize,
        reason: String,
    },
}

/// A typed view of a declared command
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decl<'a, T> {
    pub line: usize,
    pub command: &'a T,
}

/// A compiled, immutable script
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    preambles: BTreeMap<CommandKind, Vec<Statement>>,
    actions: Vec<Statement>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a command declared at `line`, routing it by kind
    pub fn push(&mut self, line: usize, command: Command) {
        let statement = Statement::new(line, command);
        let kind = statement.kind();
        if kind.is_action() {
            self.actions.push(statement);
        } else {
            self.preambles.entry(kind).or_default().push(statement);
        }
    }

    /// Builder-style [`Script::push`]
    pub fn with(mut self, line: usize, command: Command) -> Self {
        self.push(line, command);
        self
    }

    /// All preambles of one kind, in declaration order
    pub fn preambles(&self, kind: CommandKind) -> &[Statement] {
        self.preambles.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Actions in execution order
    pub fn actions(&self) -> &[Statement] {
        &self.actions
    }

    /// The FROM preamble; its absence makes the script invalid
    pub fn from(&self) -> Result<Decl<'_, FromCommand>, ValidationError> {
        self.first(CommandKind::From, |c| match c {
            Command::From(c) => Some(c),
            _ => None,
        })
        .ok_or(ValidationError::MissingPreamble(CommandKind::From))
    }

    pub fn workdir(&self) -> Option<Decl<'_, WorkdirCommand>> {
        self.first(CommandKind::Workdir, |c| match c {
            Command::Workdir(c) => Some(c),
            _ => None,
        })
    }

    pub fn output(&self) -> Option<Decl<'_, OutputCommand>> {
        self.first(CommandKind::Output, |c| match c {
            Command::Output(c) => Some(c),
            _ => None,
        })
    }

    pub fn as_user(&self) -> Option<Decl<'_, AsCommand>> {
        self.first(CommandKind::As, |c| match c {
            Command::As(c) => Some(c),
            _ => None,
        })
    }

    pub fn timeout(&self) -> Option<Decl<'_, TimeoutCommand>> {
        self.first(CommandKind::Timeout, |c| match c {
            Command::Timeout(c) => Some(c),
            _ => None,
        })
    }

    pub fn kubeconfig(&self) -> Option<Decl<'_, KubeconfigCommand>> {
        self.first(CommandKind::Kubeconfig, |c| match c {
            Command::Kubeconfig(c) => Some(c),
            _ => None,
        })
    }

    /// ENV bindings in declaration order
    pub fn envs(&self) -> impl Iterator<Item = Decl<'_, EnvCommand>> {
        self.preambles(CommandKind::Env)
            .iter()
            .filter_map(|s| match &s.command {
                Command::Env(c) => Some(Decl {
                    line: s.line,
                    command: c,
                }),
                _ => None,
            })
    }

    fn first<'a, T>(
        &'a self,
        kind: CommandKind,
        pick: impl Fn(&'a Command) -> Option<&'a T>,
    ) -> Option<Decl<'a, T>> {
        self.preambles(kind).iter().find_map(|s| {
            pick(&s.command).map(|command| Decl {
                line: s.line,
                command,
            })
        })
    }

    /// Check structural requirements without touching the network
    pub fn validate(&self) -> Result<(), ValidationError> {
        let from = self.from()?;
        if from.command.hosts.is_empty() {
            return Err(ValidationError::Malformed {
                kind: CommandKind::From,
                line: from.line,
                reason: "no hosts declared".to_string(),
            });
        }

        for (kind, statements) in &self.preambles {
            if kind.is_singular() && statements.len() > 1 {
                return Err(ValidationError::Duplicate {
                    kind: *kind,
                    line: statements[1].line,
                });
            }
        }

        for env in self.envs() {
            if !is_valid_name(&env.command.name) {
                return Err(ValidationError::Malformed {
                    kind: CommandKind::Env,
                    line: env.line,
                    reason: format!("invalid variable name: {:?}", env.command.name),
                });
            }
        }

        if let Some(timeout) = self.timeout() {
            let value = &timeout.command.value;
            if !has_placeholders(value) {
                if let Err(e) = humantime::parse_duration(value) {
                    return Err(ValidationError::Malformed {
                        kind: CommandKind::Timeout,
                        line: timeout.line,
                        reason: format!("{value}: {e}"),
                    });
                }
            }
        }

        for action in &self.actions {
            if action.command.label().trim().is_empty() {
                return Err(ValidationError::Malformed {
                    kind: action.kind(),
                    line: action.line,
                    reason: "empty argument".to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Variable names follow shell identifier rules
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

#[cfg(test)]
#[path = "script_tests.rs"]
mod tests;
