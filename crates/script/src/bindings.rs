// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Layered binding environment

use crate::expand::Lookup;
use std::collections::HashMap;

/// Resolved root of the local working directory
pub const WORKDIR_VAR: &str = "CRASHD_WORKDIR";
/// Identifier of the host an action is running against
pub const HOST_VAR: &str = "CRASHD_HOST";

#[derive(Debug, Clone)]
struct Binding {
    line: usize,
    name: String,
    value: String,
}

/// Variable bindings, from highest to lowest precedence:
///
/// 1. script ENV declarations (later declarations shadow earlier ones)
/// 2. builtins set by the engine ([`WORKDIR_VAR`], [`HOST_VAR`])
/// 3. the process environment snapshot
///
/// Built during the single-threaded preamble phase and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    declared: Vec<Binding>,
    builtins: HashMap<String, String>,
    process: HashMap<String, String>,
}

impl Bindings {
    /// Empty environment (no process variables)
    pub fn new() -> Self {
        Self::default()
    }

    /// Environment layered over a snapshot of the current process env
    pub fn from_process_env() -> Self {
        Self::with_process(std::env::vars())
    }

    pub fn with_process(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            process: vars.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Record an ENV binding declared at `line`
    ///
    /// `value` must already be expanded against [`Bindings::scope_at`] for the
    /// same line.
    pub fn declare(&mut self, line: usize, name: impl Into<String>, value: impl Into<String>) {
        self.declared.push(Binding {
            line,
            name: name.into(),
            value: value.into(),
        });
    }

    pub fn set_builtin(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.builtins.insert(name.into(), value.into());
    }

    /// Bindings visible to a command declared at `line`
    ///
    /// Only ENV declarations strictly before `line` are visible.
    pub fn scope_at(&self, line: usize) -> Scope<'_> {
        Scope {
            bindings: self,
            before: line,
            host: None,
        }
    }

    /// Every declared binding, as seen after the whole script
    pub fn scope(&self) -> Scope<'_> {
        self.scope_at(usize::MAX)
    }
}

/// A read-only view of [`Bindings`] at one point in the script
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    bindings: &'a Bindings,
    before: usize,
    host: Option<&'a str>,
}

impl<'a> Scope<'a> {
    /// Same view with [`HOST_VAR`] bound to `host`
    pub fn for_host(self, host: &'a str) -> Self {
        Self {
            host: Some(host),
            ..self
        }
    }
}

impl Lookup for Scope<'_> {
    fn lookup(&self, name: &str) -> Option<&str> {
        let declared = self
            .bindings
            .declared
            .iter()
            .rev()
            .find(|b| b.line < self.before && b.name == name)
            .map(|b| b.value.as_str());
        if declared.is_some() {
            return declared;
        }

        if name == HOST_VAR {
            if let Some(host) = self.host {
                return Some(host);
            }
        }

        self.bindings
            .builtins
            .get(name)
            .or_else(|| self.bindings.process.get(name))
            .map(String::as_str)
    }
}

#[cfg(test)]
#[path = "bindings_tests.rs"]
mod tests;
