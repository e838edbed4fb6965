// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Variable expansion

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use thiserror::Error;

// Regex pattern for ${name} and ${name:-default} - this is a constant valid pattern
// Allow expect here as the regex is compile-time verified to be valid
#[allow(clippy::expect_used)]
static VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .expect("constant regex pattern is valid")
});

/// Errors that can occur during expansion
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExpandError {
    #[error("unresolved variable: ${{{0}}}")]
    UnresolvedVariable(String),
}

/// A source of variable values
pub trait Lookup {
    fn lookup(&self, name: &str) -> Option<&str>;
}

impl Lookup for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

/// Whether `template` contains any `${name}` reference
pub fn has_placeholders(template: &str) -> bool {
    VAR_PATTERN.is_match(template)
}

/// Replace every `${name}` / `${name:-default}` in `template`
///
/// Expansion is a single pass: substituted values are copied verbatim and
/// never re-scanned, so a value containing `${...}` stays literal. A reference
/// with no binding and no default fails with [`ExpandError::UnresolvedVariable`].
/// Text that only looks like a reference (`${}`, `${1x}`, an unclosed `${`)
/// is left as-is.
pub fn expand(template: &str, vars: &impl Lookup) -> Result<String, ExpandError> {
    if !template.contains("${") {
        return Ok(template.to_string());
    }

    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in VAR_PATTERN.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);

        match (vars.lookup(name.as_str()), caps.get(2)) {
            (Some(value), _) => out.push_str(value),
            (None, Some(default)) => out.push_str(default.as_str()),
            (None, None) => {
                return Err(ExpandError::UnresolvedVariable(name.as_str().to_string()))
            }
        }
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

#[cfg(test)]
#[path = "expand_tests.rs"]
mod tests;
