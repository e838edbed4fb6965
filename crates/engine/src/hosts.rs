// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host resolution
//!
//! Turns FROM host specs into machines. Purely syntactic: no DNS lookups,
//! unreachable hosts surface when their session is opened.

use crashd_adapters::{Credential, Machine, DEFAULT_PORT};
use crashd_script::ExpandError;
use std::collections::HashSet;
use std::net::Ipv6Addr;
use thiserror::Error;

/// A FROM entry that cannot become a machine
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResolveError {
    #[error("invalid host spec {spec:?}: {reason}")]
    InvalidHostSpec { spec: String, reason: String },
    #[error("host spec {spec:?}: {source}")]
    Unresolved { spec: String, source: ExpandError },
}

impl ResolveError {
    /// The FROM entry as written
    pub fn spec(&self) -> &str {
        match self {
            ResolveError::InvalidHostSpec { spec, .. } | ResolveError::Unresolved { spec, .. } => {
                spec
            }
        }
    }
}

/// One FROM entry after resolution
#[derive(Debug, Clone, PartialEq)]
pub enum HostTarget {
    Machine(Machine),
    Rejected(ResolveError),
}

/// Ordered, deduplicated FROM entries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    targets: Vec<HostTarget>,
    seen: HashSet<(String, u16)>,
}

impl Resolution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `spec`; a machine already seen on the same port is dropped
    pub fn push(&mut self, spec: &str, credential: &Credential) {
        match parse_host_spec(spec) {
            Ok((host, port)) => {
                if !self.seen.insert((host.clone(), port)) {
                    tracing::debug!(spec, "duplicate host dropped");
                    return;
                }
                self.targets.push(HostTarget::Machine(Machine::new(
                    host,
                    port,
                    credential.clone(),
                )));
            }
            Err(e) => self.reject(e),
        }
    }

    pub fn reject(&mut self, error: ResolveError) {
        tracing::warn!(error = %error, "host rejected");
        self.targets.push(HostTarget::Rejected(error));
    }

    /// Every entry in FROM order
    pub fn targets(&self) -> &[HostTarget] {
        &self.targets
    }

    pub fn into_targets(self) -> Vec<HostTarget> {
        self.targets
    }

    pub fn machines(&self) -> impl Iterator<Item = &Machine> {
        self.targets.iter().filter_map(|t| match t {
            HostTarget::Machine(m) => Some(m),
            HostTarget::Rejected(_) => None,
        })
    }

    pub fn rejected(&self) -> impl Iterator<Item = &ResolveError> {
        self.targets.iter().filter_map(|t| match t {
            HostTarget::Rejected(e) => Some(e),
            HostTarget::Machine(_) => None,
        })
    }
}

/// Resolve already-expanded host specs
pub fn resolve_hosts<I, S>(specs: I, credential: &Credential) -> Resolution
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut resolution = Resolution::new();
    for spec in specs {
        resolution.push(spec.as_ref(), credential);
    }
    resolution
}

/// Split `host`, `host:port`, `[v6]:port` or a bare IPv6 address
pub fn parse_host_spec(spec: &str) -> Result<(String, u16), ResolveError> {
    let invalid = |reason: &str| ResolveError::InvalidHostSpec {
        spec: spec.to_string(),
        reason: reason.to_string(),
    };

    if spec.is_empty() {
        return Err(invalid("empty"));
    }
    if spec.chars().any(char::is_whitespace) {
        return Err(invalid("contains whitespace"));
    }

    let (host, port) = if let Some(rest) = spec.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| invalid("unbalanced brackets"))?;
        let port = match after {
            "" => None,
            _ => Some(
                after
                    .strip_prefix(':')
                    .ok_or_else(|| invalid("unexpected text after brackets"))?,
            ),
        };
        (host, port)
    } else if spec.contains(']') {
        return Err(invalid("unbalanced brackets"));
    } else {
        match spec.matches(':').count() {
            0 => (spec, None),
            1 => {
                let (host, port) = spec.split_once(':').ok_or_else(|| invalid("bad port"))?;
                (host, Some(port))
            }
            _ if spec.parse::<Ipv6Addr>().is_ok() => (spec, None),
            _ => return Err(invalid("too many ':' (bracket IPv6 addresses with a port)")),
        }
    };

    if host.is_empty() {
        return Err(invalid("empty host"));
    }
    if host.starts_with('-') || host.contains('/') || host.contains('@') {
        return Err(invalid("illegal character in host"));
    }

    let port = match port {
        None => DEFAULT_PORT,
        Some(port) => match port.parse::<u16>() {
            Ok(0) | Err(_) => return Err(invalid("port must be 1-65535")),
            Ok(port) => port,
        },
    };

    Ok((host.to_string(), port))
}

#[cfg(test)]
#[path = "hosts_tests.rs"]
mod tests;
