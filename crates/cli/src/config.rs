// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Optional TOML config file
//!
//! ```toml
//! max_concurrency = 8
//! command_timeout = "2m"
//! on_unresolved = "skip-action"
//!
//! [ssh]
//! program = "/usr/bin/ssh"
//! control_persist = "10m"
//! ```

use anyhow::{Context, Result};
use crashd_adapters::SshConfig;
use crashd_engine::{ExecutorConfig, UnresolvedPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub max_concurrency: Option<usize>,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub command_timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub run_timeout: Option<Duration>,
    pub on_unresolved: Option<UnresolvedPolicy>,
    pub workdir: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub ssh: SshSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SshSection {
    pub program: Option<PathBuf>,
    pub control_dir: Option<PathBuf>,
    #[serde(with = "humantime_serde")]
    pub control_persist: Option<Duration>,
    pub strict_host_key_checking: Option<String>,
    pub identity_files: Option<Vec<PathBuf>>,
}

impl FileConfig {
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Engine settings with file values over defaults
    pub fn executor_config(&self) -> ExecutorConfig {
        let mut config = ExecutorConfig::default();
        if let Some(n) = self.max_concurrency {
            config.max_concurrency = n;
        }
        if let Some(t) = self.connect_timeout {
            config.connect_timeout = t;
        }
        if let Some(t) = self.command_timeout {
            config.command_timeout = t;
        }
        if self.run_timeout.is_some() {
            config.run_timeout = self.run_timeout;
        }
        if let Some(policy) = self.on_unresolved {
            config.unresolved = policy;
        }
        if let Some(dir) = &self.workdir {
            config.default_workdir = dir.clone();
        }
        if let Some(output) = &self.output {
            config.default_output = output.clone();
        }
        config
    }

    pub fn ssh_config(&self) -> SshConfig {
        let ssh = &self.ssh;
        let mut config = SshConfig::default();
        if let Some(program) = &ssh.program {
            config.program = program.clone();
        }
        if let Some(dir) = &ssh.control_dir {
            config.control_dir = dir.clone();
        }
        if let Some(persist) = ssh.control_persist {
            config.control_persist = persist;
        }
        if let Some(mode) = &ssh.strict_host_key_checking {
            config.strict_host_key_checking = mode.clone();
        }
        if let Some(keys) = &ssh.identity_files {
            config.default_keys = keys.clone();
        }
        config
    }
}

/// `$XDG_CONFIG_HOME/crashd/config.toml`
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("crashd").join("config.toml"))
}

/// Load `explicit`, or the default file when present
///
/// An explicit path must exist; a missing default file means defaults.
pub fn load(explicit: Option<&Path>) -> Result<FileConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match default_path() {
            Some(path) if path.is_file() => path,
            _ => return Ok(FileConfig::default()),
        },
    };

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = FileConfig::parse(&content)
        .with_context(|| format!("invalid config {}", path.display()))?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(config)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
