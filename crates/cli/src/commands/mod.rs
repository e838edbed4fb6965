// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI command implementations

pub mod check;
pub mod run;

use anyhow::{Context, Result};
use crashd_script::{parse_script, Script};
use std::path::Path;

/// Read and parse a script file
pub(crate) fn load_script(path: &Path) -> Result<Script> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script {}", path.display()))?;
    parse_script(&content).with_context(|| format!("{}", path.display()))
}
