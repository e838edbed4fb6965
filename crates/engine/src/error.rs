// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors that stop a run before any host work starts

use crate::workdir::WorkdirError;
use crashd_script::{CommandKind, ExpandError, ValidationError};
use thiserror::Error;

/// A run that produced no host results
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid script: {0}")]
    Validation(#[from] ValidationError),
    #[error("line {line}: {kind}: {source}")]
    Preamble {
        kind: CommandKind,
        line: usize,
        source: ExpandError,
    },
    #[error("workdir: {0}")]
    Workdir(#[from] WorkdirError),
}
