// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RUN: remote side effects, output discarded

use super::{ActionContext, ActionError, ActionOutcome};
use crashd_adapters::RemoteSession;
use crashd_script::{expand, RunCommand};

pub(super) async fn execute<S: RemoteSession>(
    cmd: &RunCommand,
    ctx: &ActionContext<'_, S>,
) -> Result<ActionOutcome, ActionError> {
    let command = expand(&cmd.command, &ctx.scope)?;
    let output = ctx.session.run(&command, ctx.timeout).await?;

    if !output.success() {
        return Err(ActionError::NonZeroExit {
            status: output.exit_status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            artifact: None,
        });
    }
    Ok(ActionOutcome::default())
}
