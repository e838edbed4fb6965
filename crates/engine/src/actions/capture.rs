// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CAPTURE: run remotely and keep the output

use super::{ActionContext, ActionError, ActionOutcome};
use crate::workdir::WorkdirError;
use crashd_adapters::RemoteSession;
use crashd_script::{expand, CaptureCommand};
use tokio::io::AsyncWriteExt;

pub(super) async fn execute<S: RemoteSession>(
    cmd: &CaptureCommand,
    ctx: &ActionContext<'_, S>,
) -> Result<ActionOutcome, ActionError> {
    let command = expand(&cmd.command, &ctx.scope)?;
    let output = ctx.session.run(&command, ctx.timeout).await?;

    ctx.host_dir.ensure().await?;
    // Named after the declared text so reruns produce the same file
    let path = ctx.host_dir.claim_artifact(&cmd.command, Some("txt"));
    let write_error = |source| WorkdirError::Write {
        path: path.clone(),
        source,
    };

    let mut file = tokio::fs::File::create(&path).await.map_err(write_error)?;
    file.write_all(&output.stdout).await.map_err(write_error)?;
    file.write_all(&output.stderr).await.map_err(write_error)?;
    file.flush().await.map_err(write_error)?;

    if !output.success() {
        return Err(ActionError::NonZeroExit {
            status: output.exit_status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            artifact: Some(path),
        });
    }

    Ok(ActionOutcome {
        artifact: Some(path),
    })
}
