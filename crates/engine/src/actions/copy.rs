// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! COPY: stream a remote file into the host directory

use super::{ActionContext, ActionError, ActionOutcome};
use crate::workdir::WorkdirError;
use crashd_adapters::RemoteSession;
use crashd_script::{expand, CopyCommand};
use std::path::{Path, PathBuf};

pub(super) async fn execute<S: RemoteSession>(
    cmd: &CopyCommand,
    ctx: &ActionContext<'_, S>,
) -> Result<ActionOutcome, ActionError> {
    let remote = expand(&cmd.path, &ctx.scope)?;
    ctx.host_dir.ensure().await?;
    let path = local_path(ctx, &cmd.path);

    let mut file = tokio::fs::File::create(&path)
        .await
        .map_err(|source| WorkdirError::Write {
            path: path.clone(),
            source,
        })?;

    match ctx.session.fetch(&remote, &mut file, ctx.timeout).await {
        Ok(bytes) => {
            tracing::debug!(remote = %remote, local = %path.display(), bytes, "copied");
            Ok(ActionOutcome {
                artifact: Some(path),
            })
        }
        Err(e) => {
            drop(file);
            let _ = tokio::fs::remove_file(&path).await;
            Err(e.into())
        }
    }
}

/// Local file for `declared`: its sanitized basename, or the whole
/// sanitized path if another artifact on this host already has that name
/// (suffixed if that is taken too)
fn local_path<S>(ctx: &ActionContext<'_, S>, declared: &str) -> PathBuf {
    let basename = Path::new(declared)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(declared);

    let path = ctx.host_dir.artifact_path(basename, None);
    if ctx.host_dir.claim(&path) {
        return path;
    }
    ctx.host_dir.claim_artifact(declared, None)
}
