// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local working directory layout
//!
//! `<root>/<sanitize(host)>/<sanitize(label)>.<ext>`

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;

/// Longest path segment produced by [`sanitize`]
pub const MAX_SEGMENT_LEN: usize = 128;

/// Errors preparing or writing into the working directory
#[derive(Debug, Error)]
pub enum WorkdirError {
    #[error("{} exists and is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("cannot create {}: {source}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Create the run's root directory (and parents)
///
/// `path` is the expanded WORKDIR argument; `None` selects `default`.
pub async fn resolve_root(
    path: Option<&str>,
    default: &Path,
) -> Result<PathBuf, WorkdirError> {
    let root = match path {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => default.to_path_buf(),
    };

    if tokio::fs::metadata(&root)
        .await
        .is_ok_and(|meta| !meta.is_dir())
    {
        return Err(WorkdirError::NotADirectory(root));
    }
    tokio::fs::create_dir_all(&root)
        .await
        .map_err(|source| WorkdirError::Create {
            path: root.clone(),
            source,
        })?;

    tracing::debug!(root = %root.display(), "workdir ready");
    Ok(root)
}

/// Map `label` to a deterministic, filename-safe path segment
///
/// `[A-Za-z0-9._-]` pass through and everything else becomes `_`, so safe
/// labels map to themselves. Segments of only dots become underscores.
/// Labels over [`MAX_SEGMENT_LEN`] bytes are truncated and suffixed with a
/// CRC-32 of the full label.
pub fn sanitize(label: &str) -> String {
    let mut out: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if out.chars().all(|c| c == '.') {
        out = "_".repeat(out.len().max(1));
    }

    if out.len() > MAX_SEGMENT_LEN {
        let suffix = format!("-{:08x}", crc32fast::hash(label.as_bytes()));
        // Output is ASCII, so any byte index is a char boundary
        out.truncate(MAX_SEGMENT_LEN - suffix.len());
        out.push_str(&suffix);
    }
    out
}

/// One host's artifact directory, created on first write
#[derive(Debug)]
pub struct HostDir {
    path: PathBuf,
    created: AtomicBool,
    claimed: Mutex<HashSet<PathBuf>>,
}

impl HostDir {
    pub fn new(root: &Path, host_id: &str) -> Self {
        Self::at(root.join(sanitize(host_id)))
    }

    fn at(path: PathBuf) -> Self {
        Self {
            path,
            created: AtomicBool::new(false),
            claimed: Mutex::new(HashSet::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.created.load(Ordering::SeqCst)
    }

    /// Create the directory if needed
    ///
    /// Idempotent; safe when another task creates the same path concurrently.
    pub async fn ensure(&self) -> Result<&Path, WorkdirError> {
        if self.created.load(Ordering::SeqCst) {
            return Ok(&self.path);
        }
        if tokio::fs::metadata(&self.path)
            .await
            .is_ok_and(|meta| !meta.is_dir())
        {
            return Err(WorkdirError::NotADirectory(self.path.clone()));
        }
        tokio::fs::create_dir_all(&self.path)
            .await
            .map_err(|source| WorkdirError::Create {
                path: self.path.clone(),
                source,
            })?;
        self.created.store(true, Ordering::SeqCst);
        Ok(&self.path)
    }

    /// Path for an artifact named after `label`
    pub fn artifact_path(&self, label: &str, ext: Option<&str>) -> PathBuf {
        let name = sanitize(label);
        match ext {
            Some(ext) => self.path.join(format!("{name}.{ext}")),
            None => self.path.join(name),
        }
    }

    /// Reserve `path` for this run; false if an earlier artifact took it
    pub fn claim(&self, path: &Path) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.to_path_buf())
    }

    /// Reserve an artifact path for `label`
    ///
    /// The first artifact to want a name keeps it; later ones get `-2`,
    /// `-3`, ... in the order they claim, so reruns reproduce the names.
    pub fn claim_artifact(&self, label: &str, ext: Option<&str>) -> PathBuf {
        let stem = sanitize(label);
        let file_name = |stem: &str| match ext {
            Some(ext) => format!("{stem}.{ext}"),
            None => stem.to_string(),
        };

        let mut path = self.path.join(file_name(&stem));
        let mut n = 2;
        while !self.claim(&path) {
            path = self.path.join(file_name(&format!("{stem}-{n}")));
            n += 1;
        }
        path
    }
}

/// Hands out one distinct [`HostDir`] per host under a run's root
///
/// Hosts whose sanitized ids coincide (`h:2222` and `h_2222`) must not
/// share a directory; later ones get a CRC-32 suffix of their full id.
#[derive(Debug)]
pub struct HostDirs {
    root: PathBuf,
    taken: HashSet<String>,
}

impl HostDirs {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            taken: HashSet::new(),
        }
    }

    pub fn assign(&mut self, host_id: &str) -> HostDir {
        let mut name = sanitize(host_id);
        if self.taken.contains(&name) {
            let hashed = format!("{name}-{:08x}", crc32fast::hash(host_id.as_bytes()));
            name = hashed.clone();
            let mut n = 2;
            while self.taken.contains(&name) {
                name = format!("{hashed}-{n}");
                n += 1;
            }
        }
        self.taken.insert(name.clone());
        HostDir::at(self.root.join(name))
    }
}

#[cfg(test)]
#[path = "workdir_tests.rs"]
mod tests;
