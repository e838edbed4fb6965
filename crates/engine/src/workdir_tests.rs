// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;
use tempfile::tempdir;
use yare::parameterized;

#[parameterized(
    safe_ip = { "10.0.0.1", "10.0.0.1" },
    safe_name = { "node-1_a.example", "node-1_a.example" },
    port = { "10.0.0.1:2222", "10.0.0.1_2222" },
    command = { "/bin/echo HELLO", "_bin_echo_HELLO" },
    quotes = { "df -h \"/\"", "df_-h____" },
    placeholder = { "cat ${v}", "cat___v_" },
    unicode = { "héllo", "h_llo" },
    dot = { ".", "_" },
    dotdot = { "..", "__" },
    empty = { "", "_" },
)]
fn sanitize_cases(label: &str, expected: &str) {
    assert_eq!(sanitize(label), expected);
}

#[test]
fn long_labels_are_truncated_with_hash() {
    let long = "x".repeat(300);
    let other = format!("{}y", "x".repeat(299));

    let a = sanitize(&long);
    let b = sanitize(&other);
    assert_eq!(a.len(), MAX_SEGMENT_LEN);
    assert_eq!(b.len(), MAX_SEGMENT_LEN);
    assert_ne!(a, b);
    assert_eq!(a, sanitize(&long));
}

#[tokio::test]
async fn resolve_root_creates_missing_dirs() {
    let tmp = tempdir().unwrap();
    let target = tmp.path().join("a/b/c");

    let root = resolve_root(target.to_str(), Path::new("/unused"))
        .await
        .unwrap();
    assert_eq!(root, target);
    assert!(root.is_dir());
}

#[tokio::test]
async fn resolve_root_falls_back_to_default() {
    let tmp = tempdir().unwrap();
    let default = tmp.path().join("crashd");

    assert_eq!(resolve_root(None, &default).await.unwrap(), default);
    assert_eq!(resolve_root(Some(""), &default).await.unwrap(), default);
    assert!(default.is_dir());
}

#[tokio::test]
async fn resolve_root_rejects_file() {
    let tmp = tempdir().unwrap();
    let file = tmp.path().join("file");
    std::fs::write(&file, "x").unwrap();

    assert!(matches!(
        resolve_root(file.to_str(), Path::new("/unused")).await,
        Err(WorkdirError::NotADirectory(_))
    ));
}

#[tokio::test]
async fn host_dir_is_created_lazily() {
    let tmp = tempdir().unwrap();
    let dir = HostDir::new(tmp.path(), "10.0.0.1:2222");

    assert_eq!(dir.path(), tmp.path().join("10.0.0.1_2222"));
    assert!(!dir.path().exists());
    assert!(!dir.exists());

    dir.ensure().await.unwrap();
    dir.ensure().await.unwrap();
    assert!(dir.path().is_dir());
    assert!(dir.exists());
}

#[tokio::test]
async fn concurrent_ensure_is_safe() {
    let tmp = tempdir().unwrap();
    let a = HostDir::new(tmp.path(), "h1");
    let b = HostDir::new(tmp.path(), "h1");

    let (ra, rb) = tokio::join!(a.ensure(), b.ensure());
    assert!(ra.is_ok());
    assert!(rb.is_ok());
}

#[tokio::test]
async fn host_dir_over_file_fails() {
    let tmp = tempdir().unwrap();
    std::fs::write(tmp.path().join("h1"), "x").unwrap();
    let dir = HostDir::new(tmp.path(), "h1");

    assert!(matches!(
        dir.ensure().await,
        Err(WorkdirError::NotADirectory(_))
    ));
}

#[test]
fn artifact_paths_are_sanitized() {
    let dir = HostDir::new(Path::new("/w"), "h1");
    assert_eq!(
        dir.artifact_path("/bin/echo HELLO", Some("txt")),
        PathBuf::from("/w/h1/_bin_echo_HELLO.txt")
    );
    assert_eq!(
        dir.artifact_path("syslog", None),
        PathBuf::from("/w/h1/syslog")
    );
}

#[test]
fn claims_are_exclusive() {
    let dir = HostDir::new(Path::new("/w"), "h1");
    let path = dir.artifact_path("syslog", None);
    assert!(dir.claim(&path));
    assert!(!dir.claim(&path));
}

#[test]
fn claimed_artifact_names_get_suffixes() {
    let dir = HostDir::new(Path::new("/w"), "h1");

    let claim = |label: &str, ext| dir.claim_artifact(label, ext);

    assert_eq!(claim("df -h", Some("txt")), PathBuf::from("/w/h1/df_-h.txt"));
    // Different text, same sanitized name
    assert_eq!(claim("df_-h", Some("txt")), PathBuf::from("/w/h1/df_-h-2.txt"));
    assert_eq!(claim("df -h", None), PathBuf::from("/w/h1/df_-h"));
    assert_eq!(claim("df -h", Some("txt")), PathBuf::from("/w/h1/df_-h-3.txt"));
}

#[test]
fn host_dirs_are_distinct_per_host() {
    let mut dirs = HostDirs::new(Path::new("/w"));

    let first = dirs.assign("h:2222");
    let second = dirs.assign("h_2222");
    let third = dirs.assign("10.0.0.1");

    assert_eq!(first.path(), Path::new("/w/h_2222"));
    assert_eq!(
        second.path(),
        Path::new(&format!("/w/h_2222-{:08x}", crc32fast::hash(b"h_2222")))
    );
    assert_eq!(third.path(), Path::new("/w/10.0.0.1"));
}

#[test]
fn host_dir_assignment_is_deterministic() {
    let assign = || {
        let mut dirs = HostDirs::new(Path::new("/w"));
        ["a:1", "a_1", "a 1"]
            .into_iter()
            .map(|id| dirs.assign(id).path().to_path_buf())
            .collect::<Vec<_>>()
    };

    let paths = assign();
    assert_eq!(paths, assign());
    let unique: std::collections::HashSet<_> = paths.iter().collect();
    assert_eq!(unique.len(), 3);
}

proptest! {
    #[test]
    fn sanitize_is_stable_and_safe(label in ".{0,200}") {
        let once = sanitize(&label);
        prop_assert_eq!(&once, &sanitize(&label));
        prop_assert!(once.len() <= MAX_SEGMENT_LEN);
        prop_assert!(!once.is_empty());
        prop_assert!(once
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')));
        prop_assert!(once != "." && once != "..");
    }

    #[test]
    fn safe_labels_map_to_themselves(label in "[A-Za-z0-9_-][A-Za-z0-9._-]{0,60}") {
        prop_assert_eq!(sanitize(&label), label);
    }
}
