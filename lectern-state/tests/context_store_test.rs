//! Integration tests for the file-backed context store

use lectern_state::context::{ContextStore, CONTEXT_INSUFFICIENT};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

/// Rewrite a file and push its modification time well past the current one
fn rewrite_with_newer_mtime(path: &Path, content: &str) {
    let previous = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::now());

    std::fs::write(path, content).unwrap();

    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(previous + Duration::from_secs(10)).unwrap();
}

fn bump_mtime_only(path: &Path) {
    let previous = std::fs::metadata(path).unwrap().modified().unwrap();
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(previous + Duration::from_secs(10)).unwrap();
}

#[tokio::test]
async fn test_get_returns_file_content() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("context.txt");
    std::fs::write(&path, "Context version A, long enough.").unwrap();

    let store = ContextStore::open(&path).await.unwrap();

    assert_eq!(store.get().await, "Context version A, long enough.");
}

#[tokio::test]
async fn test_get_picks_up_external_edit() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("context.txt");
    std::fs::write(&path, "Context version A, long enough.").unwrap();

    let store = ContextStore::open(&path).await.unwrap();
    assert_eq!(store.get().await, "Context version A, long enough.");
    let revision_a = store.snapshot().await.revision;

    rewrite_with_newer_mtime(&path, "Context version B, long enough.");

    assert_eq!(store.get().await, "Context version B, long enough.");
    let revision_b = store.snapshot().await.revision;
    assert_eq!(revision_b, revision_a + 1);

    // Unchanged mtime: served from memory, no further reload
    assert_eq!(store.get().await, "Context version B, long enough.");
    assert_eq!(store.get().await, "Context version B, long enough.");
    assert_eq!(store.snapshot().await.revision, revision_b);
}

#[tokio::test]
async fn test_get_ignores_content_change_without_newer_mtime() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("context.txt");
    std::fs::write(&path, "Context version A, long enough.").unwrap();

    let store = ContextStore::open(&path).await.unwrap();
    let modified = std::fs::metadata(&path).unwrap().modified().unwrap();

    std::fs::write(&path, "Context version B, long enough.").unwrap();
    File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(modified)
        .unwrap();

    assert_eq!(store.get().await, "Context version A, long enough.");
}

#[tokio::test]
async fn test_unreadable_version_is_not_retried_until_it_changes() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("context.txt");
    std::fs::write(&path, "Context version A, long enough.").unwrap();

    let store = ContextStore::open(&path).await.unwrap();
    let previous = std::fs::metadata(&path).unwrap().modified().unwrap();

    // Not valid UTF-8, with a newer mtime
    std::fs::write(&path, [0xff, 0xfe, 0xfd, 0xfc]).unwrap();
    let broken = previous + Duration::from_secs(10);
    File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(broken)
        .unwrap();

    assert_eq!(store.get().await, "Context version A, long enough.");

    // Same mtime as the failed version: not read again
    std::fs::write(&path, "Context version C, long enough.").unwrap();
    File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(broken)
        .unwrap();
    assert_eq!(store.get().await, "Context version A, long enough.");

    bump_mtime_only(&path);
    assert_eq!(store.get().await, "Context version C, long enough.");
}

#[tokio::test]
async fn test_get_keeps_text_when_file_disappears() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("context.txt");
    std::fs::write(&path, "Context that should survive.").unwrap();

    let store = ContextStore::open(&path).await.unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(store.get().await, "Context that should survive.");
}

#[tokio::test]
async fn test_reload_rereads_regardless_of_mtime() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("context.txt");
    std::fs::write(&path, "Context version A, long enough.").unwrap();

    let store = ContextStore::open(&path).await.unwrap();
    let modified = std::fs::metadata(&path).unwrap().modified().unwrap();

    std::fs::write(&path, "Context version B, long enough.").unwrap();
    File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(modified)
        .unwrap();

    store.reload().await.unwrap();
    assert_eq!(store.get().await, "Context version B, long enough.");
}

#[tokio::test]
async fn test_reload_short_content_stores_sentinel() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("context.txt");
    std::fs::write(&path, "Context version A, long enough.").unwrap();

    let store = ContextStore::open(&path).await.unwrap();
    std::fs::write(&path, "tiny").unwrap();

    assert!(store.reload().await.is_ok());
    assert_eq!(store.snapshot().await.text, CONTEXT_INSUFFICIENT);
}

#[tokio::test]
async fn test_update_round_trips_through_fresh_store() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("data").join("context.txt");

    let store = ContextStore::open(&path).await.unwrap();
    store.update("Context version C, long enough.").await.unwrap();
    assert_eq!(store.get().await, "Context version C, long enough.");

    let fresh = ContextStore::open(&path).await.unwrap();
    assert_eq!(fresh.get().await, "Context version C, long enough.");
}

#[tokio::test]
async fn test_update_does_not_trigger_reload_of_own_write() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("context.txt");
    std::fs::write(&path, "Context version A, long enough.").unwrap();

    let store = ContextStore::open(&path).await.unwrap();
    store.update("Context version C, long enough.").await.unwrap();
    let revision = store.snapshot().await.revision;

    store.get().await;
    assert_eq!(store.snapshot().await.revision, revision);
}

#[tokio::test]
async fn test_update_failure_leaves_state_unchanged() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("context.txt");
    std::fs::write(&path, "Context version A, long enough.").unwrap();

    let store = ContextStore::open(&path).await.unwrap();
    let before = store.snapshot().await;

    // A directory in place of the file makes the rename fail
    std::fs::remove_file(&path).unwrap();
    std::fs::create_dir(&path).unwrap();
    std::fs::write(path.join("occupied"), "x").unwrap();

    assert!(store.update("Context version C, long enough.").await.is_err());

    let after = store.snapshot().await;
    assert_eq!(after.text, before.text);
    assert_eq!(after.revision, before.revision);
}

#[tokio::test]
async fn test_concurrent_readers_see_whole_versions() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("context.txt");
    let version_a = "A".repeat(4096);
    let version_b = "B".repeat(4096);
    std::fs::write(&path, &version_a).unwrap();

    let store = Arc::new(ContextStore::open(&path).await.unwrap());

    let mut readers = Vec::new();
    for _ in 0..16 {
        let store = store.clone();
        readers.push(tokio::spawn(async move {
            let mut seen = Vec::new();
            for _ in 0..20 {
                seen.push(store.get().await);
                tokio::task::yield_now().await;
            }
            seen
        }));
    }

    store.update(&version_b).await.unwrap();
    bump_mtime_only(&path);

    for reader in readers {
        for text in reader.await.unwrap() {
            assert!(text == version_a || text == version_b);
        }
    }
    assert_eq!(store.get().await, version_b);
}
