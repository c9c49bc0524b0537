//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;

/// Creates a scratch directory holding one config file, returning the
/// guard (dropping it removes everything) and the file path.
pub fn temp_config_file(name: &str, contents: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join(name);
    std::fs::write(&path, contents).expect("write config file");
    (dir, path)
}

/// Overwrites a config file in place.
pub fn rewrite(path: &Path, contents: &str) {
    std::fs::write(path, contents).expect("rewrite config file");
}

/// Receives one event within the deadline, or `None` on timeout.
pub async fn recv_within(rx: &mut mpsc::Receiver<String>, deadline: Duration) -> Option<String> {
    tokio::time::timeout(deadline, rx.recv()).await.ok().flatten()
}

/// Drains every event already buffered on the channel.
pub fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<String> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Polls `predicate` every 20ms until it returns true or the deadline
/// passes.
pub async fn eventually<F: FnMut() -> bool>(mut predicate: F, deadline: Duration) -> bool {
    let end = tokio::time::Instant::now() + deadline;
    loop {
        if predicate() {
            return true;
        }
        if tokio::time::Instant::now() >= end {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
