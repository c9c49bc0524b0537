//! Single-file polling watcher with debounced reload and subscriber
//! fan-out.
//!
//! The watcher is a long-lived tokio task that stats the tracked file
//! every poll interval, coalesces rapid edits through a rearming
//! debounce window, reloads the file off the blocking pool under a
//! timeout, and publishes per-path change events to subscribers.
//! Reserved event names: `file_deleted`, `permissions_changed`,
//! `reload_error:<message>`, `reload_timeout`, and `precedence:<path>`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::SystemTime;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::errors::ConfigError;
use crate::domain::options::{WatchOptions, SHUTDOWN_TIMEOUT, SPIN_WAIT_INTERVAL};
use crate::infrastructure::format::FileFormat;
use crate::services::registry::{Config, Shared};

/// Buffered depth of each subscriber channel. A full buffer indicates a
/// slow consumer; notifications to it are dropped, so subscribers must
/// treat events as edge triggers and re-read current values.
const SUBSCRIBER_BUFFER: usize = 10;

#[derive(Default)]
struct FileState {
    mod_time: Option<SystemTime>,
    size: u64,
    mode: Option<u32>,
}

/// Watcher state for one tracked file.
pub(crate) struct Watcher {
    opts: WatchOptions,
    file_path: PathBuf,
    cancel: CancellationToken,
    watching: AtomicBool,
    reload_in_progress: AtomicBool,
    /// Generation counter implementing the rearming debounce timer: each
    /// detected change bumps it, and a sleeper only fires if its
    /// generation is still current when it wakes.
    debounce_gen: AtomicU64,
    file_state: Mutex<FileState>,
    subscribers: Mutex<HashMap<u64, mpsc::Sender<String>>>,
    next_subscriber: AtomicU64,
}

impl Watcher {
    fn new(file_path: PathBuf, opts: WatchOptions) -> Self {
        Self {
            opts,
            file_path,
            cancel: CancellationToken::new(),
            watching: AtomicBool::new(false),
            reload_in_progress: AtomicBool::new(false),
            debounce_gen: AtomicU64::new(0),
            file_state: Mutex::new(FileState::default()),
            subscribers: Mutex::new(HashMap::new()),
            next_subscriber: AtomicU64::new(0),
        }
    }

    pub(crate) fn is_watching(&self) -> bool {
        self.watching.load(Ordering::SeqCst)
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.lock().expect("subscriber lock").len()
    }

    /// Registers a new subscriber channel. Past the watcher limit a
    /// pre-closed channel is returned instead.
    pub(crate) fn subscribe(&self) -> mpsc::Receiver<String> {
        let mut subscribers = self.subscribers.lock().expect("subscriber lock");
        if subscribers.len() >= self.opts.max_watchers {
            let (tx, rx) = mpsc::channel(1);
            drop(tx);
            return rx;
        }

        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = self.next_subscriber.fetch_add(1, Ordering::SeqCst);
        subscribers.insert(id, tx);
        rx
    }

    /// Sends one event to every subscriber, silently dropping it for
    /// full buffers and evicting closed channels.
    pub(crate) fn notify(&self, event: &str) {
        let mut subscribers = self.subscribers.lock().expect("subscriber lock");
        let mut closed = Vec::new();

        for (id, tx) in subscribers.iter() {
            match tx.try_send(event.to_string()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(event, subscriber = id, "subscriber buffer full, dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*id),
            }
        }
        for id in closed {
            subscribers.remove(&id);
        }
    }

    /// Cancels the poll loop, disarms any pending debounce, and closes
    /// every subscriber channel. Does not wait for loop exit.
    pub(crate) fn shutdown(&self) {
        self.cancel.cancel();
        self.debounce_gen.fetch_add(1, Ordering::SeqCst);
        self.subscribers.lock().expect("subscriber lock").clear();
    }

    fn record_initial_state(&self, metadata: Option<std::fs::Metadata>) {
        let mut state = self.file_state.lock().expect("file state lock");
        if let Some(md) = metadata {
            state.mod_time = md.modified().ok();
            state.size = md.len();
            state.mode = file_mode(&md);
        }
    }
}

#[cfg(unix)]
fn file_mode(md: &std::fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(md.permissions().mode())
}

#[cfg(not(unix))]
fn file_mode(_md: &std::fs::Metadata) -> Option<u32> {
    None
}

impl Config {
    /// Enables automatic reloading of the tracked file with default
    /// options. No-op when no file has been loaded yet.
    pub fn auto_update(&self) {
        self.auto_update_with_options(WatchOptions::default());
    }

    /// Enables automatic reloading with custom options. An existing
    /// watcher on the same file is kept; a watcher on a different file
    /// is replaced.
    pub fn auto_update_with_options(&self, opts: WatchOptions) {
        let opts = opts.normalized();

        let Some(file_path) = self.state_read().file_path.clone() else {
            // Nothing loaded, nothing to watch.
            return;
        };

        let mut slot = self.shared.watcher.lock().expect("watcher lock");
        if let Some(existing) = slot.as_ref() {
            if existing.file_path == file_path && existing.is_watching() {
                return;
            }
            existing.shutdown();
        }

        let watcher = Arc::new(Watcher::new(file_path.clone(), opts));
        watcher.record_initial_state(std::fs::metadata(&file_path).ok());
        // Marked watching before the task is scheduled so callers observe
        // the watcher immediately.
        watcher.watching.store(true, Ordering::SeqCst);
        *slot = Some(watcher.clone());
        drop(slot);

        info!(path = %file_path.display(), "file watcher starting");
        tokio::spawn(watch_loop(watcher, Arc::downgrade(&self.shared)));
    }

    /// Stops automatic reloading, closing all subscriber channels.
    /// Waits up to the shutdown timeout for the poll loop to drain.
    pub async fn stop_auto_update(&self) {
        let taken = self.shared.watcher.lock().expect("watcher lock").take();
        let Some(watcher) = taken else { return };

        watcher.shutdown();
        let deadline = tokio::time::Instant::now() + SHUTDOWN_TIMEOUT;
        while watcher.is_watching() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(SPIN_WAIT_INTERVAL).await;
        }
        info!("file watcher stopped");
    }

    /// Returns a channel of change events, starting the watcher with
    /// default options if needed.
    pub fn watch(&self) -> mpsc::Receiver<String> {
        self.watch_with_options(WatchOptions::default())
    }

    /// Returns a channel of change events with custom watch options.
    /// When no file is configured, a pre-closed channel is returned.
    pub fn watch_with_options(&self, opts: WatchOptions) -> mpsc::Receiver<String> {
        if self.state_read().file_path.is_none() {
            let (tx, rx) = mpsc::channel(1);
            drop(tx);
            return rx;
        }

        if let Some(watcher) = self.shared.active_watcher() {
            if watcher.is_watching() {
                return watcher.subscribe();
            }
        }

        self.auto_update_with_options(opts);
        match self.shared.active_watcher() {
            Some(watcher) => watcher.subscribe(),
            None => {
                let (tx, rx) = mpsc::channel(1);
                drop(tx);
                rx
            }
        }
    }

    /// Stops the current watcher, loads `path` (honoring the format
    /// hint), and restarts watching on the new file with the prior
    /// options. Subscribers of the old watcher are closed.
    pub async fn watch_file(
        &self,
        path: &Path,
        format_hint: Option<FileFormat>,
    ) -> Result<(), ConfigError> {
        let prior_opts = self
            .shared
            .active_watcher()
            .map(|w| w.opts.clone())
            .unwrap_or_default();

        self.stop_auto_update().await;

        if let Some(format) = format_hint {
            self.set_file_format(format);
        }

        self.load_file(path)?;
        self.auto_update_with_options(prior_opts);
        Ok(())
    }

    /// True while the poll loop is running.
    pub fn is_watching(&self) -> bool {
        self.shared
            .active_watcher()
            .is_some_and(|w| w.is_watching())
    }

    /// Number of live subscriber channels.
    pub fn watcher_count(&self) -> usize {
        self.shared
            .active_watcher()
            .map_or(0, |w| w.subscriber_count())
    }
}

/// The poll loop. Holds only a weak reference to the registry so a
/// dropped `Config` tears the loop down on its next tick.
async fn watch_loop(watcher: Arc<Watcher>, shared: Weak<Shared>) {
    let mut ticker = tokio::time::interval(watcher.opts.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first interval tick completes immediately; consume it so every
    // loop iteration is a full poll apart.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = watcher.cancel.cancelled() => break,
            _ = ticker.tick() => {
                let Some(shared) = shared.upgrade() else { break };
                check_file(&watcher, &shared);
            }
        }
    }

    watcher.watching.store(false, Ordering::SeqCst);
    debug!(path = %watcher.file_path.display(), "watch loop exited");
}

/// One poll iteration: stat, compare, and arm the debounce on change.
fn check_file(watcher: &Arc<Watcher>, shared: &Arc<Shared>) {
    let metadata = match std::fs::metadata(&watcher.file_path) {
        Ok(md) => md,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            watcher.notify("file_deleted");
            return;
        }
        Err(_) => return,
    };

    let mod_time = metadata.modified().ok();
    let size = metadata.len();
    let mode = file_mode(&metadata);

    let mut state = watcher.file_state.lock().expect("file state lock");

    if watcher.opts.verify_permissions {
        if let (Some(new_mode), Some(old_mode)) = (mode, state.mode) {
            // Group/other permission drift may be hostile; report it and
            // skip the reload without adopting the new state.
            if (new_mode ^ old_mode) & 0o077 != 0 {
                drop(state);
                warn!(path = %watcher.file_path.display(), "config file permissions drifted");
                watcher.notify("permissions_changed");
                return;
            }
        }
    }

    let changed = state.mod_time != mod_time || state.size != size;
    if !changed {
        return;
    }

    state.mod_time = mod_time;
    state.size = size;
    state.mode = mode;
    drop(state);

    arm_debounce(watcher, shared);
}

/// (Re)arms the debounce timer. Any further change within the window
/// bumps the generation, cancelling this sleeper and starting another,
/// which collapses rapid edits to one reload.
fn arm_debounce(watcher: &Arc<Watcher>, shared: &Arc<Shared>) {
    let generation = watcher.debounce_gen.fetch_add(1, Ordering::SeqCst) + 1;
    let watcher = watcher.clone();
    let shared = Arc::downgrade(shared);

    tokio::spawn(async move {
        tokio::time::sleep(watcher.opts.debounce).await;
        if watcher.debounce_gen.load(Ordering::SeqCst) != generation
            || watcher.cancel.is_cancelled()
        {
            return;
        }
        let Some(shared) = shared.upgrade() else { return };
        perform_reload(&watcher, &shared).await;
    });
}

/// Reload procedure: snapshot, timed file reload off the blocking pool,
/// snapshot again, publish the diff.
async fn perform_reload(watcher: &Arc<Watcher>, shared: &Arc<Shared>) {
    if watcher
        .reload_in_progress
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return;
    }

    let config = Config::from_shared(shared.clone());
    let pre = config.snapshot_flat();

    let load_path = watcher.file_path.clone();
    let load_config = Config::from_shared(shared.clone());
    let load = tokio::task::spawn_blocking(move || load_config.load_file(&load_path));

    match tokio::time::timeout(watcher.opts.reload_timeout, load).await {
        Err(_) => {
            warn!(path = %watcher.file_path.display(), "config reload timed out");
            watcher.notify("reload_timeout");
        }
        Ok(Err(join_error)) => {
            watcher.notify(&format!("reload_error:{join_error}"));
        }
        Ok(Ok(Err(load_error))) => {
            warn!(path = %watcher.file_path.display(), error = %load_error, "config reload failed");
            watcher.notify(&format!("reload_error:{load_error}"));
        }
        Ok(Ok(Ok(()))) => {
            let post = config.snapshot_flat();
            for (changed_path, new_value) in &post {
                if pre.get(changed_path) != Some(new_value) {
                    watcher.notify(changed_path);
                }
            }
            for removed_path in pre.keys() {
                if !post.contains_key(removed_path) {
                    watcher.notify(removed_path);
                }
            }
        }
    }

    watcher.reload_in_progress.store(false, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::options::{DEFAULT_MAX_WATCHERS, MIN_POLL_INTERVAL};

    #[tokio::test]
    async fn subscribe_past_limit_returns_closed_channel() {
        let watcher = Watcher::new(
            PathBuf::from("unused.toml"),
            WatchOptions {
                max_watchers: 2,
                ..WatchOptions::default()
            },
        );

        let _a = watcher.subscribe();
        let _b = watcher.subscribe();
        assert_eq!(watcher.subscriber_count(), 2);

        let mut overflow = watcher.subscribe();
        assert_eq!(overflow.recv().await, None);
        assert_eq!(watcher.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn notify_drops_for_full_buffers() {
        let watcher = Watcher::new(PathBuf::from("unused.toml"), WatchOptions::default());
        let mut rx = watcher.subscribe();

        for i in 0..SUBSCRIBER_BUFFER + 5 {
            watcher.notify(&format!("event-{i}"));
        }

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, SUBSCRIBER_BUFFER);
    }

    #[tokio::test]
    async fn shutdown_closes_subscribers() {
        let watcher = Watcher::new(PathBuf::from("unused.toml"), WatchOptions::default());
        let mut rx = watcher.subscribe();
        watcher.shutdown();
        assert_eq!(rx.recv().await, None);
        assert_eq!(watcher.subscriber_count(), 0);
    }

    #[test]
    fn options_are_normalized_on_start() {
        let opts = WatchOptions {
            poll_interval: std::time::Duration::from_millis(1),
            max_watchers: 0,
            ..WatchOptions::default()
        }
        .normalized();
        assert_eq!(opts.poll_interval, MIN_POLL_INTERVAL);
        assert_eq!(opts.max_watchers, DEFAULT_MAX_WATCHERS);
    }
}
