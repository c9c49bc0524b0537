//! Load, watch, security, and discovery options, plus the crate's core
//! timing constants.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::source::{self, Source};

/// Max config item value size to prevent misuse.
pub const MAX_VALUE_SIZE: usize = 1024 * 1024; // 1MB

/// Default cap on the number of concurrent watch channels.
pub const DEFAULT_MAX_WATCHERS: usize = 100;

// Core timing constants, ordered by frequency.
/// CPU-friendly busy-wait quantum used while draining the watcher loop.
pub const SPIN_WAIT_INTERVAL: Duration = Duration::from_millis(5);
/// Hard floor for file stat polling.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Graceful watcher termination window.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(100);
/// File change coalescence period.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);
/// Standard file monitoring frequency.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Maximum duration for reload operations.
pub const DEFAULT_RELOAD_TIMEOUT: Duration = Duration::from_secs(5);

/// Converts a registered path to an environment variable name. Returning
/// `None` skips the path entirely.
pub type EnvTransform = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// How values are merged during a load. Only replace semantics are
/// currently defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    #[default]
    Replace,
}

/// Configures how configuration is loaded from multiple sources.
#[derive(Clone)]
pub struct LoadOptions {
    /// Precedence order; the first source is highest priority.
    pub sources: Vec<Source>,

    /// Prepended to environment variable names produced by the default
    /// transform. Example: `"MYAPP_"` maps `server.port` to
    /// `MYAPP_SERVER_PORT`.
    pub env_prefix: String,

    /// Customizes how paths map to environment variables. When `None`,
    /// the default transform (dots to underscores, uppercase, prefix)
    /// is used.
    pub env_transform: Option<EnvTransform>,

    /// Limits which paths are checked for env vars (`None` = all).
    pub env_whitelist: Option<HashSet<String>>,

    /// Determines how values are merged.
    pub load_mode: LoadMode,
}

impl LoadOptions {
    /// Resolves the effective path-to-env-name mapping for one path.
    pub(crate) fn env_name(&self, path: &str) -> Option<String> {
        match &self.env_transform {
            Some(transform) => match transform(path) {
                Some(name) if name.is_empty() => None,
                other => other,
            },
            None => Some(default_env_transform(&self.env_prefix, path)),
        }
    }
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            sources: source::default_precedence(),
            env_prefix: String::new(),
            env_transform: None,
            env_whitelist: None,
            load_mode: LoadMode::Replace,
        }
    }
}

impl std::fmt::Debug for LoadOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadOptions")
            .field("sources", &self.sources)
            .field("env_prefix", &self.env_prefix)
            .field(
                "env_transform",
                &self.env_transform.as_ref().map(|_| "<fn>"),
            )
            .field("env_whitelist", &self.env_whitelist)
            .field("load_mode", &self.load_mode)
            .finish()
    }
}

/// The default environment transform: dots to underscores, uppercased,
/// prefix prepended.
pub fn default_env_transform(prefix: &str, path: &str) -> String {
    let mut env = path.replace('.', "_").to_uppercase();
    if !prefix.is_empty() {
        env.insert_str(0, prefix);
    }
    env
}

/// Configures file watching behavior.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Interval between file stat checks (floored at 100ms).
    pub poll_interval: Duration,
    /// Quiet period required before a detected change triggers a reload.
    pub debounce: Duration,
    /// Limits concurrent watch channels.
    pub max_watchers: usize,
    /// Deadline for one reload operation.
    pub reload_timeout: Duration,
    /// Checks the file hasn't been replaced with different permissions.
    pub verify_permissions: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            debounce: DEFAULT_DEBOUNCE,
            max_watchers: DEFAULT_MAX_WATCHERS,
            reload_timeout: DEFAULT_RELOAD_TIMEOUT,
            verify_permissions: true,
        }
    }
}

impl WatchOptions {
    /// Clamps out-of-range fields to their documented floors/defaults.
    pub(crate) fn normalized(mut self) -> Self {
        if self.poll_interval < MIN_POLL_INTERVAL {
            self.poll_interval = MIN_POLL_INTERVAL;
        }
        if self.max_watchers == 0 {
            self.max_watchers = DEFAULT_MAX_WATCHERS;
        }
        if self.reload_timeout.is_zero() {
            self.reload_timeout = DEFAULT_RELOAD_TIMEOUT;
        }
        self
    }
}

/// Security checks applied when loading files.
#[derive(Debug, Clone, Default)]
pub struct SecurityOptions {
    /// Reject paths containing traversal components (`..`).
    pub prevent_path_traversal: bool,
    /// Reject files larger than this many bytes (0 disables the check).
    pub max_file_size: u64,
    /// On unix, reject files not owned by the effective user.
    pub enforce_file_ownership: bool,
}

/// Configures automatic config file discovery.
#[derive(Debug, Clone, Default)]
pub struct FileDiscoveryOptions {
    /// Base name of the config file, without extension.
    pub name: String,
    /// Extensions to try, in order.
    pub extensions: Vec<String>,
    /// Custom search paths, consulted before the defaults.
    pub paths: Vec<std::path::PathBuf>,
    /// Environment variable holding an explicit path.
    pub env_var: String,
    /// CLI flag holding an explicit path (e.g. `--config`).
    pub cli_flag: String,
    /// Search XDG config directories.
    pub use_xdg: bool,
    /// Search the current working directory.
    pub use_current_dir: bool,
}

impl FileDiscoveryOptions {
    /// Sensible defaults for an application named `app_name`: current
    /// directory then XDG directories, `APP_CONFIG` env var, `--config`
    /// flag.
    pub fn for_app(app_name: &str) -> Self {
        Self {
            name: app_name.to_string(),
            extensions: vec![".toml".into(), ".conf".into(), ".config".into()],
            paths: Vec::new(),
            env_var: format!("{}_CONFIG", app_name.to_uppercase()),
            cli_flag: "--config".into(),
            use_xdg: true,
            use_current_dir: true,
        }
    }
}
