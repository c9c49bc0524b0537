//! The registry and merge engine.
//!
//! The registry is the authoritative mapping from dot-path to a
//! [`ConfigItem`] holding the registered default, per-source raw values,
//! and the computed current value. Every mutation recomputes affected
//! current values before returning and bumps a monotonically increasing
//! version counter that readers may consult without the lock.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use tracing::debug;

use crate::domain::errors::ConfigError;
use crate::domain::options::{LoadOptions, SecurityOptions, MAX_VALUE_SIZE};
use crate::domain::path;
use crate::domain::source::{self, Source};
use crate::domain::tree;
use crate::domain::value::{self, Value};
use crate::infrastructure::env;
use crate::infrastructure::format::FileFormat;
use crate::services::decoder::StructCache;
use crate::services::watcher::Watcher;

/// One registered path: its default, per-source raw values, and the
/// value computed from the active precedence.
#[derive(Debug, Clone)]
pub(crate) struct ConfigItem {
    pub(crate) default_value: Value,
    pub(crate) values: HashMap<Source, Value>,
    pub(crate) current_value: Value,
}

impl ConfigItem {
    fn new(default_value: Value) -> Self {
        let current_value = default_value.clone();
        Self {
            default_value,
            values: HashMap::new(),
            current_value,
        }
    }

    /// The merge rule: first source in precedence order with a present,
    /// non-nil value wins; otherwise the default applies.
    pub(crate) fn compute(&self, sources: &[Source]) -> Value {
        for source in sources {
            if let Some(value) = self.values.get(source) {
                if !value.is_nil() {
                    return value.clone();
                }
            }
        }
        self.default_value.clone()
    }
}

pub(crate) struct State {
    pub(crate) items: HashMap<String, ConfigItem>,
    pub(crate) options: LoadOptions,
    pub(crate) file_path: Option<PathBuf>,
    pub(crate) file_format: FileFormat,
    pub(crate) security: SecurityOptions,
}

pub(crate) struct Shared {
    pub(crate) state: RwLock<State>,
    pub(crate) version: AtomicU64,
    pub(crate) struct_cache: Mutex<Option<StructCache>>,
    pub(crate) watcher: Mutex<Option<Arc<Watcher>>>,
}

impl Shared {
    pub(crate) fn invalidate(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn active_watcher(&self) -> Option<Arc<Watcher>> {
        self.watcher.lock().expect("watcher lock").clone()
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.get_mut().expect("watcher lock").take() {
            watcher.shutdown();
        }
    }
}

/// Thread-safe, multi-source configuration manager.
///
/// A `Config` can be used two ways: as a dynamic key-value store read
/// through [`get`](Config::get) and the typed accessors, or as the
/// backing store for a typed struct populated through
/// [`decode`](Config::decode) / [`as_struct`](Config::as_struct).
pub struct Config {
    pub(crate) shared: Arc<Shared>,
}

impl Config {
    /// Creates an empty registry with the standard precedence
    /// (CLI > env > file > defaults).
    pub fn new() -> Self {
        Self::with_options(LoadOptions::default())
    }

    /// Creates an empty registry with custom load options.
    pub fn with_options(mut options: LoadOptions) -> Self {
        options.sources = source::normalize_precedence(&options.sources);
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(State {
                    items: HashMap::new(),
                    options,
                    file_path: None,
                    file_format: FileFormat::Auto,
                    security: SecurityOptions::default(),
                }),
                version: AtomicU64::new(0),
                struct_cache: Mutex::new(None),
                watcher: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub(crate) fn state_read(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.shared.state.read().expect("registry lock poisoned")
    }

    pub(crate) fn state_write(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.shared.state.write().expect("registry lock poisoned")
    }

    /// Makes a configuration path known to the registry.
    ///
    /// Re-registering an existing path replaces the default and clears
    /// any per-source entries, even when the new default equals the old
    /// one.
    pub fn register(&self, config_path: &str, default: impl Into<Value>) -> Result<(), ConfigError> {
        path::validate(config_path)?;

        let mut state = self.state_write();
        state
            .items
            .insert(config_path.to_string(), ConfigItem::new(default.into()));
        drop(state);

        self.shared.invalidate();
        debug!(path = config_path, "registered path");
        Ok(())
    }

    /// Registers a path and immediately reads an explicit environment
    /// variable for it, bypassing the usual name transform.
    pub fn register_with_env(
        &self,
        config_path: &str,
        default: impl Into<Value>,
        env_var: &str,
    ) -> Result<(), ConfigError> {
        self.register(config_path, default)?;

        if let Ok(raw) = std::env::var(env_var) {
            let parsed = env::parse_scalar(&raw);
            return self.set_source(config_path, Source::Env, parsed);
        }
        Ok(())
    }

    /// Registers every leaf of a defaults struct under `prefix`.
    ///
    /// The struct is walked through its `Serialize` impl, so serde
    /// attributes (`rename`, `skip`, ...) decide the path names.
    /// `Duration` and `SystemTime` fields register as single leaves.
    pub fn register_struct<T: Serialize>(
        &self,
        prefix: &str,
        defaults: &T,
    ) -> Result<(), ConfigError> {
        let tree = value::to_value(defaults)?;
        let Value::Table(table) = tree else {
            return Err(ConfigError::Serialize(format!(
                "defaults must serialize to a table, got {}",
                tree.kind()
            )));
        };

        let prefix = prefix.strip_suffix('.').unwrap_or(prefix);
        let flat = tree::flatten(&table, prefix);

        let mut errors = Vec::new();
        for (leaf_path, default) in flat {
            if let Err(e) = self.register(&leaf_path, default) {
                errors.push(e);
            }
        }
        ConfigError::join(errors)
    }

    /// Removes a path and every path prefixed by it. Errs when neither
    /// the path nor any descendant is registered.
    pub fn unregister(&self, config_path: &str) -> Result<(), ConfigError> {
        let mut state = self.state_write();

        let had_any = state
            .items
            .keys()
            .any(|key| path::is_descendant(key, config_path));
        if !had_any {
            return Err(ConfigError::NotRegistered(config_path.to_string()));
        }

        state
            .items
            .retain(|key, _| !path::is_descendant(key, config_path));
        drop(state);

        self.shared.invalidate();
        debug!(path = config_path, "unregistered subtree");
        Ok(())
    }

    /// Returns the current (merged) value for a registered path.
    pub fn get(&self, config_path: &str) -> Option<Value> {
        self.state_read()
            .items
            .get(config_path)
            .map(|item| item.current_value.clone())
    }

    /// Returns the raw value a specific source holds for a path.
    pub fn get_source(&self, config_path: &str, source: Source) -> Option<Value> {
        self.state_read()
            .items
            .get(config_path)
            .and_then(|item| item.values.get(&source).cloned())
    }

    /// Returns a defensive copy of every per-source entry for a path.
    pub fn get_sources(&self, config_path: &str) -> HashMap<Source, Value> {
        self.state_read()
            .items
            .get(config_path)
            .map(|item| item.values.clone())
            .unwrap_or_default()
    }

    /// Sets a value in the highest-priority configured source.
    pub fn set(&self, config_path: &str, value: impl Into<Value>) -> Result<(), ConfigError> {
        let source = self.state_read().options.sources[0];
        self.set_source(config_path, source, value)
    }

    /// Sets a value for a specific source and recomputes the current
    /// value before returning. The `Default` source is only written at
    /// registration.
    pub fn set_source(
        &self,
        config_path: &str,
        source: Source,
        value: impl Into<Value>,
    ) -> Result<(), ConfigError> {
        if source == Source::Default {
            return Err(ConfigError::SourceReadOnly(Source::Default));
        }

        let value = value.into();
        if value.approximate_size() > MAX_VALUE_SIZE {
            return Err(ConfigError::OversizeValue {
                limit: MAX_VALUE_SIZE,
            });
        }

        let mut state = self.state_write();
        let sources = state.options.sources.clone();
        let Some(item) = state.items.get_mut(config_path) else {
            return Err(ConfigError::NotRegistered(config_path.to_string()));
        };

        item.values.insert(source, value);
        item.current_value = item.compute(&sources);
        drop(state);

        self.shared.invalidate();
        debug!(path = config_path, %source, "source value updated");
        Ok(())
    }

    /// Clears all per-source entries, restoring every path to its
    /// default.
    pub fn reset(&self) {
        let mut state = self.state_write();
        for item in state.items.values_mut() {
            item.values.clear();
            item.current_value = item.default_value.clone();
        }
        drop(state);
        self.shared.invalidate();
    }

    /// Clears one source's entries and recomputes affected values.
    pub fn reset_source(&self, source: Source) {
        let mut state = self.state_write();
        let sources = state.options.sources.clone();
        for item in state.items.values_mut() {
            if item.values.remove(&source).is_some() {
                item.current_value = item.compute(&sources);
            }
        }
        drop(state);
        self.shared.invalidate();
    }

    /// All registered paths under `prefix` (every path when `prefix` is
    /// empty).
    pub fn registered_paths(&self, prefix: &str) -> Vec<String> {
        let mut paths: Vec<String> = self
            .state_read()
            .items
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        paths.sort();
        paths
    }

    /// Registered paths under `prefix` together with their defaults.
    pub fn registered_paths_with_defaults(&self, prefix: &str) -> BTreeMap<String, Value> {
        self.state_read()
            .items
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, item)| (key.clone(), item.default_value.clone()))
            .collect()
    }

    /// Replaces the active precedence list and recomputes every current
    /// value. `Default` is appended when absent. Changed paths are
    /// published to subscribers as `precedence:<path>` events.
    pub fn set_precedence(&self, sources: &[Source]) {
        let normalized = source::normalize_precedence(sources);

        let mut changed = Vec::new();
        {
            let mut state = self.state_write();
            state.options.sources = normalized;
            let sources = state.options.sources.clone();
            for (item_path, item) in state.items.iter_mut() {
                let recomputed = item.compute(&sources);
                if recomputed != item.current_value {
                    changed.push(item_path.clone());
                }
                item.current_value = recomputed;
            }
        }
        self.shared.invalidate();

        if changed.is_empty() {
            return;
        }
        if let Some(watcher) = self.shared.active_watcher() {
            for item_path in &changed {
                watcher.notify(&format!("precedence:{item_path}"));
            }
        }
    }

    /// The active precedence list, highest priority first.
    pub fn precedence(&self) -> Vec<Source> {
        self.state_read().options.sources.clone()
    }

    /// Replaces the load options and recomputes all current values.
    pub fn set_load_options(&self, mut options: LoadOptions) {
        options.sources = source::normalize_precedence(&options.sources);
        let mut state = self.state_write();
        state.options = options;
        let sources = state.options.sources.clone();
        for item in state.items.values_mut() {
            item.current_value = item.compute(&sources);
        }
        drop(state);
        self.shared.invalidate();
    }

    /// Nominates the expected on-disk format for subsequent file loads.
    pub fn set_file_format(&self, format: FileFormat) {
        self.state_write().file_format = format;
    }

    /// Replaces the security options applied to file loads.
    pub fn set_security_options(&self, security: SecurityOptions) {
        self.state_write().security = security;
    }

    /// Monotonic change counter. Advances on every mutation; readers may
    /// use it to invalidate caches without taking the registry lock.
    pub fn version(&self) -> u64 {
        self.shared.version.load(Ordering::SeqCst)
    }

    /// Checks that every listed path was explicitly set by some source
    /// (a value equal to its default with no source opinion counts as
    /// missing).
    pub fn validate(&self, required: &[&str]) -> Result<(), ConfigError> {
        let state = self.state_read();
        let mut missing = Vec::new();

        for &required_path in required {
            let Some(item) = state.items.get(required_path) else {
                missing.push(format!("{required_path} (not registered)"));
                continue;
            };

            if item.current_value == item.default_value
                && !item.values.values().any(|v| !v.is_nil())
            {
                missing.push(required_path.to_string());
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(format!(
                "missing required configuration: {}",
                missing.join(", ")
            )))
        }
    }

    /// A point-in-time flat `path -> current value` map.
    pub(crate) fn snapshot_flat(&self) -> BTreeMap<String, Value> {
        self.state_read()
            .items
            .iter()
            .map(|(key, item)| (key.clone(), item.current_value.clone()))
            .collect()
    }

    /// Formatted diagnostic view of every path, its current value, and
    /// each source's opinion.
    pub fn debug_dump(&self) -> String {
        use std::fmt::Write as _;

        let state = self.state_read();
        let mut out = String::from("Configuration Debug Info:\n");
        let _ = writeln!(
            out,
            "Precedence: [{}]",
            state
                .options
                .sources
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );
        out.push_str("Current values:\n");

        let mut paths: Vec<_> = state.items.keys().collect();
        paths.sort();
        for item_path in paths {
            let item = &state.items[item_path];
            let _ = writeln!(out, "  {item_path}:");
            let _ = writeln!(out, "    Current: {}", item.current_value);
            let _ = writeln!(out, "    Default: {}", item.default_value);
            for source in [Source::File, Source::Env, Source::Cli] {
                if let Some(value) = item.values.get(&source) {
                    let _ = writeln!(out, "    {source}: {value}");
                }
            }
        }
        out
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Deep copy: fresh storage for every item and option, no watcher, and
/// an empty struct cache. The clone observes no further mutations of the
/// original.
impl Clone for Config {
    fn clone(&self) -> Self {
        let state = self.state_read();
        let copy = Config::with_options(state.options.clone());
        {
            let mut copy_state = copy.state_write();
            copy_state.items = state.items.clone();
            copy_state.file_path = state.file_path.clone();
            copy_state.file_format = state.file_format;
            copy_state.security = state.security.clone();
        }
        copy
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state_read();
        f.debug_struct("Config")
            .field("paths", &state.items.len())
            .field("precedence", &state.options.sources)
            .field("file", &state.file_path)
            .finish()
    }
}
