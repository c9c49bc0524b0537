//! Multi-source loading and atomic saving.
//!
//! Each loader computes its full submission without the registry lock,
//! then grabs the write lock once to apply it, so a load is observed
//! all-or-nothing by concurrent readers.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info};

use crate::domain::errors::ConfigError;
use crate::domain::options::LoadOptions;
use crate::domain::source::Source;
use crate::domain::tree;
use crate::domain::value::Value;
use crate::infrastructure::{cli, env, file};
use crate::services::registry::Config;

impl Config {
    /// Loads every configured source with the active options. `file` is
    /// optional; `args` may be empty.
    pub fn load(&self, file: Option<&Path>, args: &[String]) -> Result<(), ConfigError> {
        let opts = self.state_read().options.clone();
        self.load_with_options(file, args, opts)
    }

    /// Loads configuration from multiple sources with custom options.
    ///
    /// Sources are visited in reverse precedence order so higher-priority
    /// sources submit last; each configured source is consulted exactly
    /// once. Missing files and CLI grammar errors accumulate and are
    /// returned joined; parse failures and oversize values short-circuit.
    pub fn load_with_options(
        &self,
        file: Option<&Path>,
        args: &[String],
        opts: LoadOptions,
    ) -> Result<(), ConfigError> {
        self.set_load_options(opts.clone());

        let mut accumulated = Vec::new();

        for source in opts.sources.iter().rev() {
            match source {
                // Defaults are already in place from registration.
                Source::Default => continue,

                Source::File => {
                    let Some(path) = file else { continue };
                    if let Err(e) = self.load_file(path) {
                        if e.is_file_not_found() {
                            accumulated.push(e);
                        } else {
                            return Err(e);
                        }
                    }
                }

                Source::Env => self.load_env_with(&opts)?,

                Source::Cli => {
                    if !args.is_empty() {
                        if let Err(e) = self.load_cli(args) {
                            accumulated.push(e);
                        }
                    }
                }
            }
        }

        ConfigError::join(accumulated)
    }

    /// Reads, parses, and applies one configuration file.
    ///
    /// Only registered paths are absorbed; unknown keys in the file are
    /// ignored. Registered paths absent from the file lose their
    /// file-sourced entry, so repeated loads track the file exactly.
    pub fn load_file(&self, path: &Path) -> Result<(), ConfigError> {
        let (file_format, security, registered) = {
            let state = self.state_read();
            (
                state.file_format,
                state.security.clone(),
                state
                    .items
                    .keys()
                    .cloned()
                    .collect::<std::collections::HashSet<String>>(),
            )
        };

        // Parse outside the lock.
        let table = file::read_config_table(path, file_format, &security)?;

        let mut submission = BTreeMap::new();
        collect_registered("", &table, &registered, &mut submission);

        let mut state = self.state_write();
        state.file_path = Some(path.to_path_buf());
        let sources = state.options.sources.clone();
        for (item_path, item) in state.items.iter_mut() {
            match submission.remove(item_path) {
                Some(value) => {
                    item.values.insert(Source::File, value);
                }
                None => {
                    item.values.remove(&Source::File);
                }
            }
            item.current_value = item.compute(&sources);
        }
        drop(state);

        self.shared.invalidate();
        info!(path = %path.display(), "configuration file loaded");
        Ok(())
    }

    /// Loads environment variables with the given prefix, keeping the
    /// rest of the active options.
    pub fn load_env(&self, prefix: &str) -> Result<(), ConfigError> {
        let mut opts = self.state_read().options.clone();
        opts.env_prefix = prefix.to_string();
        self.load_env_with(&opts)
    }

    pub(crate) fn load_env_with(&self, opts: &LoadOptions) -> Result<(), ConfigError> {
        let paths: Vec<String> = self.state_read().items.keys().cloned().collect();

        // Environment iteration happens without the lock.
        let found = env::collect_env(&paths, opts)?;
        if found.is_empty() {
            return Ok(());
        }

        let mut state = self.state_write();
        let sources = state.options.sources.clone();
        let count = found.len();
        for (item_path, raw) in found {
            if let Some(item) = state.items.get_mut(&item_path) {
                // Raw string; the decoder converts at read time.
                item.values.insert(Source::Env, Value::Str(raw));
                item.current_value = item.compute(&sources);
            }
        }
        drop(state);

        self.shared.invalidate();
        debug!(count, "environment variables applied");
        Ok(())
    }

    /// Loads command-line arguments.
    pub fn load_cli(&self, args: &[String]) -> Result<(), ConfigError> {
        let flattened = cli::parse_args(args)?;
        if flattened.is_empty() {
            return Ok(());
        }

        let mut state = self.state_write();
        let sources = state.options.sources.clone();
        let mut count = 0usize;
        for (item_path, value) in flattened {
            if let Some(item) = state.items.get_mut(&item_path) {
                item.values.insert(Source::Cli, value);
                item.current_value = item.compute(&sources);
                count += 1;
            }
            // Unregistered paths from the command line are ignored.
        }
        drop(state);

        self.shared.invalidate();
        debug!(count, "command-line arguments applied");
        Ok(())
    }

    /// Writes the current configuration to a TOML file atomically. Only
    /// registered paths are saved.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let snapshot = self.snapshot_flat();
        let mut nested = BTreeMap::new();
        for (item_path, value) in snapshot {
            tree::set_nested(&mut nested, &item_path, value);
        }

        let rendered = crate::infrastructure::format::to_toml_string(&nested)?;
        file::atomic_write(path, rendered.as_bytes())?;
        info!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Writes one source's raw values to a TOML file atomically.
    pub fn save_source(&self, path: &Path, source: Source) -> Result<(), ConfigError> {
        let mut nested = BTreeMap::new();
        {
            let state = self.state_read();
            for (item_path, item) in &state.items {
                if let Some(value) = item.values.get(&source) {
                    tree::set_nested(&mut nested, item_path, value.clone());
                }
            }
        }

        let rendered = crate::infrastructure::format::to_toml_string(&nested)?;
        file::atomic_write(path, rendered.as_bytes())?;
        info!(path = %path.display(), %source, "source values saved");
        Ok(())
    }

    /// Renders the current configuration as a TOML document without
    /// touching the filesystem.
    pub fn render_toml(&self) -> Result<String, ConfigError> {
        let mut nested = BTreeMap::new();
        for (item_path, value) in self.snapshot_flat() {
            tree::set_nested(&mut nested, &item_path, value);
        }
        crate::infrastructure::format::to_toml_string(&nested)
    }

    /// Maps each registered path to the environment variable name
    /// currently set for it.
    pub fn discover_env(&self, prefix: &str) -> BTreeMap<String, String> {
        let (paths, mut opts) = {
            let state = self.state_read();
            (
                state.items.keys().cloned().collect::<Vec<String>>(),
                state.options.clone(),
            )
        };
        opts.env_prefix = prefix.to_string();
        env::discover_env(&paths, &opts).into_iter().collect()
    }

    /// Exports paths whose current value differs from the default as
    /// `env var name -> rendered value` pairs.
    pub fn export_env(&self, prefix: &str) -> BTreeMap<String, String> {
        let state = self.state_read();
        let mut opts = state.options.clone();
        opts.env_prefix = prefix.to_string();

        state
            .items
            .iter()
            .filter(|(_, item)| item.current_value != item.default_value)
            .filter_map(|(item_path, item)| {
                let env_var = opts.env_name(item_path)?;
                Some((env_var, item.current_value.to_string()))
            })
            .collect()
    }
}

/// Recursive prune of a parsed file tree against the registered path
/// set: a registered path absorbs its whole value (scalar, array, or
/// table); unregistered tables recurse; everything else is ignored.
fn collect_registered(
    prefix: &str,
    table: &BTreeMap<String, Value>,
    registered: &std::collections::HashSet<String>,
    out: &mut BTreeMap<String, Value>,
) {
    for (key, value) in table {
        let full_path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        if registered.contains(&full_path) {
            out.insert(full_path, value.clone());
        } else if let Value::Table(nested) = value {
            collect_registered(&full_path, nested, registered, out);
        }
    }
}
