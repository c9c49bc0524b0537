//! One-call constructors for the common assembly shapes.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::errors::ConfigError;
use crate::domain::options::LoadOptions;
use crate::services::builder::Builder;
use crate::services::registry::Config;

/// Creates a fully configured instance with standard precedence
/// (CLI > env > file > defaults) and the process arguments. The
/// recommended initialization for most applications.
pub fn quick<T: Serialize>(
    defaults: &T,
    env_prefix: &str,
    config_file: Option<&Path>,
) -> Result<Config, ConfigError> {
    let mut builder = Builder::new()
        .with_defaults(defaults)
        .with_env_prefix(env_prefix);
    if let Some(path) = config_file {
        builder = builder.with_file(path);
    }
    builder.build()
}

/// Like [`quick`] with custom load options.
pub fn quick_custom<T: Serialize>(
    defaults: &T,
    opts: LoadOptions,
    config_file: Option<&Path>,
) -> Result<Config, ConfigError> {
    let config = Config::with_options(opts.clone());
    config.register_struct("", defaults)?;
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = config.load_with_options(config_file, &args, opts) {
        if e.is_file_not_found() {
            tracing::warn!(error = %e, "configuration file missing, continuing");
        } else {
            return Err(e);
        }
    }
    Ok(config)
}

/// Like [`quick`] but panics on error.
pub fn must_quick<T: Serialize>(defaults: &T, env_prefix: &str, config_file: Option<&Path>) -> Config {
    match quick(defaults, env_prefix, config_file) {
        Ok(config) => config,
        Err(e) => panic!("config initialization failed: {e}"),
    }
}

/// Creates a type-aware instance: the target's current state supplies
/// the defaults and [`Config::as_struct`] returns the repopulated type.
pub fn quick_typed<T>(
    target: &T,
    env_prefix: &str,
    config_file: Option<&Path>,
) -> Result<Config, ConfigError>
where
    T: Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static,
{
    let mut builder = Builder::new()
        .with_target(target)
        .with_env_prefix(env_prefix);
    if let Some(path) = config_file {
        builder = builder.with_file(path);
    }
    builder.build()
}
