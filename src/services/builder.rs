//! Fluent assembly of a configured instance.
//!
//! Every option is set by an independent chainable call; errors are
//! accumulated and surfaced at [`Builder::build`]. Two validator kinds
//! are distinguished: raw validators see the loaded registry, typed
//! validators see the decoded target struct.

use std::any::{Any, TypeId};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::domain::errors::ConfigError;
use crate::domain::options::{LoadOptions, SecurityOptions};
use crate::domain::source::Source;
use crate::domain::tree;
use crate::domain::value::{self, Value};
use crate::infrastructure::format::FileFormat;
use crate::services::registry::Config;

type RawValidator = Box<dyn Fn(&Config) -> Result<(), String> + Send + Sync>;
type TargetDecoder =
    Box<dyn Fn(&Config) -> Result<Box<dyn Any + Send + Sync>, ConfigError> + Send + Sync>;

struct TypedValidator {
    expects: TypeId,
    run: Box<dyn Fn(&dyn Any) -> Result<(), String> + Send + Sync>,
}

/// Deferred, chainable construction of a [`Config`].
pub struct Builder {
    opts: LoadOptions,
    defaults: Option<Value>,
    target_defaults: Option<Value>,
    target_type: Option<TypeId>,
    target_decoder: Option<TargetDecoder>,
    prefix: String,
    pub(crate) file: Option<PathBuf>,
    file_format: FileFormat,
    security: Option<SecurityOptions>,
    pub(crate) args: Vec<String>,
    pub(crate) err: Option<ConfigError>,
    validators: Vec<RawValidator>,
    typed_validators: Vec<TypedValidator>,
}

impl Builder {
    /// Starts a builder with default options and the process arguments.
    pub fn new() -> Self {
        Self {
            opts: LoadOptions::default(),
            defaults: None,
            target_defaults: None,
            target_type: None,
            target_decoder: None,
            prefix: String::new(),
            file: None,
            file_format: FileFormat::Auto,
            security: None,
            args: std::env::args().skip(1).collect(),
            err: None,
            validators: Vec::new(),
            typed_validators: Vec::new(),
        }
    }

    /// Registers defaults from a struct. Takes priority over the target
    /// struct's state when both are supplied.
    pub fn with_defaults<T: Serialize>(mut self, defaults: &T) -> Self {
        match value::to_value(defaults) {
            Ok(tree) => self.defaults = Some(tree),
            Err(e) => self.record_err(e),
        }
        self
    }

    /// Enables type-aware mode: remembers the target type for
    /// [`Config::as_struct`] and, unless [`with_defaults`] is also
    /// called, uses the target's current state as the default source.
    ///
    /// [`with_defaults`]: Builder::with_defaults
    pub fn with_target<T>(mut self, target: &T) -> Self
    where
        T: Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static,
    {
        match value::to_value(target) {
            Ok(tree) => {
                self.target_defaults = Some(tree);
                self.target_type = Some(TypeId::of::<T>());
                self.target_decoder = Some(Box::new(|cfg| {
                    cfg.as_struct::<T>()
                        .map(|decoded| Box::new(decoded) as Box<dyn Any + Send + Sync>)
                }));
            }
            Err(e) => self.record_err(e),
        }
        self
    }

    /// Sets the configuration file path.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Sets the expected file format (`Auto` sniffs extension and
    /// content).
    pub fn with_file_format(mut self, format: FileFormat) -> Self {
        self.file_format = format;
        self
    }

    /// Sets security options for file loading.
    pub fn with_security_options(mut self, security: SecurityOptions) -> Self {
        self.security = Some(security);
        self
    }

    /// Sets the registration prefix applied to defaults.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.opts.env_prefix = prefix.into();
        self
    }

    /// Replaces the command-line arguments (defaults to the process
    /// arguments).
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the precedence order for configuration sources.
    pub fn with_sources(mut self, sources: &[Source]) -> Self {
        self.opts.sources = sources.to_vec();
        self
    }

    /// Sets a custom path-to-env-name transform. Returning `None` (or an
    /// empty name) skips the path.
    pub fn with_env_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.opts.env_transform = Some(Arc::new(transform));
        self
    }

    /// Restricts environment lookups to the listed paths.
    pub fn with_env_whitelist<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let whitelist = self
            .opts
            .env_whitelist
            .get_or_insert_with(HashSet::new);
        for path in paths {
            whitelist.insert(path.into());
        }
        self
    }

    /// Adds a validation function run after all sources are loaded.
    /// Validators run in registration order; the first failure aborts
    /// the build.
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Config) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validators.push(Box::new(validator));
        self
    }

    /// Adds a type-safe validator run against the decoded target after
    /// load. The validator's argument type must match the
    /// [`with_target`](Builder::with_target) type; a mismatch is caught
    /// here, at registration.
    pub fn with_typed_validator<T, F>(mut self, validator: F) -> Self
    where
        T: 'static,
        F: Fn(&T) -> Result<(), String> + Send + Sync + 'static,
    {
        if let Some(expected) = self.target_type {
            if expected != TypeId::of::<T>() {
                self.record_err(ConfigError::TargetTypeMismatch);
                return self;
            }
        }

        self.typed_validators.push(TypedValidator {
            expects: TypeId::of::<T>(),
            run: Box::new(move |any| match any.downcast_ref::<T>() {
                Some(target) => validator(target),
                None => Err("validator target type mismatch".to_string()),
            }),
        });
        self
    }

    pub(crate) fn record_err(&mut self, err: ConfigError) {
        if self.err.is_none() {
            self.err = Some(err);
        }
    }

    /// Builds the instance: registers defaults, loads every configured
    /// source, then runs raw and typed validators. A missing
    /// configuration file is non-fatal and logged; every other load
    /// error aborts.
    pub fn build(self) -> Result<Config, ConfigError> {
        if let Some(err) = self.err {
            return Err(err);
        }

        let config = Config::with_options(self.opts.clone());
        config.set_file_format(self.file_format);
        if let Some(security) = self.security {
            config.set_security_options(security);
        }

        // Explicit defaults win over the target's current state.
        let defaults = self.defaults.or(self.target_defaults);
        if let Some(tree) = defaults {
            let Value::Table(table) = tree else {
                return Err(ConfigError::Serialize(format!(
                    "defaults must serialize to a table, got {}",
                    tree.kind()
                )));
            };
            let prefix = self.prefix.strip_suffix('.').unwrap_or(&self.prefix);
            for (leaf_path, default) in tree::flatten(&table, prefix) {
                config.register(&leaf_path, default)?;
            }
        }

        // Track the file even when the initial load fails non-fatally so
        // the watcher can pick it up once the file appears.
        if let Some(file) = &self.file {
            config.state_write().file_path = Some(file.clone());
        }

        if let Err(e) =
            config.load_with_options(self.file.as_deref(), &self.args, self.opts.clone())
        {
            if e.is_file_not_found() {
                warn!(error = %e, "configuration file missing, continuing with remaining sources");
            } else {
                return Err(e);
            }
        }

        for validator in &self.validators {
            validator(&config).map_err(ConfigError::Validation)?;
        }

        if !self.typed_validators.is_empty() {
            let decoder = self.target_decoder.as_ref().ok_or(ConfigError::NoTarget)?;
            let decoded = decoder(&config)?;
            for typed in &self.typed_validators {
                if Some(typed.expects) != self.target_type {
                    return Err(ConfigError::TargetTypeMismatch);
                }
                (typed.run)(decoded.as_ref()).map_err(ConfigError::TypedValidator)?;
            }
        }

        Ok(config)
    }

    /// Like [`build`](Builder::build) but panics on error.
    pub fn must_build(self) -> Config {
        match self.build() {
            Ok(config) => config,
            Err(e) => panic!("config build failed: {e}"),
        }
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
    #[serde(default)]
    struct AppSettings {
        port: i64,
        name: String,
    }

    #[test]
    fn target_supplies_defaults() {
        let settings = AppSettings {
            port: 8080,
            name: "demo".into(),
        };

        let cfg = Builder::new()
            .with_target(&settings)
            .with_args(Vec::<String>::new())
            .build()
            .unwrap();

        assert_eq!(cfg.get("port"), Some(Value::Int(8080)));
        assert_eq!(cfg.get("name"), Some(Value::Str("demo".into())));
    }

    #[test]
    fn explicit_defaults_win_over_target() {
        #[derive(Serialize)]
        struct Overrides {
            port: i64,
        }

        let cfg = Builder::new()
            .with_target(&AppSettings {
                port: 1,
                name: "target".into(),
            })
            .with_defaults(&Overrides { port: 9999 })
            .with_args(Vec::<String>::new())
            .build()
            .unwrap();

        assert_eq!(cfg.get("port"), Some(Value::Int(9999)));
        // Target-only fields are absent when explicit defaults win.
        assert_eq!(cfg.get("name"), None);
    }

    #[test]
    fn raw_validator_failure_aborts() {
        let err = Builder::new()
            .with_defaults(&AppSettings::default())
            .with_args(Vec::<String>::new())
            .with_validator(|cfg| {
                let port = cfg.get_i64("port").map_err(|e| e.to_string())?;
                if port == 0 {
                    Err("port must be set".into())
                } else {
                    Ok(())
                }
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn typed_validator_sees_decoded_target() {
        let settings = AppSettings {
            port: 8080,
            name: "demo".into(),
        };

        let err = Builder::new()
            .with_target(&settings)
            .with_args(vec!["--port=80".to_string()])
            .with_typed_validator(|decoded: &AppSettings| {
                if decoded.port < 1024 {
                    Err(format!("privileged port {} rejected", decoded.port))
                } else {
                    Ok(())
                }
            })
            .build()
            .unwrap_err();

        match err {
            ConfigError::TypedValidator(msg) => assert!(msg.contains("80")),
            other => panic!("expected typed validator failure, got {other}"),
        }
    }

    #[test]
    fn typed_validator_without_target_errors() {
        let err = Builder::new()
            .with_args(Vec::<String>::new())
            .with_typed_validator(|_: &AppSettings| Ok(()))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::NoTarget));
    }

    #[test]
    fn typed_validator_type_mismatch_caught_at_registration() {
        #[derive(Debug)]
        struct Other;

        let err = Builder::new()
            .with_target(&AppSettings::default())
            .with_args(Vec::<String>::new())
            .with_typed_validator(|_: &Other| Ok(()))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::TargetTypeMismatch));
    }

    #[test]
    fn missing_file_is_non_fatal() {
        let cfg = Builder::new()
            .with_defaults(&AppSettings {
                port: 4000,
                name: "x".into(),
            })
            .with_file("/no/such/place/app.toml")
            .with_args(Vec::<String>::new())
            .build()
            .unwrap();
        assert_eq!(cfg.get_i64("port").unwrap(), 4000);
    }
}
