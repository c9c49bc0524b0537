//! Error taxonomy for configuration loading, decoding, and watching.

use std::fmt::Display;

use thiserror::Error;

use crate::domain::source::Source;

/// Errors produced by the configuration manager.
///
/// Watcher-side failures (reload timeout, permission drift, file deletion)
/// are deliberately absent: they are surfaced to subscribers as change
/// events, never as return values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("registration path cannot be empty")]
    EmptyPath,

    #[error("invalid path segment {segment:?} in path {path:?}")]
    InvalidPath { segment: String, path: String },

    #[error("path not registered: {0}")]
    NotRegistered(String),

    #[error("value size exceeds maximum {limit} bytes")]
    OversizeValue { limit: usize },

    #[error("path {path:?} refers to a non-map value ({found})")]
    NonMapAtPath { path: String, found: &'static str },

    #[error("cannot convert {from} to {to}: {reason}")]
    Conversion {
        from: String,
        to: String,
        reason: String,
    },

    /// Catch-all for messages raised inside the serde decode pipeline.
    #[error("decode failed: {0}")]
    Decode(String),

    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    #[error("failed to parse {format} config file {path:?}: {detail}")]
    FormatParse {
        path: String,
        format: &'static str,
        detail: String,
    },

    #[error("unable to determine config format for file {0:?}")]
    UnknownFormat(String),

    #[error("failed to parse command-line arguments: invalid token {token:?}: {reason}")]
    CliParse { token: String, reason: String },

    #[error("potential path traversal detected in config path: {0}")]
    PathTraversal(String),

    #[error("config file {path:?} exceeds maximum size {limit} bytes (size {size})")]
    FileTooLarge { path: String, size: u64, limit: u64 },

    #[error("config file {path:?} is not owned by current user (file UID: {file_uid}, process UID: {process_uid})")]
    OwnershipMismatch {
        path: String,
        file_uid: u32,
        process_uid: u32,
    },

    #[error("the {0} source is only written at registration")]
    SourceReadOnly(Source),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to serialize configuration: {0}")]
    Serialize(String),

    #[error("configuration validation failed: {0}")]
    Validation(String),

    #[error("typed configuration validation failed: {0}")]
    TypedValidator(String),

    #[error("no target struct configured")]
    NoTarget,

    #[error("typed validator signature does not match the configured target type")]
    TargetTypeMismatch,

    /// Several non-fatal errors joined from one load pass.
    #[error("{}", join_errors(.0))]
    Multiple(Vec<ConfigError>),
}

impl ConfigError {
    pub(crate) fn conversion(
        from: impl Into<String>,
        to: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ConfigError::Conversion {
            from: from.into(),
            to: to.into(),
            reason: reason.into(),
        }
    }

    /// True when the error is, or contains, a missing-file condition.
    /// Missing files are non-fatal during builds and multi-source loads.
    pub fn is_file_not_found(&self) -> bool {
        match self {
            ConfigError::FileNotFound(_) => true,
            ConfigError::Multiple(errs) => errs.iter().any(ConfigError::is_file_not_found),
            _ => false,
        }
    }

    /// Collapse a list of accumulated errors into a single return value.
    pub(crate) fn join(mut errors: Vec<ConfigError>) -> Result<(), ConfigError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::Multiple(errors)),
        }
    }
}

fn join_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl serde::de::Error for ConfigError {
    fn custom<T: Display>(msg: T) -> Self {
        ConfigError::Decode(msg.to_string())
    }
}

impl serde::ser::Error for ConfigError {
    fn custom<T: Display>(msg: T) -> Self {
        ConfigError::Serialize(msg.to_string())
    }
}
