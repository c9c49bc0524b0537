//! Thread-safe, layered configuration management for server
//! applications.
//!
//! Values are drawn from four sources (registered defaults, a
//! configuration file in TOML/JSON/YAML, environment variables, and
//! command-line arguments), merged under a configurable precedence,
//! decoded into typed structs on demand, and re-merged when the file
//! changes on disk.
//!
//! Features:
//! - Multiple configuration sources with customizable precedence
//! - Weakly-typed conversions (strings parse, numbers widen, lists
//!   split on commas) plus IP/CIDR/URL/duration/timestamp hooks
//! - Struct registration and decoding driven entirely by serde
//! - Environment variable auto-discovery and mapping
//! - Builder with raw and typed validators, file discovery included
//! - Source tracking to see where each value originated
//! - Polling file watcher with debounced reload and change events
//!
//! Quick start:
//!
//! ```no_run
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Default, Serialize, Deserialize)]
//! #[serde(default)]
//! struct Server {
//!     host: String,
//!     port: u16,
//! }
//!
//! # fn main() -> Result<(), strata::ConfigError> {
//! let defaults = Server { host: "localhost".into(), port: 8080 };
//! let cfg = strata::quick(&defaults, "MYAPP_", Some("config.toml".as_ref()))?;
//!
//! let host = cfg.get_string("host")?;
//! let port = cfg.get_i64("port")?;
//! # let _ = (host, port);
//! # Ok(())
//! # }
//! ```
//!
//! Default precedence, highest to lowest: command-line arguments
//! (`--port=9090`), environment variables (`MYAPP_PORT=9090`), the
//! configuration file, registered defaults. Swap the order with
//! [`Config::set_precedence`] or [`Builder::with_sources`].
//!
//! All operations are thread-safe: a read-write lock guards the
//! registry, so concurrent reads proceed in parallel while writes are
//! exclusive. Nothing holds the lock across I/O or user callbacks.

pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::ConfigError;
pub use domain::options::{
    FileDiscoveryOptions, LoadOptions, SecurityOptions, WatchOptions,
};
pub use domain::source::Source;
pub use domain::value::Value;
pub use infrastructure::format::FileFormat;
pub use services::builder::Builder;
pub use services::convenience::{must_quick, quick, quick_custom, quick_typed};
pub use services::registry::Config;
