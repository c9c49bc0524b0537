//! Domain layer: paths, sources, values, options, and the error taxonomy.

pub mod errors;
pub mod options;
pub mod path;
pub mod source;
pub mod tree;
pub mod value;

pub use errors::ConfigError;
pub use source::Source;
pub use value::Value;
