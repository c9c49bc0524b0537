//! Dot-separated path grammar.
//!
//! A path addresses one configuration value: `server.port`,
//! `log.rotation.max_age`. Segments follow the bare-key grammar
//! `[A-Za-z_][A-Za-z0-9_-]*`.

use crate::domain::errors::ConfigError;

/// Checks a single path segment against the bare-key grammar: the first
/// character must be an ASCII letter or underscore, the rest ASCII
/// letters, digits, underscores, or dashes.
pub fn is_valid_segment(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Validates a full dot-separated path. Empty paths, empty segments
/// (leading, trailing, or doubled dots), and malformed segments are
/// rejected.
pub fn validate(path: &str) -> Result<(), ConfigError> {
    if path.is_empty() {
        return Err(ConfigError::EmptyPath);
    }
    for segment in path.split('.') {
        if !is_valid_segment(segment) {
            return Err(ConfigError::InvalidPath {
                segment: segment.to_string(),
                path: path.to_string(),
            });
        }
    }
    Ok(())
}

/// True when `candidate` equals `prefix` or lives underneath it
/// (`prefix` + `.`).
pub fn is_descendant(candidate: &str, prefix: &str) -> bool {
    candidate == prefix
        || (candidate.len() > prefix.len()
            && candidate.starts_with(prefix)
            && candidate.as_bytes()[prefix.len()] == b'.')
}

/// Joins a prefix and a key, tolerating a prefix with or without a
/// trailing dot. An empty prefix yields the key unchanged.
pub fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else if prefix.ends_with('.') {
        format!("{prefix}{key}")
    } else {
        format!("{prefix}.{key}")
    }
}
