//! Configuration sources and precedence.

use serde::{Deserialize, Serialize};

/// The logical origin of a configuration value.
///
/// The set is closed; precedence among sources is determined solely by
/// the active precedence list in [`LoadOptions`](crate::LoadOptions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Registered default values.
    Default,
    /// Values loaded from a configuration file.
    File,
    /// Values loaded from environment variables.
    Env,
    /// Values loaded from command-line arguments.
    Cli,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::File => write!(f, "file"),
            Self::Env => write!(f, "env"),
            Self::Cli => write!(f, "cli"),
        }
    }
}

/// Standard precedence: CLI over env over file over defaults.
pub fn default_precedence() -> Vec<Source> {
    vec![Source::Cli, Source::Env, Source::File, Source::Default]
}

/// Normalizes a caller-supplied precedence list: duplicates collapse to
/// their first occurrence, and `Default` is appended when absent so every
/// lookup has a floor.
pub fn normalize_precedence(sources: &[Source]) -> Vec<Source> {
    let mut out = Vec::with_capacity(sources.len() + 1);
    for s in sources {
        if !out.contains(s) {
            out.push(*s);
        }
    }
    if !out.contains(&Source::Default) {
        out.push(Source::Default);
    }
    out
}
