//! Environment variable source.

use crate::domain::errors::ConfigError;
use crate::domain::options::{LoadOptions, MAX_VALUE_SIZE};
use crate::domain::value::Value;

/// Scans the process environment for every registered path and returns
/// the raw string submissions. Values are stored as strings; the decoder
/// performs final type conversion.
pub(crate) fn collect_env(
    paths: &[String],
    opts: &LoadOptions,
) -> Result<Vec<(String, String)>, ConfigError> {
    let mut found = Vec::new();

    for path in paths {
        if let Some(whitelist) = &opts.env_whitelist {
            if !whitelist.contains(path) {
                continue;
            }
        }

        let Some(env_var) = opts.env_name(path) else {
            continue;
        };

        if let Ok(value) = std::env::var(&env_var) {
            if value.len() > MAX_VALUE_SIZE {
                return Err(ConfigError::OversizeValue {
                    limit: MAX_VALUE_SIZE,
                });
            }
            found.push((path.clone(), value));
        }
    }

    Ok(found)
}

/// Maps each registered path to the environment variable name that is
/// currently set for it.
pub(crate) fn discover_env(paths: &[String], opts: &LoadOptions) -> Vec<(String, String)> {
    paths
        .iter()
        .filter_map(|path| {
            let env_var = opts.env_name(path)?;
            std::env::var(&env_var).ok().map(|_| (path.clone(), env_var))
        })
        .collect()
}

/// Basic scalar parse for values read at registration time: booleans
/// become booleans, surrounding quotes strip, everything else stays a
/// string for the decoder to convert.
pub(crate) fn parse_scalar(s: &str) -> Value {
    match s {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        return Value::Str(s[1..s.len() - 1].to_string());
    }

    Value::Str(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::source::default_precedence;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn opts_with_prefix(prefix: &str) -> LoadOptions {
        LoadOptions {
            sources: default_precedence(),
            env_prefix: prefix.to_string(),
            ..LoadOptions::default()
        }
    }

    #[test]
    fn collects_only_set_variables() {
        std::env::set_var("STRATA_ENVTEST_SERVER_PORT", "9001");
        std::env::remove_var("STRATA_ENVTEST_SERVER_HOST");

        let paths = vec!["server.port".to_string(), "server.host".to_string()];
        let found = collect_env(&paths, &opts_with_prefix("STRATA_ENVTEST_")).unwrap();
        assert_eq!(
            found,
            vec![("server.port".to_string(), "9001".to_string())]
        );

        std::env::remove_var("STRATA_ENVTEST_SERVER_PORT");
    }

    #[test]
    fn whitelist_restricts_lookups() {
        std::env::set_var("STRATA_WLTEST_A", "1");
        std::env::set_var("STRATA_WLTEST_B", "2");

        let mut opts = opts_with_prefix("STRATA_WLTEST_");
        opts.env_whitelist = Some(HashSet::from(["a".to_string()]));

        let paths = vec!["a".to_string(), "b".to_string()];
        let found = collect_env(&paths, &opts).unwrap();
        assert_eq!(found, vec![("a".to_string(), "1".to_string())]);

        std::env::remove_var("STRATA_WLTEST_A");
        std::env::remove_var("STRATA_WLTEST_B");
    }

    #[test]
    fn transform_skip_is_honored() {
        std::env::set_var("STRATA_SKIPTEST_VISIBLE", "yes");
        std::env::set_var("STRATA_SKIPTEST_HIDDEN", "no");

        let mut opts = LoadOptions::default();
        opts.env_transform = Some(Arc::new(|path| {
            if path == "hidden" {
                None
            } else {
                Some(format!("STRATA_SKIPTEST_{}", path.to_uppercase()))
            }
        }));

        let paths = vec!["visible".to_string(), "hidden".to_string()];
        let found = collect_env(&paths, &opts).unwrap();
        assert_eq!(found, vec![("visible".to_string(), "yes".to_string())]);

        std::env::remove_var("STRATA_SKIPTEST_VISIBLE");
        std::env::remove_var("STRATA_SKIPTEST_HIDDEN");
    }

    #[test]
    fn scalar_parse_rules() {
        assert_eq!(parse_scalar("true"), Value::Bool(true));
        assert_eq!(parse_scalar("false"), Value::Bool(false));
        assert_eq!(parse_scalar("\"quoted\""), Value::Str("quoted".into()));
        assert_eq!(parse_scalar("8080"), Value::Str("8080".into()));
    }
}
