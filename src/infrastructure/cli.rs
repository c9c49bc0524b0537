//! Command-line argument source.
//!
//! A deliberately small grammar: `--key=value`, `--key value`, and bare
//! `--flag` (implicit `"true"`). Values are kept as raw strings; the
//! decoder performs final type conversion.

use std::collections::BTreeMap;

use crate::domain::errors::ConfigError;
use crate::domain::path;
use crate::domain::tree;
use crate::domain::value::Value;

/// Scans `args` left-to-right into a flat `path -> raw string` map.
///
/// Tokens not starting with `--` are ignored; a lone `--` ends option
/// processing; an invalid key path aborts with [`ConfigError::CliParse`].
pub(crate) fn parse_args(args: &[String]) -> Result<BTreeMap<String, Value>, ConfigError> {
    let mut nested = BTreeMap::new();
    let mut i = 0;

    while i < args.len() {
        let arg = &args[i];
        let Some(content) = arg.strip_prefix("--") else {
            i += 1;
            continue;
        };

        if content.is_empty() {
            // Bare "--" ends option processing.
            break;
        }

        let (key_path, value) = if let Some((key, value)) = content.split_once('=') {
            i += 1;
            (key, value.to_string())
        } else if i + 1 >= args.len() || args[i + 1].starts_with("--") {
            // Boolean flag with no value token.
            i += 1;
            (content, "true".to_string())
        } else {
            let value = args[i + 1].clone();
            i += 2;
            (content, value)
        };

        if key_path.is_empty() {
            // "--=value" carries no key.
            continue;
        }

        for segment in key_path.split('.') {
            if !path::is_valid_segment(segment) {
                return Err(ConfigError::CliParse {
                    token: arg.clone(),
                    reason: format!("invalid key segment {segment:?} in path {key_path:?}"),
                });
            }
        }

        tree::set_nested(&mut nested, key_path, Value::Str(value));
    }

    Ok(tree::flatten(&nested, ""))
}
