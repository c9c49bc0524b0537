//! File format detection and parsing.
//!
//! Three formats are supported: TOML, JSON, YAML. Detection goes by
//! extension first, then by trial parse in the order JSON -> YAML -> TOML
//! (JSON is the strictest, YAML accepts JSON, TOML last).

use std::collections::BTreeMap;
use std::path::Path;

use crate::domain::errors::ConfigError;
use crate::domain::value::{string_to_timestamp, Value};

/// Expected on-disk format of a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileFormat {
    /// Detect by extension, then by content.
    #[default]
    Auto,
    Toml,
    Json,
    Yaml,
}

impl FileFormat {
    pub fn name(&self) -> &'static str {
        match self {
            FileFormat::Auto => "auto",
            FileFormat::Toml => "toml",
            FileFormat::Json => "json",
            FileFormat::Yaml => "yaml",
        }
    }

    /// Parses a format name (`"toml"`, `"json"`, `"yaml"`, `"auto"`).
    pub fn from_name(name: &str) -> Option<FileFormat> {
        match name {
            "auto" => Some(FileFormat::Auto),
            "toml" => Some(FileFormat::Toml),
            "json" => Some(FileFormat::Json),
            "yaml" => Some(FileFormat::Yaml),
            _ => None,
        }
    }
}

impl std::fmt::Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Determines format from the file extension; `None` for unknown
/// extensions (including `.conf`/`.config`, which fall back to content
/// detection).
pub fn detect_by_extension(path: &Path) -> Option<FileFormat> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "toml" | "tml" => Some(FileFormat::Toml),
        "json" => Some(FileFormat::Json),
        "yaml" | "yml" => Some(FileFormat::Yaml),
        _ => None,
    }
}

/// Parses file contents in the nominated (or detected) format into a
/// nested table.
pub fn parse(
    path: &Path,
    contents: &str,
    format: FileFormat,
) -> Result<BTreeMap<String, Value>, ConfigError> {
    let resolved = match format {
        FileFormat::Auto => match detect_by_extension(path) {
            Some(found) => found,
            None => return parse_by_content(path, contents),
        },
        explicit => explicit,
    };

    match resolved {
        FileFormat::Toml => parse_toml(path, contents),
        FileFormat::Json => parse_json(path, contents),
        FileFormat::Yaml => parse_yaml(path, contents),
        FileFormat::Auto => unreachable!("resolved above"),
    }
}

/// Trial-parses in the order JSON -> YAML -> TOML. A parse only counts
/// when it yields a table at the top level.
fn parse_by_content(path: &Path, contents: &str) -> Result<BTreeMap<String, Value>, ConfigError> {
    if let Ok(table) = parse_json(path, contents) {
        return Ok(table);
    }
    if let Ok(table) = parse_yaml(path, contents) {
        return Ok(table);
    }
    if let Ok(table) = parse_toml(path, contents) {
        return Ok(table);
    }
    Err(ConfigError::UnknownFormat(path.display().to_string()))
}

fn parse_toml(path: &Path, contents: &str) -> Result<BTreeMap<String, Value>, ConfigError> {
    let parsed: toml::Value =
        toml::from_str(contents).map_err(|e| ConfigError::FormatParse {
            path: path.display().to_string(),
            format: "TOML",
            detail: e.to_string(),
        })?;
    match from_toml(parsed) {
        Value::Table(table) => Ok(table),
        other => Err(ConfigError::FormatParse {
            path: path.display().to_string(),
            format: "TOML",
            detail: format!("top-level value is {}, expected a table", other.kind()),
        }),
    }
}

fn parse_json(path: &Path, contents: &str) -> Result<BTreeMap<String, Value>, ConfigError> {
    let parsed: serde_json::Value =
        serde_json::from_str(contents).map_err(|e| ConfigError::FormatParse {
            path: path.display().to_string(),
            format: "JSON",
            detail: e.to_string(),
        })?;
    match from_json(parsed) {
        Value::Table(table) => Ok(table),
        other => Err(ConfigError::FormatParse {
            path: path.display().to_string(),
            format: "JSON",
            detail: format!("top-level value is {}, expected an object", other.kind()),
        }),
    }
}

fn parse_yaml(path: &Path, contents: &str) -> Result<BTreeMap<String, Value>, ConfigError> {
    let parsed: serde_yaml::Value =
        serde_yaml::from_str(contents).map_err(|e| ConfigError::FormatParse {
            path: path.display().to_string(),
            format: "YAML",
            detail: e.to_string(),
        })?;
    match from_yaml(parsed) {
        Value::Table(table) => Ok(table),
        other => Err(ConfigError::FormatParse {
            path: path.display().to_string(),
            format: "YAML",
            detail: format!("top-level value is {}, expected a mapping", other.kind()),
        }),
    }
}

fn from_toml(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::Str(s),
        toml::Value::Integer(i) => Value::Int(i),
        toml::Value::Float(f) => Value::Float(f),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => {
            // TOML datetimes that carry a full timestamp become Time;
            // date-only or time-only forms stay textual.
            let rendered = dt.to_string();
            match string_to_timestamp(&rendered) {
                Ok(t) => Value::Time(t),
                Err(_) => Value::Str(rendered),
            }
        }
        toml::Value::Array(items) => Value::Array(items.into_iter().map(from_toml).collect()),
        toml::Value::Table(entries) => Value::Table(
            entries
                .into_iter()
                .map(|(k, v)| (k, from_toml(v)))
                .collect(),
        ),
    }
}

fn from_json(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Nil,
        serde_json::Value::Bool(b) => Value::Bool(b),
        // Integer-vs-float distinction is preserved.
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(u) = n.as_u64() {
                i64::try_from(u).map(Value::Int).unwrap_or(Value::Float(u as f64))
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::Str(s),
        serde_json::Value::Array(items) => {
            Value::Array(items.into_iter().map(from_json).collect())
        }
        serde_json::Value::Object(entries) => Value::Table(
            entries
                .into_iter()
                .map(|(k, v)| (k, from_json(v)))
                .collect(),
        ),
    }
}

fn from_yaml(value: serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Nil,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_yaml::Value::String(s) => Value::Str(s),
        serde_yaml::Value::Sequence(items) => {
            Value::Array(items.into_iter().map(from_yaml).collect())
        }
        serde_yaml::Value::Mapping(entries) => Value::Table(
            entries
                .into_iter()
                .filter_map(|(k, v)| {
                    let key = match k {
                        serde_yaml::Value::String(s) => s,
                        serde_yaml::Value::Number(n) => n.to_string(),
                        serde_yaml::Value::Bool(b) => b.to_string(),
                        _ => return None,
                    };
                    Some((key, from_yaml(v)))
                })
                .collect(),
        ),
        serde_yaml::Value::Tagged(tagged) => from_yaml(tagged.value),
    }
}

/// Renders a value tree as a TOML document. `Nil` entries are omitted
/// (TOML has no null).
pub fn to_toml_string(table: &BTreeMap<String, Value>) -> Result<String, ConfigError> {
    let toml_value = toml::Value::Table(table_to_toml(table));
    toml::to_string_pretty(&toml_value).map_err(|e| ConfigError::Serialize(e.to_string()))
}

fn table_to_toml(table: &BTreeMap<String, Value>) -> toml::map::Map<String, toml::Value> {
    table
        .iter()
        .filter_map(|(k, v)| to_toml(v).map(|tv| (k.clone(), tv)))
        .collect()
}

fn to_toml(value: &Value) -> Option<toml::Value> {
    match value {
        Value::Nil => None,
        Value::Bool(b) => Some(toml::Value::Boolean(*b)),
        Value::Int(i) => Some(toml::Value::Integer(*i)),
        Value::Float(f) => Some(toml::Value::Float(*f)),
        Value::Array(items) => Some(toml::Value::Array(
            items.iter().filter_map(to_toml).collect(),
        )),
        Value::Table(entries) => Some(toml::Value::Table(table_to_toml(entries))),
        scalar => scalar.coerce_str().ok().map(toml::Value::String),
    }
}
