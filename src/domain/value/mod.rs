//! The heterogeneous configuration value.
//!
//! Per-source entries, defaults, and computed current values are all
//! [`Value`]s: a tagged variant over the supported conversion matrix
//! rather than a type-erased any. The weak conversions mirror what the
//! decoder accepts, so a value read through a scalar accessor and a value
//! decoded into a struct field agree.

mod convert;
pub(crate) mod de;
pub(crate) mod ser;

pub use convert::{
    string_to_cidr, string_to_duration, string_to_ip, string_to_timestamp, string_to_url,
    MAX_CIDR_STR_LEN, MAX_IP_STR_LEN, MAX_URL_STR_LEN,
};
pub use ser::to_value;

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use ipnet::IpNet;
use url::Url;

use crate::domain::errors::ConfigError;

/// A configuration value from any source.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absence of an opinion. A source holding `Nil` is skipped by the
    /// merge engine.
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Duration(Duration),
    Time(DateTime<Utc>),
    Ip(IpAddr),
    Cidr(IpNet),
    Url(Url),
    Array(Vec<Value>),
    Table(BTreeMap<String, Value>),
}

impl Value {
    /// Short type name used in diagnostics and conversion errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Duration(_) => "duration",
            Value::Time(_) => "time",
            Value::Ip(_) => "ip",
            Value::Cidr(_) => "cidr",
            Value::Url(_) => "url",
            Value::Array(_) => "array",
            Value::Table(_) => "table",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_table_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    /// String conversion, accepting the scalar kinds. `Nil` reads as the
    /// empty string for convenience; arrays and tables are refused.
    pub fn coerce_str(&self) -> Result<String, ConfigError> {
        match self {
            Value::Nil => Ok(String::new()),
            Value::Str(s) => Ok(s.clone()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Int(i) => Ok(i.to_string()),
            Value::Float(f) => Ok(f.to_string()),
            Value::Duration(d) => Ok(humantime::format_duration(*d).to_string()),
            Value::Time(t) => Ok(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Ip(ip) => Ok(ip.to_string()),
            Value::Cidr(net) => Ok(net.to_string()),
            Value::Url(url) => Ok(url.to_string()),
            other => Err(ConfigError::conversion(
                other.kind(),
                "string",
                "not a scalar",
            )),
        }
    }

    /// Integer conversion: numbers truncate, strings parse (with `0x`,
    /// `0o`, `0b` literal support, falling back to float truncation),
    /// booleans map to 0/1.
    pub fn coerce_i64(&self) -> Result<i64, ConfigError> {
        match self {
            Value::Int(i) => Ok(*i),
            Value::Float(f) => Ok(*f as i64),
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::Str(s) => convert::parse_int_weak(s)
                .ok_or_else(|| ConfigError::conversion("string", "int", format!("{s:?}"))),
            other => Err(ConfigError::conversion(other.kind(), "int", "unsupported")),
        }
    }

    /// Float conversion from numbers, parsable strings, and booleans.
    pub fn coerce_f64(&self) -> Result<f64, ConfigError> {
        match self {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Str(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|e| ConfigError::conversion("string", "float", e.to_string())),
            other => Err(ConfigError::conversion(other.kind(), "float", "unsupported")),
        }
    }

    /// Boolean conversion: numbers read zero/non-zero, strings accept
    /// the usual spellings (`1`, `t`, `true`, `0`, `f`, `false`, ...).
    pub fn coerce_bool(&self) -> Result<bool, ConfigError> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Int(i) => Ok(*i != 0),
            Value::Float(f) => Ok(*f != 0.0),
            Value::Str(s) => convert::parse_bool_str(s)
                .ok_or_else(|| ConfigError::conversion("string", "bool", format!("{s:?}"))),
            other => Err(ConfigError::conversion(other.kind(), "bool", "unsupported")),
        }
    }

    /// Duration conversion: native durations pass through, strings go
    /// through the duration grammar, integers read as whole seconds.
    pub fn coerce_duration(&self) -> Result<Duration, ConfigError> {
        match self {
            Value::Duration(d) => Ok(*d),
            Value::Str(s) => string_to_duration(s),
            Value::Int(i) if *i >= 0 => Ok(Duration::from_secs(*i as u64)),
            Value::Float(f) if *f >= 0.0 => Ok(Duration::from_secs_f64(*f)),
            other => Err(ConfigError::conversion(
                other.kind(),
                "duration",
                "unsupported",
            )),
        }
    }

    /// RFC 3339 timestamp conversion.
    pub fn coerce_timestamp(&self) -> Result<DateTime<Utc>, ConfigError> {
        match self {
            Value::Time(t) => Ok(*t),
            Value::Str(s) => string_to_timestamp(s),
            other => Err(ConfigError::conversion(other.kind(), "time", "unsupported")),
        }
    }

    /// IP address conversion, applying the hook's length cap on strings.
    pub fn coerce_ip(&self) -> Result<IpAddr, ConfigError> {
        match self {
            Value::Ip(ip) => Ok(*ip),
            Value::Str(s) => string_to_ip(s),
            other => Err(ConfigError::conversion(other.kind(), "ip", "unsupported")),
        }
    }

    /// CIDR network conversion, applying the hook's length cap on strings.
    pub fn coerce_cidr(&self) -> Result<IpNet, ConfigError> {
        match self {
            Value::Cidr(net) => Ok(*net),
            Value::Str(s) => string_to_cidr(s),
            other => Err(ConfigError::conversion(other.kind(), "cidr", "unsupported")),
        }
    }

    /// URL conversion, applying the hook's length cap on strings.
    pub fn coerce_url(&self) -> Result<Url, ConfigError> {
        match self {
            Value::Url(u) => Ok(u.clone()),
            Value::Str(s) => string_to_url(s),
            other => Err(ConfigError::conversion(other.kind(), "url", "unsupported")),
        }
    }

    /// Byte length of the serialized form, used to enforce the value
    /// size cap at the source boundary. Only strings can realistically
    /// blow the cap; everything else reports a small fixed cost.
    pub(crate) fn approximate_size(&self) -> usize {
        match self {
            Value::Str(s) => s.len(),
            Value::Array(items) => items.iter().map(Value::approximate_size).sum(),
            Value::Table(entries) => entries
                .iter()
                .map(|(k, v)| k.len() + v.approximate_size())
                .sum(),
            _ => std::mem::size_of::<Value>(),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Table(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k} = {v}")?;
                }
                write!(f, "}}")
            }
            scalar => match scalar.coerce_str() {
                Ok(s) => write!(f, "{s}"),
                Err(_) => write!(f, "<{}>", scalar.kind()),
            },
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Duration> for Value {
    fn from(v: Duration) -> Self {
        Value::Duration(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Time(v)
    }
}

impl From<IpAddr> for Value {
    fn from(v: IpAddr) -> Self {
        Value::Ip(v)
    }
}

impl From<IpNet> for Value {
    fn from(v: IpNet) -> Self {
        Value::Cidr(v)
    }
}

impl From<Url> for Value {
    fn from(v: Url) -> Self {
        Value::Url(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Table(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Nil, Into::into)
    }
}
