//! The dedicated string-conversion hooks.
//!
//! Every conversion the crate itself performs (scalar accessors, the
//! decoder's duration/time interception, builder coercions) funnels
//! through these functions, and the decoder guards every string it
//! emits with the same caps, so the limits hold on all decode surfaces.

use std::net::IpAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ipnet::IpNet;
use url::Url;

use crate::domain::errors::ConfigError;

/// Longest textual IPv6 address.
pub const MAX_IP_STR_LEN: usize = 45;
/// Longest textual IPv6 CIDR.
pub const MAX_CIDR_STR_LEN: usize = 49;
/// Cap on URL inputs.
pub const MAX_URL_STR_LEN: usize = 2048;

pub fn string_to_ip(s: &str) -> Result<IpAddr, ConfigError> {
    if s.len() > MAX_IP_STR_LEN {
        return Err(ConfigError::conversion(
            "string",
            "ip",
            format!("invalid IP length: {}", s.len()),
        ));
    }
    s.parse::<IpAddr>()
        .map_err(|_| ConfigError::conversion("string", "ip", format!("invalid IP address: {s}")))
}

pub fn string_to_cidr(s: &str) -> Result<IpNet, ConfigError> {
    if s.len() > MAX_CIDR_STR_LEN {
        return Err(ConfigError::conversion(
            "string",
            "cidr",
            format!("invalid CIDR length: {}", s.len()),
        ));
    }
    s.parse::<IpNet>()
        .map_err(|e| ConfigError::conversion("string", "cidr", format!("invalid CIDR: {e}")))
}

pub fn string_to_url(s: &str) -> Result<Url, ConfigError> {
    if s.len() > MAX_URL_STR_LEN {
        return Err(ConfigError::conversion(
            "string",
            "url",
            format!("URL too long: {} bytes", s.len()),
        ));
    }
    Url::parse(s).map_err(|e| ConfigError::conversion("string", "url", format!("invalid URL: {e}")))
}

/// Parses the compact duration grammar (`"1m30s"`, `"250ms"`, `"2h 15m"`).
pub fn string_to_duration(s: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(s.trim())
        .map_err(|e| ConfigError::conversion("string", "duration", e.to_string()))
}

/// Parses an RFC 3339 timestamp into UTC.
pub fn string_to_timestamp(s: &str) -> Result<DateTime<Utc>, ConfigError> {
    DateTime::parse_from_rfc3339(s.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ConfigError::conversion("string", "time", e.to_string()))
}

/// Pre-parse cap guard for strings flowing out of the decoder.
///
/// serde never reveals the destination type for a plain string, so the
/// guard is shape-conditional instead: an oversize string that matches a
/// hook's input shape is rejected by that hook's cap before any parser
/// sees it, whichever target type asked for it. The shape checks are
/// single byte scans. Hooks apply in order; the first matching one wins.
pub(crate) fn guard_hook_caps(s: &str) -> Result<(), ConfigError> {
    if s.len() > MAX_IP_STR_LEN && is_ip_shaped(s) {
        return Err(ConfigError::conversion(
            "string",
            "ip",
            format!("invalid IP length: {}", s.len()),
        ));
    }
    if s.len() > MAX_CIDR_STR_LEN && is_cidr_shaped(s) {
        return Err(ConfigError::conversion(
            "string",
            "cidr",
            format!("invalid CIDR length: {}", s.len()),
        ));
    }
    if s.len() > MAX_URL_STR_LEN && is_url_shaped(s) {
        return Err(ConfigError::conversion(
            "string",
            "url",
            format!("URL too long: {} bytes", s.len()),
        ));
    }
    Ok(())
}

/// Cap guard for already-typed values being rendered back to text.
/// `Ip`/`Cidr` renderings are within their caps by construction; `Url`
/// is the one typed variant that can exceed its cap.
pub(crate) fn guard_rendered_caps(value: &super::Value, rendered: &str) -> Result<(), ConfigError> {
    use super::Value;
    match value {
        Value::Str(_) => guard_hook_caps(rendered),
        Value::Ip(_) if rendered.len() > MAX_IP_STR_LEN => Err(ConfigError::conversion(
            "ip",
            "string",
            format!("invalid IP length: {}", rendered.len()),
        )),
        Value::Cidr(_) if rendered.len() > MAX_CIDR_STR_LEN => Err(ConfigError::conversion(
            "cidr",
            "string",
            format!("invalid CIDR length: {}", rendered.len()),
        )),
        Value::Url(_) if rendered.len() > MAX_URL_STR_LEN => Err(ConfigError::conversion(
            "url",
            "string",
            format!("URL too long: {} bytes", rendered.len()),
        )),
        _ => Ok(()),
    }
}

/// Hex digits, dots, and colons only: the alphabet of a textual IP.
fn is_ip_shaped(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_hexdigit() || b == b':' || b == b'.')
}

/// An IP-shaped address followed by `/` and a numeric prefix length.
fn is_cidr_shaped(s: &str) -> bool {
    matches!(
        s.split_once('/'),
        Some((addr, prefix))
            if is_ip_shaped(addr)
                && !prefix.is_empty()
                && prefix.bytes().all(|b| b.is_ascii_digit())
    )
}

/// An RFC 3986 scheme followed by `://`.
fn is_url_shaped(s: &str) -> bool {
    let Some(idx) = s.find("://") else {
        return false;
    };
    let scheme = &s[..idx];
    let mut chars = scheme.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Integer parsing with `0x`/`0o`/`0b` literal support and a float
/// truncation fallback.
pub(crate) fn parse_int_weak(s: &str) -> Option<i64> {
    let trimmed = s.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let parsed = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(oct) = digits.strip_prefix("0o").or_else(|| digits.strip_prefix("0O")) {
        i64::from_str_radix(oct, 8).ok()
    } else if let Some(bin) = digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2).ok()
    } else {
        digits.parse::<i64>().ok()
    };

    if let Some(v) = parsed {
        return Some(if negative { -v } else { v });
    }

    // Fall back to float truncation so "2.5" reads as 2.
    trimmed.parse::<f64>().ok().map(|f| f as i64)
}

/// The accepted boolean spellings.
pub(crate) fn parse_bool_str(s: &str) -> Option<bool> {
    match s.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}
