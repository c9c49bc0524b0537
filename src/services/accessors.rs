//! Weakly-typed scalar accessors.
//!
//! Convenience reads for callers using the registry as a dynamic
//! key-value store. The conversions are the same ones the decoder
//! applies, including the capped network/URL/duration/timestamp hooks.

use std::net::IpAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ipnet::IpNet;
use url::Url;

use crate::domain::errors::ConfigError;
use crate::domain::value::Value;
use crate::services::registry::Config;

impl Config {
    fn current(&self, config_path: &str) -> Result<Value, ConfigError> {
        self.get(config_path)
            .ok_or_else(|| ConfigError::NotRegistered(config_path.to_string()))
    }

    /// String read with conversion from the other scalar kinds.
    pub fn get_string(&self, config_path: &str) -> Result<String, ConfigError> {
        self.current(config_path)?.coerce_str()
    }

    /// Integer read; numbers truncate, strings parse, booleans map to
    /// 0/1.
    pub fn get_i64(&self, config_path: &str) -> Result<i64, ConfigError> {
        self.current(config_path)?.coerce_i64()
    }

    /// Float read with the same weak conversions.
    pub fn get_f64(&self, config_path: &str) -> Result<f64, ConfigError> {
        self.current(config_path)?.coerce_f64()
    }

    /// Boolean read; numbers read zero/non-zero, strings accept the
    /// usual spellings.
    pub fn get_bool(&self, config_path: &str) -> Result<bool, ConfigError> {
        self.current(config_path)?.coerce_bool()
    }

    /// Duration read through the duration grammar hook.
    pub fn get_duration(&self, config_path: &str) -> Result<Duration, ConfigError> {
        self.current(config_path)?.coerce_duration()
    }

    /// RFC 3339 timestamp read.
    pub fn get_timestamp(&self, config_path: &str) -> Result<DateTime<Utc>, ConfigError> {
        self.current(config_path)?.coerce_timestamp()
    }

    /// IP address read through the capped IP hook.
    pub fn get_ip(&self, config_path: &str) -> Result<IpAddr, ConfigError> {
        self.current(config_path)?.coerce_ip()
    }

    /// CIDR network read through the capped CIDR hook.
    pub fn get_cidr(&self, config_path: &str) -> Result<IpNet, ConfigError> {
        self.current(config_path)?.coerce_cidr()
    }

    /// URL read through the capped URL hook.
    pub fn get_url(&self, config_path: &str) -> Result<Url, ConfigError> {
        self.current(config_path)?.coerce_url()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::source::Source;

    #[test]
    fn scalar_accessors_convert_weakly() {
        let cfg = Config::new();
        cfg.register("port", "8080").unwrap();
        cfg.register("enabled", 1_i64).unwrap();
        cfg.register("rate", "2.5").unwrap();

        assert_eq!(cfg.get_i64("port").unwrap(), 8080);
        assert_eq!(cfg.get_string("port").unwrap(), "8080");
        assert!(cfg.get_bool("enabled").unwrap());
        assert_eq!(cfg.get_f64("rate").unwrap(), 2.5);

        assert!(matches!(
            cfg.get_i64("missing"),
            Err(ConfigError::NotRegistered(_))
        ));
    }

    #[test]
    fn typed_accessors_apply_hooks() {
        let cfg = Config::new();
        cfg.register("net.ip", "10.0.0.1").unwrap();
        cfg.register("net.block", "10.0.0.0/8").unwrap();
        cfg.register("net.endpoint", "https://example.com/api").unwrap();
        cfg.register("net.timeout", "1m30s").unwrap();

        assert_eq!(
            cfg.get_ip("net.ip").unwrap(),
            "10.0.0.1".parse::<IpAddr>().unwrap()
        );
        assert_eq!(cfg.get_cidr("net.block").unwrap().to_string(), "10.0.0.0/8");
        assert_eq!(
            cfg.get_url("net.endpoint").unwrap().as_str(),
            "https://example.com/api"
        );
        assert_eq!(
            cfg.get_duration("net.timeout").unwrap(),
            Duration::from_secs(90)
        );
    }

    #[test]
    fn accessors_follow_precedence() {
        let cfg = Config::new();
        cfg.register("level", "info").unwrap();
        cfg.set_source("level", Source::Env, "debug").unwrap();
        assert_eq!(cfg.get_string("level").unwrap(), "debug");
    }
}
