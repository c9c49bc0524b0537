//! Builder assembly: validator kinds, target semantics, discovery, and
//! the convenience constructors.

use serde::{Deserialize, Serialize};
use strata::{quick_typed, Builder, Config, ConfigError, FileDiscoveryOptions, Source, Value};

mod common;
use common::temp_config_file;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
struct ServerConfig {
    port: i64,
    host: String,
}

#[test]
fn typed_validator_rejects_privileged_port() {
    std::env::set_var("STRATA_BT_VALIDATOR_PORT", "80");

    let result = Builder::new()
        .with_target(&ServerConfig {
            port: 8080,
            host: "localhost".into(),
        })
        .with_env_prefix("STRATA_BT_VALIDATOR_")
        .with_args(Vec::<String>::new())
        .with_typed_validator(|cfg: &ServerConfig| {
            if cfg.port < 1024 {
                Err(format!("port {} is privileged", cfg.port))
            } else {
                Ok(())
            }
        })
        .build();

    std::env::remove_var("STRATA_BT_VALIDATOR_PORT");

    match result {
        Err(ConfigError::TypedValidator(msg)) => assert!(msg.contains("80")),
        other => panic!("expected typed validator rejection, got {other:?}"),
    }
}

#[test]
fn typed_validator_passes_and_as_struct_reflects_sources() {
    std::env::set_var("STRATA_BT_OK_PORT", "4096");

    let cfg = Builder::new()
        .with_target(&ServerConfig {
            port: 8080,
            host: "localhost".into(),
        })
        .with_env_prefix("STRATA_BT_OK_")
        .with_args(Vec::<String>::new())
        .with_typed_validator(|cfg: &ServerConfig| {
            if cfg.port < 1024 {
                Err("privileged".into())
            } else {
                Ok(())
            }
        })
        .build()
        .unwrap();

    std::env::remove_var("STRATA_BT_OK_PORT");

    let decoded: ServerConfig = cfg.as_struct().unwrap();
    assert_eq!(decoded.port, 4096);
    assert_eq!(decoded.host, "localhost");
}

#[test]
fn raw_validator_sees_the_registry() {
    let (_dir, path) = temp_config_file("app.toml", "port = 0\n");

    let err = Builder::new()
        .with_defaults(&ServerConfig {
            port: 8080,
            host: "h".into(),
        })
        .with_file(&path)
        .with_args(Vec::<String>::new())
        .with_validator(|cfg: &Config| {
            let port = cfg.get_i64("port").map_err(|e| e.to_string())?;
            if port == 0 {
                Err("port 0 is not listenable".into())
            } else {
                Ok(())
            }
        })
        .build()
        .unwrap_err();

    assert!(matches!(err, ConfigError::Validation(_)));
}

#[test]
fn builder_loads_all_sources_with_precedence() {
    let (_dir, path) = temp_config_file("app.toml", "port = 9000\nhost = \"filehost\"\n");
    std::env::set_var("STRATA_BT_ALL_PORT", "7000");

    let cfg = Builder::new()
        .with_defaults(&ServerConfig {
            port: 8080,
            host: "default".into(),
        })
        .with_file(&path)
        .with_env_prefix("STRATA_BT_ALL_")
        .with_args(vec!["--port=6000".to_string()])
        .build()
        .unwrap();

    std::env::remove_var("STRATA_BT_ALL_PORT");

    // CLI > env > file > default.
    assert_eq!(cfg.get_i64("port").unwrap(), 6000);
    assert_eq!(cfg.get_string("host").unwrap(), "filehost");

    assert_eq!(cfg.get_source("port", Source::File), Some(Value::Int(9000)));
    assert_eq!(
        cfg.get_source("port", Source::Env),
        Some(Value::Str("7000".into()))
    );
    assert_eq!(
        cfg.get_source("port", Source::Cli),
        Some(Value::Str("6000".into()))
    );
}

#[test]
fn custom_sources_limit_consulted_layers() {
    std::env::set_var("STRATA_BT_LIMITED_PORT", "7000");

    let cfg = Builder::new()
        .with_defaults(&ServerConfig {
            port: 8080,
            host: "default".into(),
        })
        .with_env_prefix("STRATA_BT_LIMITED_")
        .with_sources(&[Source::File, Source::Default])
        .with_args(vec!["--port=6000".to_string()])
        .build()
        .unwrap();

    std::env::remove_var("STRATA_BT_LIMITED_PORT");

    // Env and CLI are absent from the precedence list: never consulted.
    assert_eq!(cfg.get_i64("port").unwrap(), 8080);
    assert_eq!(cfg.get_source("port", Source::Env), None);
    assert_eq!(cfg.get_source("port", Source::Cli), None);
}

#[test]
fn file_discovery_finds_by_extension_order() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("myservice.toml"), "port = 3000\n").unwrap();

    let cfg = Builder::new()
        .with_defaults(&ServerConfig::default())
        .with_args(Vec::<String>::new())
        .with_file_discovery(FileDiscoveryOptions {
            name: "myservice".into(),
            extensions: vec![".toml".into(), ".conf".into()],
            paths: vec![dir.path().to_path_buf()],
            env_var: String::new(),
            cli_flag: String::new(),
            use_xdg: false,
            use_current_dir: false,
        })
        .build()
        .unwrap();

    assert_eq!(cfg.get_i64("port").unwrap(), 3000);
}

#[test]
fn discovery_prefers_cli_flag() {
    let (_dir, explicit) = temp_config_file("explicit.toml", "port = 4444\n");

    let cfg = Builder::new()
        .with_defaults(&ServerConfig::default())
        .with_args(vec![format!("--config={}", explicit.display())])
        .with_file_discovery(FileDiscoveryOptions {
            name: "nonexistent".into(),
            extensions: vec![".toml".into()],
            paths: vec![],
            env_var: String::new(),
            cli_flag: "--config".into(),
            use_xdg: false,
            use_current_dir: false,
        })
        .build()
        .unwrap();

    assert_eq!(cfg.get_i64("port").unwrap(), 4444);
}

#[test]
fn quick_typed_builds_a_type_aware_instance() {
    let (_dir, path) = temp_config_file("app.toml", "port = 5151\n");

    let cfg = quick_typed(
        &ServerConfig {
            port: 1,
            host: "fallback".into(),
        },
        "STRATA_BT_QT_UNSET_",
        Some(&path),
    )
    .unwrap();

    let decoded: ServerConfig = cfg.as_struct().unwrap();
    assert_eq!(decoded.port, 5151);
    assert_eq!(decoded.host, "fallback");
}

#[test]
fn builder_error_surfaces_at_build() {
    #[derive(Debug)]
    struct NotTheTarget;

    let err = Builder::new()
        .with_target(&ServerConfig::default())
        .with_args(Vec::<String>::new())
        .with_typed_validator(|_: &NotTheTarget| Ok(()))
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigError::TargetTypeMismatch));
}
