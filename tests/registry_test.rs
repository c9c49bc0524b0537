//! Registry and merge-engine behavior: registration grammar, precedence
//! determinism, unregister cascade.

use strata::{Config, ConfigError, Source, Value};

#[test]
fn precedence_swap_end_to_end() {
    let cfg = Config::new();
    cfg.register("server.port", 8080_i64).unwrap();

    cfg.set_source("server.port", Source::File, 9000_i64).unwrap();
    cfg.set_source("server.port", Source::Env, 7000_i64).unwrap();
    cfg.set_source("server.port", Source::Cli, 6000_i64).unwrap();

    // Default precedence: CLI > Env > File > Default.
    assert_eq!(cfg.get("server.port"), Some(Value::Int(6000)));

    cfg.set_precedence(&[Source::Env, Source::Cli, Source::File, Source::Default]);
    assert_eq!(cfg.get("server.port"), Some(Value::Int(7000)));

    cfg.set_precedence(&[Source::File, Source::Default]);
    assert_eq!(cfg.get("server.port"), Some(Value::Int(9000)));

    // With every source cleared, the default applies regardless of order.
    cfg.reset();
    assert_eq!(cfg.get("server.port"), Some(Value::Int(8080)));
}

#[test]
fn registration_grammar_is_exact() {
    let cfg = Config::new();

    for valid in [
        "a",
        "server.port",
        "_internal.flag",
        "log.max-age",
        "a1.b2_c3.d-4",
    ] {
        assert!(cfg.register(valid, 0_i64).is_ok(), "{valid} should register");
    }

    for invalid in [
        "",
        ".",
        "a.",
        ".a",
        "a..b",
        "9start",
        "-dash",
        "white space",
        "dot.in.9seg",
        "emoji.🦀",
    ] {
        assert!(
            cfg.register(invalid, 0_i64).is_err(),
            "{invalid:?} should be rejected"
        );
    }
}

#[test]
fn unregister_cascade_removes_descendants_only() {
    let cfg = Config::new();
    cfg.register("db.primary.host", "h1").unwrap();
    cfg.register("db.primary.port", 5432_i64).unwrap();
    cfg.register("db.replica.host", "h2").unwrap();
    cfg.register("dbx", true).unwrap();

    cfg.unregister("db.primary").unwrap();

    let remaining = cfg.registered_paths("");
    assert_eq!(remaining, vec!["db.replica.host".to_string(), "dbx".to_string()]);
}

#[test]
fn get_sources_is_a_defensive_copy() {
    let cfg = Config::new();
    cfg.register("key", "default").unwrap();
    cfg.set_source("key", Source::Env, "env-value").unwrap();

    let mut sources = cfg.get_sources("key");
    sources.insert(Source::Cli, Value::Str("tampered".into()));

    // Mutating the copy never reaches the registry.
    assert_eq!(cfg.get_source("key", Source::Cli), None);
    assert_eq!(cfg.get("key"), Some(Value::Str("env-value".into())));
}

#[test]
fn set_uses_highest_priority_source() {
    let cfg = Config::new();
    cfg.register("mode", "defaults").unwrap();
    cfg.set("mode", "explicit").unwrap();
    assert_eq!(
        cfg.get_source("mode", Source::Cli),
        Some(Value::Str("explicit".into()))
    );

    cfg.set_precedence(&[Source::File, Source::Env, Source::Cli]);
    cfg.set("mode", "file-first").unwrap();
    assert_eq!(
        cfg.get_source("mode", Source::File),
        Some(Value::Str("file-first".into()))
    );
}

#[test]
fn precedence_list_always_ends_with_default_floor() {
    let cfg = Config::new();
    cfg.register("key", "fallback").unwrap();

    cfg.set_precedence(&[Source::Cli]);
    assert_eq!(cfg.precedence(), vec![Source::Cli, Source::Default]);
    assert_eq!(cfg.get("key"), Some(Value::Str("fallback".into())));
}

#[test]
fn errors_are_distinguishable() {
    let cfg = Config::new();
    assert!(matches!(
        cfg.set_source("ghost", Source::Cli, 1_i64),
        Err(ConfigError::NotRegistered(_))
    ));
    assert!(matches!(
        cfg.register("bad..path", 1_i64),
        Err(ConfigError::InvalidPath { .. })
    ));
    assert!(matches!(
        cfg.unregister("ghost"),
        Err(ConfigError::NotRegistered(_))
    ));
}

#[test]
fn version_advances_monotonically_across_operations() {
    let cfg = Config::new();
    let mut last = cfg.version();

    cfg.register("a", 1_i64).unwrap();
    assert!(cfg.version() > last);
    last = cfg.version();

    cfg.set_source("a", Source::Env, 2_i64).unwrap();
    assert!(cfg.version() > last);
    last = cfg.version();

    cfg.set_precedence(&[Source::Env]);
    assert!(cfg.version() > last);
    last = cfg.version();

    cfg.reset_source(Source::Env);
    assert!(cfg.version() > last);
    last = cfg.version();

    cfg.unregister("a").unwrap();
    assert!(cfg.version() > last);
}
