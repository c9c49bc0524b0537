//! Concurrent access: interleaved reads, writes, registrations, and
//! subscriptions must never tear.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use strata::{Config, Source, Value};

mod common;
use common::temp_config_file;

#[test]
fn interleaved_get_set_register_are_consistent() {
    let cfg = Arc::new(Config::new());
    cfg.register("shared.counter", 0_i64).unwrap();

    let writers: Vec<_> = (0..4)
        .map(|writer| {
            let cfg = Arc::clone(&cfg);
            thread::spawn(move || {
                for i in 0..250_i64 {
                    let value = writer * 1000 + i;
                    cfg.set_source("shared.counter", Source::Cli, value).unwrap();
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let cfg = Arc::clone(&cfg);
            thread::spawn(move || {
                for _ in 0..500 {
                    // Every observed value is either the default or some
                    // value a writer actually submitted.
                    match cfg.get("shared.counter") {
                        Some(Value::Int(v)) => {
                            assert!(v == 0 || (0..4000).contains(&v), "torn read: {v}")
                        }
                        Some(other) => panic!("unexpected kind: {other:?}"),
                        None => panic!("path vanished"),
                    }
                }
            })
        })
        .collect();

    let registrar = {
        let cfg = Arc::clone(&cfg);
        thread::spawn(move || {
            for i in 0..100 {
                cfg.register(&format!("dynamic.path{i}"), i as i64).unwrap();
            }
        })
    };

    for handle in writers.into_iter().chain(readers).chain([registrar]) {
        handle.join().unwrap();
    }

    assert_eq!(cfg.registered_paths("dynamic").len(), 100);
}

#[test]
fn version_counter_is_monotonic_under_contention() {
    let cfg = Arc::new(Config::new());
    cfg.register("key", 0_i64).unwrap();

    let observer = {
        let cfg = Arc::clone(&cfg);
        thread::spawn(move || {
            let mut last = cfg.version();
            for _ in 0..2000 {
                let now = cfg.version();
                assert!(now >= last, "version went backwards: {last} -> {now}");
                last = now;
            }
        })
    };

    let mutators: Vec<_> = (0..3)
        .map(|_| {
            let cfg = Arc::clone(&cfg);
            thread::spawn(move || {
                for i in 0..300_i64 {
                    cfg.set_source("key", Source::Env, i).unwrap();
                }
            })
        })
        .collect();

    observer.join().unwrap();
    for handle in mutators {
        handle.join().unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_subscribe_and_mutate() {
    let (_dir, path) = temp_config_file("app.toml", "value = 1\n");

    let cfg = Arc::new(Config::new());
    cfg.register("value", 0_i64).unwrap();
    cfg.load_file(&path).unwrap();

    let opts = strata::WatchOptions {
        poll_interval: Duration::from_millis(100),
        debounce: Duration::from_millis(150),
        max_watchers: 8,
        ..strata::WatchOptions::default()
    };

    let mut receivers = Vec::new();
    for _ in 0..8 {
        receivers.push(cfg.watch_with_options(opts.clone()));
    }
    assert_eq!(cfg.watcher_count(), 8);

    // Past the limit: closed channels, count stays put.
    let mut overflow = cfg.watch_with_options(opts.clone());
    assert_eq!(overflow.recv().await, None);
    assert_eq!(cfg.watcher_count(), 8);

    let mutate = {
        let cfg = Arc::clone(&cfg);
        tokio::task::spawn_blocking(move || {
            for i in 0..100_i64 {
                cfg.set_source("value", Source::Cli, i).unwrap();
            }
        })
    };
    mutate.await.unwrap();

    cfg.stop_auto_update().await;
    for mut rx in receivers {
        assert_eq!(rx.recv().await, None);
    }
}
