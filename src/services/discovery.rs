//! Automatic configuration file discovery.
//!
//! Resolution order: explicit CLI flag, explicit environment variable,
//! then a filesystem search over custom paths, the current directory,
//! and the XDG config directories.

use std::path::PathBuf;

use tracing::debug;

use crate::domain::options::FileDiscoveryOptions;
use crate::services::builder::Builder;

impl Builder {
    /// Resolves the configuration file per the discovery options and
    /// records it as the builder's file. Finding nothing is not an
    /// error; the application proceeds with defaults and env vars.
    pub fn with_file_discovery(mut self, opts: FileDiscoveryOptions) -> Self {
        if let Some(found) = discover(&opts, &self.args) {
            debug!(path = %found.display(), "configuration file discovered");
            self.file = Some(found);
        }
        self
    }
}

fn discover(opts: &FileDiscoveryOptions, args: &[String]) -> Option<PathBuf> {
    // CLI flag has the highest priority.
    if !opts.cli_flag.is_empty() {
        for (i, arg) in args.iter().enumerate() {
            if arg == &opts.cli_flag {
                if let Some(next) = args.get(i + 1) {
                    return Some(PathBuf::from(next));
                }
            }
            if let Some(rest) = arg.strip_prefix(&format!("{}=", opts.cli_flag)) {
                return Some(PathBuf::from(rest));
            }
        }
    }

    // Then the explicit environment variable.
    if !opts.env_var.is_empty() {
        if let Ok(path) = std::env::var(&opts.env_var) {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }
    }

    // Finally the filesystem search.
    let mut search_paths: Vec<PathBuf> = opts.paths.clone();
    if opts.use_current_dir {
        if let Ok(cwd) = std::env::current_dir() {
            search_paths.push(cwd);
        }
    }
    if opts.use_xdg {
        search_paths.extend(xdg_config_paths(&opts.name));
    }

    for dir in &search_paths {
        for ext in &opts.extensions {
            let candidate = dir.join(format!("{}{}", opts.name, ext));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }

    None
}

/// XDG-compliant config search paths for an application.
fn xdg_config_paths(app_name: &str) -> Vec<PathBuf> {
    let mut paths = Vec::new();

    match std::env::var("XDG_CONFIG_HOME") {
        Ok(home) if !home.is_empty() => paths.push(PathBuf::from(home).join(app_name)),
        _ => {
            if let Ok(home) = std::env::var("HOME") {
                paths.push(PathBuf::from(home).join(".config").join(app_name));
            }
        }
    }

    match std::env::var("XDG_CONFIG_DIRS") {
        Ok(dirs) if !dirs.is_empty() => {
            for dir in std::env::split_paths(&dirs) {
                paths.push(dir.join(app_name));
            }
        }
        _ => {
            paths.push(PathBuf::from("/etc/xdg").join(app_name));
            paths.push(PathBuf::from("/etc").join(app_name));
        }
    }

    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_opts(dir: &std::path::Path) -> FileDiscoveryOptions {
        FileDiscoveryOptions {
            name: "myapp".into(),
            extensions: vec![".toml".into(), ".conf".into()],
            paths: vec![dir.to_path_buf()],
            env_var: String::new(),
            cli_flag: "--config".into(),
            use_xdg: false,
            use_current_dir: false,
        }
    }

    #[test]
    fn cli_flag_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("myapp.toml"), "a = 1\n").unwrap();

        let args = vec!["--config".to_string(), "/explicit/path.toml".to_string()];
        let found = discover(&base_opts(dir.path()), &args).unwrap();
        assert_eq!(found, PathBuf::from("/explicit/path.toml"));

        let args = vec!["--config=/other.toml".to_string()];
        let found = discover(&base_opts(dir.path()), &args).unwrap();
        assert_eq!(found, PathBuf::from("/other.toml"));
    }

    #[test]
    fn env_var_beats_search() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("myapp.toml"), "a = 1\n").unwrap();

        std::env::set_var("STRATA_DISCOVERY_TEST_CONFIG", "/from/env.toml");
        let mut opts = base_opts(dir.path());
        opts.env_var = "STRATA_DISCOVERY_TEST_CONFIG".into();
        let found = discover(&opts, &[]).unwrap();
        assert_eq!(found, PathBuf::from("/from/env.toml"));
        std::env::remove_var("STRATA_DISCOVERY_TEST_CONFIG");
    }

    #[test]
    fn search_tries_extensions_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("myapp.conf"), "a = 1\n").unwrap();

        let found = discover(&base_opts(dir.path()), &[]).unwrap();
        assert!(found.ends_with("myapp.conf"));

        std::fs::write(dir.path().join("myapp.toml"), "a = 1\n").unwrap();
        let found = discover(&base_opts(dir.path()), &[]).unwrap();
        assert!(found.ends_with("myapp.toml"));
    }

    #[test]
    fn nothing_found_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover(&base_opts(dir.path()), &[]).is_none());
    }
}
