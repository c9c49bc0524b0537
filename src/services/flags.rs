//! Interop with `clap`-based command lines.
//!
//! Applications that already own a `clap` surface can project the
//! registry into it and feed parsed matches back as the CLI source,
//! instead of handing the raw argv to [`Config::load_cli`].

use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing::debug;

use crate::domain::errors::ConfigError;
use crate::domain::source::Source;
use crate::domain::value::Value;
use crate::services::registry::Config;

impl Config {
    /// Builds a `clap::Command` with one long flag per registered path.
    /// Boolean defaults become presence flags; everything else takes a
    /// value.
    pub fn generate_command(&self, name: &'static str) -> Command {
        let defaults = self.registered_paths_with_defaults("");

        let mut command = Command::new(name).no_binary_name(true);
        for (path, default) in defaults {
            let arg = Arg::new(path.clone())
                .long(path.clone())
                .help(format!("Config: {path}"));
            let arg = match default {
                Value::Bool(_) => arg.action(ArgAction::SetTrue),
                _ => arg.action(ArgAction::Set).value_name("VALUE"),
            };
            command = command.arg(arg);
        }
        command
    }

    /// Submits every flag present on the command line under
    /// [`Source::Cli`]. Values are raw strings; the decoder converts at
    /// read time. Errors for individual flags accumulate.
    pub fn bind_matches(&self, matches: &ArgMatches) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        let mut bound = 0usize;

        for path in self.registered_paths("") {
            if matches.value_source(&path) != Some(clap::parser::ValueSource::CommandLine) {
                continue;
            }

            let raw = match matches.try_get_one::<String>(&path) {
                Ok(Some(value)) => value.clone(),
                _ => match matches.try_get_one::<bool>(&path) {
                    Ok(Some(flag)) => flag.to_string(),
                    _ => continue,
                },
            };

            match self.set_source(&path, Source::Cli, raw) {
                Ok(()) => bound += 1,
                Err(e) => errors.push(e),
            }
        }

        debug!(bound, "clap matches bound");
        ConfigError::join(errors)
    }
}
