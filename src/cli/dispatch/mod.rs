use crate::cli::{
    actions::Action,
    commands::{ARG_CONFIG, ARG_DEBUG},
};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Turn parsed arguments into the action to execute.
///
/// # Errors
/// Returns an error if the configuration path argument is missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    Ok(Action::Server {
        config: matches
            .get_one::<String>(ARG_CONFIG)
            .map(PathBuf::from)
            .context("missing required argument: --config")?,
        debug: matches.get_flag(ARG_DEBUG),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;

    #[test]
    fn test_handler_defaults() {
        temp_env::with_vars(
            [
                ("SIGILO_CONFIG", None::<&str>),
                ("SIGILO_DEBUG", None::<&str>),
            ],
            || {
                let matches = commands::new().get_matches_from(vec!["sigilo"]);
                let Action::Server { config, debug } = handler(&matches).unwrap();
                assert_eq!(config, PathBuf::from("config.yml"));
                assert!(!debug);
            },
        );
    }
}
