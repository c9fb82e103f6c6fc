//! Checks run once by `main` before the listener is bound.

use std::env::{self, VarError};
use std::path::Path;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;

const BANNER: &str = r"
     _       _         _
    (_) ___ | |__  ___| |_ _ __ ___  __ _ _ __ ___
    | |/ _ \| '_ \/ __| __| '__/ _ \/ _` | '_ ` _ \
    | | (_) | |_) \__ \ |_| | |  __/ (_| | | | | | |
   _/ |\___/|_.__/|___/\__|_|  \___|\__,_|_| |_| |_|
  |__/
";

/// A startup precondition does not hold. Fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StartupError {
    #[error("Credential token variable {0} is not set")]
    MissingToken(String),

    #[error("Credential token variable {0} is empty")]
    EmptyToken(String),

    #[error("Credential token variable {0} is not valid unicode")]
    InvalidToken(String),
}

/// Print the banner, check the launcher config and verify the credential token.
pub fn initialize(config: &Config) -> Result<(), StartupError> {
    println!("{}", BANNER);

    match &config.launcher_config {
        Some(path) => check_launcher_config(path),
        None => info!("No launcher configuration given, using job defaults"),
    }

    if config.require_token {
        verify_token(&config.token_env, env::var(&config.token_env))?;
        info!(variable = %config.token_env, "Credential token present");
    } else {
        warn!("Credential token check skipped");
    }
    Ok(())
}

fn check_launcher_config(path: &Path) {
    if path.is_file() {
        info!(path = %path.display(), "Launcher configuration found");
    } else {
        warn!(
            path = %path.display(),
            "Launcher configuration not found, jobs will run with built-in defaults"
        );
    }
}

/// Validate the value read for the token variable `name`.
pub fn verify_token(name: &str, value: Result<String, VarError>) -> Result<(), StartupError> {
    match value {
        Ok(token) if token.trim().is_empty() => Err(StartupError::EmptyToken(name.to_string())),
        Ok(_) => Ok(()),
        Err(VarError::NotPresent) => Err(StartupError::MissingToken(name.to_string())),
        Err(VarError::NotUnicode(_)) => Err(StartupError::InvalidToken(name.to_string())),
    }
}
