// ABOUTME: Command handlers behind the flotilla CLI.
// ABOUTME: Each handler loads configuration, runs one operation and reports through Output.

mod environments;
mod install;

pub use environments::{EnvironmentList, forget, list_environments};
pub use install::install;

use crate::config::{Config, DEFAULT_STORE};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Load `path`, or discover a config file in the current directory.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Config::discover(&std::env::current_dir()?),
    }
}

/// Store directory of the config, or the default store when no config is found.
fn store_dir(path: Option<&Path>) -> Result<PathBuf> {
    match load_config(path) {
        Ok(config) => Ok(config.store),
        Err(Error::ConfigNotFound(_)) if path.is_none() => Ok(PathBuf::from(DEFAULT_STORE)),
        Err(e) => Err(e),
    }
}
