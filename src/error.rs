// ABOUTME: Application-wide error types for flotilla.
// ABOUTME: Wraps configuration, registry and install failures for the CLI.

use std::path::PathBuf;
use thiserror::Error;

use crate::components::ComponentError;
use crate::environments::RegistryError;
use crate::install::InstallFailure;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unsupported machine driver: {0}")]
    UnsupportedDriver(String),

    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),

    #[error(transparent)]
    Install(#[from] Box<InstallFailure>),

    #[error("environment registry: {0}")]
    Environments(#[from] RegistryError),

    #[error("reading cluster status: {0}")]
    Status(#[from] ComponentError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<InstallFailure> for Error {
    fn from(failure: InstallFailure) -> Self {
        Error::Install(Box::new(failure))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
