// ABOUTME: Registry of installed environments, persisted as JSON in the store directory.
// ABOUTME: Guards target names so a second install under the same name is rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

pub const ENVIRONMENTS_FILE: &str = "environments.json";

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed environment registry {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("environment {0} is already registered")]
    AlreadyExists(String),

    #[error("environment {0} is not registered")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentState {
    Installing,
    Ready,
}

impl fmt::Display for EnvironmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EnvironmentState::Installing => "installing",
            EnvironmentState::Ready => "ready",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub name: String,
    pub state: EnvironmentState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_url: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Hostname of the machine that started the install.
    pub created_by: String,
}

impl Environment {
    pub fn installing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: EnvironmentState::Installing,
            control_plane_url: None,
            created_at: Utc::now(),
            created_by: gethostname::gethostname().to_string_lossy().into_owned(),
        }
    }
}

/// Known environments, keyed by target name.
pub trait EnvironmentRegistry: Send + Sync {
    fn contains(&self, name: &str) -> Result<bool>;

    /// Register `name` as installing. Fails if it is already registered.
    fn record(&self, name: &str) -> Result<Environment>;

    fn mark_ready(&self, name: &str, control_plane_url: &str) -> Result<()>;

    /// Drop `name`, returning whether it was registered.
    fn forget(&self, name: &str) -> Result<bool>;

    fn list(&self) -> Result<Vec<Environment>>;
}

/// JSON file at `<store>/environments.json`.
#[derive(Debug, Clone)]
pub struct FileRegistry {
    path: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    environments: Vec<Environment>,
}

impl FileRegistry {
    pub fn new(store: &Path) -> Self {
        Self {
            path: store.join(ENVIRONMENTS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self) -> impl FnOnce(io::Error) -> RegistryError + '_ {
        move |source| RegistryError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn read(&self) -> Result<RegistryFile> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(RegistryFile::default()),
            Err(e) => return Err(self.io_err()(e)),
        };
        serde_json::from_str(&contents).map_err(|source| RegistryError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    fn write(&self, file: &RegistryFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(self.io_err())?;
        }
        let json = serde_json::to_string_pretty(file).map_err(|source| RegistryError::Malformed {
            path: self.path.clone(),
            source,
        })?;
        // Write then rename so readers never see a partial file.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(self.io_err())?;
        std::fs::rename(&tmp, &self.path).map_err(self.io_err())
    }
}

impl EnvironmentRegistry for FileRegistry {
    fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.read()?.environments.iter().any(|e| e.name == name))
    }

    fn record(&self, name: &str) -> Result<Environment> {
        let mut file = self.read()?;
        if file.environments.iter().any(|e| e.name == name) {
            return Err(RegistryError::AlreadyExists(name.to_string()));
        }
        let environment = Environment::installing(name);
        file.environments.push(environment.clone());
        self.write(&file)?;
        tracing::debug!("recorded environment {} in {}", name, self.path.display());
        Ok(environment)
    }

    fn mark_ready(&self, name: &str, control_plane_url: &str) -> Result<()> {
        let mut file = self.read()?;
        let environment = file
            .environments
            .iter_mut()
            .find(|e| e.name == name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        environment.state = EnvironmentState::Ready;
        environment.control_plane_url = Some(control_plane_url.to_string());
        self.write(&file)
    }

    fn forget(&self, name: &str) -> Result<bool> {
        let mut file = self.read()?;
        let before = file.environments.len();
        file.environments.retain(|e| e.name != name);
        if file.environments.len() == before {
            return Ok(false);
        }
        self.write(&file)?;
        Ok(true)
    }

    fn list(&self) -> Result<Vec<Environment>> {
        Ok(self.read()?.environments)
    }
}
