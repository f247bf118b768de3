// ABOUTME: Configuration types and parsing for flotilla.yml.
// ABOUTME: Handles YAML parsing, secret interpolation and conversion into install options.

mod components;
mod env_value;
mod host;
mod init;

pub use components::{
    ApiSection, CacheSection, ComponentsSection, DatabaseSection, RegistrySection, RouterSection,
};
pub use env_value::EnvValue;
pub use host::HostConfig;
pub use init::init_config;

use crate::bootstrap::CommandBootstrapper;
use crate::driver::{DriverKind, DriverOptions, GENERIC_DRIVER_NAME, GenericDriver, MachineDriver};
use crate::error::{Error, Result};
use crate::install::{HostLayout, InstallOptions};
use crate::types::TargetName;
use nonempty::NonEmpty;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "flotilla.yml";
pub const CONFIG_FILENAME_ALT: &str = "flotilla.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".flotilla/config.yml";

pub const DEFAULT_STORE: &str = ".flotilla/store";
pub const DEFAULT_CONTROL_PLANE_PORT: u16 = 9000;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub target: TargetName,

    #[serde(default = "default_store")]
    pub store: PathBuf,

    #[serde(default = "default_core_hosts")]
    pub core_hosts: usize,

    #[serde(default)]
    pub apps_hosts: usize,

    #[serde(default)]
    pub dedicated_hosts: bool,

    #[serde(default = "default_control_plane_port")]
    pub control_plane_port: u16,

    #[serde(default)]
    pub driver: DriverConfig,

    #[serde(default, deserialize_with = "deserialize_hosts")]
    pub hosts: Option<NonEmpty<HostConfig>>,

    #[serde(default)]
    pub components: ComponentsSection,

    pub bootstrap: BootstrapConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DriverConfig {
    #[serde(default = "default_driver_name")]
    pub name: String,
    #[serde(default)]
    pub options: DriverOptions,
    /// known_hosts file used when adopting hosts over SSH.
    #[serde(default)]
    pub known_hosts: Option<PathBuf>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            name: default_driver_name(),
            options: DriverOptions::default(),
            known_hosts: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    /// Program and arguments run for each bootstrap action.
    #[serde(deserialize_with = "deserialize_command")]
    pub command: NonEmpty<String>,
    #[serde(default = "default_ready_timeout", with = "humantime_serde")]
    pub ready_timeout: Duration,
}

fn default_store() -> PathBuf {
    PathBuf::from(DEFAULT_STORE)
}

fn default_core_hosts() -> usize {
    1
}

fn default_control_plane_port() -> u16 {
    DEFAULT_CONTROL_PLANE_PORT
}

fn default_driver_name() -> String {
    GENERIC_DRIVER_NAME.to_string()
}

fn default_ready_timeout() -> Duration {
    Duration::from_secs(300)
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    fn validate(&self) -> Result<()> {
        if self.core_hosts == 0 {
            return Err(Error::InvalidConfig(
                "core_hosts must be at least 1".to_string(),
            ));
        }
        if self.driver.name != GENERIC_DRIVER_NAME {
            return Ok(());
        }
        // Adopted hosts cannot be created on demand; each core machine needs an entry.
        let available = self.hosts.as_ref().map_or(0, NonEmpty::len);
        if available < self.core_hosts {
            return Err(Error::InvalidConfig(format!(
                "driver {GENERIC_DRIVER_NAME} needs {} hosts, {available} configured",
                self.core_hosts
            )));
        }
        Ok(())
    }

    pub fn layout(&self) -> HostLayout {
        HostLayout {
            core_hosts: self.core_hosts,
            apps_hosts: self.apps_hosts,
            dedicated_hosts: self.dedicated_hosts,
        }
    }

    pub fn driver_kind(&self) -> DriverKind {
        DriverKind::from_name(&self.driver.name)
    }

    /// Resolve secrets and build the options for one install run.
    pub fn install_options(&self) -> Result<InstallOptions> {
        Ok(InstallOptions {
            name: self.target.clone(),
            store: self.store.clone(),
            layout: self.layout(),
            driver_options: self.driver.options.clone(),
            control_plane_port: self.control_plane_port,
            components: self.components.resolve(self.control_plane_port)?,
        })
    }

    /// Instantiate the configured machine driver.
    pub fn machine_driver(&self) -> Result<Arc<dyn MachineDriver>> {
        if self.driver.name != GENERIC_DRIVER_NAME {
            return Err(Error::UnsupportedDriver(self.driver.name.clone()));
        }
        let hosts = self
            .hosts
            .as_ref()
            .map(|hosts| hosts.iter().cloned().collect())
            .unwrap_or_default();
        let mut driver = GenericDriver::new(hosts);
        if let Some(path) = &self.driver.known_hosts {
            driver = driver.known_hosts_path(path);
        }
        Ok(Arc::new(driver))
    }

    pub fn bootstrapper(&self) -> CommandBootstrapper {
        let command = &self.bootstrap.command;
        CommandBootstrapper::new(&command.head, self.target.as_str())
            .args(command.tail.clone())
            .ready_timeout(self.bootstrap.ready_timeout)
    }
}

// Custom deserializers

fn deserialize_hosts<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<NonEmpty<HostConfig>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<Vec<HostEntry>> = Option::deserialize(deserializer)?;
    let Some(values) = opt else {
        return Ok(None);
    };
    let hosts = values
        .into_iter()
        .map(HostEntry::into_host_config)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(serde::de::Error::custom)?;

    NonEmpty::from_vec(hosts)
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom("hosts list cannot be empty"))
}

fn deserialize_command<'de, D>(deserializer: D) -> std::result::Result<NonEmpty<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Command {
        Program(String),
        Argv(Vec<String>),
    }

    let argv = match Command::deserialize(deserializer)? {
        Command::Program(program) => vec![program],
        Command::Argv(argv) => argv,
    };
    match NonEmpty::from_vec(argv) {
        Some(argv) if !argv.head.trim().is_empty() => Ok(argv),
        _ => Err(serde::de::Error::custom("bootstrap command cannot be empty")),
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HostEntry {
    Simple(String),
    Detailed(HostConfig),
}

impl HostEntry {
    fn into_host_config(self) -> std::result::Result<HostConfig, String> {
        match self {
            HostEntry::Simple(s) => HostConfig::parse(&s),
            HostEntry::Detailed(c) => Ok(c),
        }
    }
}
