// ABOUTME: The `components` section of flotilla.yml: image overrides and secrets.
// ABOUTME: Resolved once into ComponentsConfig before an install starts.

use super::env_value::{EnvValue, resolve_required};
use crate::components::ComponentsConfig;
use crate::error::{Error, Result};
use crate::types::ImageRef;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComponentsSection {
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub router: RouterSection,
    #[serde(default)]
    pub registry: RegistrySection,
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default, with = "humantime_serde")]
    pub task_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseSection {
    pub image: Option<ImageRef>,
    pub name: Option<String>,
    pub user: Option<String>,
    pub password: Option<EnvValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheSection {
    pub image: Option<ImageRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RouterSection {
    pub image: Option<ImageRef>,
    pub domain: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrySection {
    pub image: Option<ImageRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiSection {
    pub image: Option<ImageRef>,
    pub root_user: Option<String>,
    pub root_password: Option<EnvValue>,
    pub root_user_command: Option<Vec<String>>,
}

impl ComponentsSection {
    /// Apply overrides onto the defaults. The api listens on the control plane port.
    pub fn resolve(&self, control_plane_port: u16) -> Result<ComponentsConfig> {
        let mut config = ComponentsConfig::default();

        let database = &mut config.database;
        if let Some(image) = &self.database.image {
            database.image = image.clone();
        }
        if let Some(name) = &self.database.name {
            database.name = name.clone();
        }
        if let Some(user) = &self.database.user {
            database.user = user.clone();
        }
        database.password = resolve_required(
            self.database.password.as_ref(),
            "components.database.password",
        )?;

        if let Some(image) = &self.cache.image {
            config.cache.image = image.clone();
        }

        if let Some(image) = &self.router.image {
            config.router.image = image.clone();
        }
        config.router.domain = self.router.domain.clone();

        config.registry.image = self.registry.image.clone();

        let api = &mut config.api;
        if let Some(image) = &self.api.image {
            api.image = image.clone();
        }
        if let Some(user) = &self.api.root_user {
            api.root_user = user.clone();
        }
        if let Some(command) = &self.api.root_user_command {
            if command.first().is_none_or(|program| program.trim().is_empty()) {
                return Err(Error::InvalidConfig(
                    "components.api.root_user_command cannot be empty".to_string(),
                ));
            }
            api.root_user_command = command.clone();
        }
        api.root_password = resolve_required(
            self.api.root_password.as_ref(),
            "components.api.root_password",
        )?;
        api.port = control_plane_port;

        if let Some(timeout) = self.task_timeout {
            config.task_timeout = timeout;
        }
        Ok(config)
    }
}
