// ABOUTME: Per-component settings with defaults for every platform service.
// ABOUTME: Built once from configuration; the registry IP is filled in after provisioning.

use crate::types::ImageRef;
use std::net::IpAddr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseSettings {
    pub image: ImageRef,
    pub name: String,
    pub user: String,
    pub password: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            image: ImageRef::tagged(None, "postgres", "16-alpine"),
            name: "flotilla".to_string(),
            user: "flotilla".to_string(),
            password: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    pub image: ImageRef,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            image: ImageRef::tagged(None, "redis", "7-alpine"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouterSettings {
    pub image: ImageRef,
    /// Wildcard domain for routed apps; `<manager-ip>.nip.io` when unset.
    pub domain: Option<String>,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            image: ImageRef::tagged(None, "traefik", "v3.1"),
            domain: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RegistrySettings {
    pub image: Option<ImageRef>,
    /// Node IP the registry certificate is bound to.
    pub bound_ip: Option<IpAddr>,
}

impl RegistrySettings {
    pub fn image(&self) -> ImageRef {
        self.image
            .clone()
            .unwrap_or_else(|| ImageRef::tagged(None, "registry", "2"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiSettings {
    pub image: ImageRef,
    pub port: u16,
    pub root_user: String,
    pub root_password: String,
    /// Interactive command that prompts for the root user's name and password.
    pub root_user_command: Vec<String>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            image: ImageRef::tagged(Some("ghcr.io"), "flotilla/api", "latest"),
            port: 9000,
            root_user: "admin".to_string(),
            root_password: String::new(),
            root_user_command: vec!["api".to_string(), "create-root-user".to_string()],
        }
    }
}

/// Everything components need beyond the cluster itself.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentsConfig {
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub router: RouterSettings,
    pub registry: RegistrySettings,
    pub api: ApiSettings,
    /// How long to wait for a service's first running task.
    pub task_timeout: Duration,
}

impl Default for ComponentsConfig {
    fn default() -> Self {
        Self {
            database: DatabaseSettings::default(),
            cache: CacheSettings::default(),
            router: RouterSettings::default(),
            registry: RegistrySettings::default(),
            api: ApiSettings::default(),
            task_timeout: Duration::from_secs(180),
        }
    }
}

impl ComponentsConfig {
    pub fn with_registry_ip(mut self, ip: Option<IpAddr>) -> Self {
        self.registry.bound_ip = ip;
        self
    }
}
