// ABOUTME: Install harness wiring stub collaborators and a temporary store into an Installer.

use super::stubs::{StubBootstrapper, StubConnector, StubDriver};
use flotilla::components::ComponentsConfig;
use flotilla::driver::DriverOptions;
use flotilla::environments::FileRegistry;
use flotilla::install::{HostLayout, InstallOptions, Installer};
use flotilla::types::TargetName;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub struct Harness {
    pub store: TempDir,
    pub driver: Arc<StubDriver>,
    pub connector: Arc<StubConnector>,
    pub bootstrapper: Arc<StubBootstrapper>,
    pub environments: Arc<FileRegistry>,
}

impl Harness {
    pub fn new(driver: StubDriver) -> Self {
        Self::with(driver, StubConnector::default(), StubBootstrapper::default())
    }

    pub fn with(
        driver: StubDriver,
        connector: StubConnector,
        bootstrapper: StubBootstrapper,
    ) -> Self {
        let store = TempDir::new().unwrap();
        let environments = Arc::new(FileRegistry::new(store.path()));
        Self {
            store,
            driver: Arc::new(driver),
            connector: Arc::new(connector),
            bootstrapper: Arc::new(bootstrapper),
            environments,
        }
    }

    pub fn installer(&self) -> Installer {
        Installer::new(
            self.driver.clone(),
            self.connector.clone(),
            self.bootstrapper.clone(),
            self.environments.clone(),
        )
    }

    pub fn options(&self, name: &str, core: usize, apps: usize, dedicated: bool) -> InstallOptions {
        let mut components = ComponentsConfig::default();
        components.database.password = "db-secret".to_string();
        components.api.root_password = "root-secret".to_string();
        components.api.port = 9000;
        components.task_timeout = Duration::from_secs(1);

        InstallOptions {
            name: TargetName::new(name).unwrap(),
            store: self.store.path().to_path_buf(),
            layout: HostLayout {
                core_hosts: core,
                apps_hosts: apps,
                dedicated_hosts: dedicated,
            },
            driver_options: DriverOptions::new().with("region", "test-1"),
            control_plane_port: 9000,
            components,
        }
    }
}
