// ABOUTME: The install command: wires configured collaborators into an Installer and runs it.

use super::load_config;
use crate::certs::{CertStore, ClientCertificate};
use crate::engine::TlsConnector;
use crate::environments::FileRegistry;
use crate::error::Result;
use crate::install::Installer;
use crate::output::{Output, OutputMode};
use std::path::Path;
use std::sync::Arc;

pub async fn install(config_path: Option<&Path>, mode: OutputMode) -> Result<()> {
    let config = load_config(config_path)?;
    let options = config.install_options()?;
    let driver = config.machine_driver()?;

    let store = CertStore::new(&options.store, &options.name);
    let connector = TlsConnector::new(ClientCertificate::locate(&store));
    let installer = Installer::new(
        driver,
        Arc::new(connector),
        Arc::new(config.bootstrapper()),
        Arc::new(FileRegistry::new(&options.store)),
    );

    let mut output = Output::new(mode);
    output.start_timer();
    output.progress(&format!(
        "Installing {} ({} core, {} application hosts, driver {})",
        options.name, options.layout.core_hosts, options.layout.apps_hosts, config.driver.name
    ));

    let installation = installer.install(&options).await?;
    for warning in installation.diagnostics.warnings() {
        output.warning(warning);
    }

    let summary = installation.summary().await?;
    output.report("summary", &summary);
    output.success(&format!(
        "Installed {} with control plane at {}",
        options.name, installation.control_plane_url
    ));
    Ok(())
}
