// ABOUTME: TLS image registry pinned to the node its certificate was issued for.
// ABOUTME: Serves the certificate and storage directories prepared during provisioning.

use super::{ComponentError, ComponentsConfig, Result};
use crate::certs::{REGISTRY_CERT_FILE, REGISTRY_KEY_FILE, REGISTRY_PORT};
use crate::cluster::Cluster;
use crate::engine::{BindMount, PublishedPort, ServiceSpec};
use crate::machine::socket_addr;

pub(super) const SERVICE: &str = "registry";
const REMOTE_CERT_DIR: &str = "/etc/flotilla/registry";
const REMOTE_DATA_DIR: &str = "/var/lib/flotilla/registry";

pub(super) fn spec(cluster: &Cluster, config: &ComponentsConfig) -> Result<ServiceSpec> {
    let bound_ip = config
        .registry
        .bound_ip
        .ok_or(ComponentError::MissingRegistryCertificate)?;
    let host = cluster
        .machine_with_private_ip(bound_ip)
        .ok_or(ComponentError::StaleRegistryCertificate(bound_ip))?;

    let mut spec = ServiceSpec::new(SERVICE, config.registry.image());
    spec.env.insert(
        "REGISTRY_HTTP_ADDR".into(),
        format!("0.0.0.0:{REGISTRY_PORT}"),
    );
    spec.env.insert(
        "REGISTRY_HTTP_TLS_CERTIFICATE".into(),
        format!("/certs/{REGISTRY_CERT_FILE}"),
    );
    spec.env.insert(
        "REGISTRY_HTTP_TLS_KEY".into(),
        format!("/certs/{REGISTRY_KEY_FILE}"),
    );
    spec.ports.push(PublishedPort::tcp(REGISTRY_PORT, REGISTRY_PORT));
    spec.mounts = vec![
        BindMount {
            source: REMOTE_CERT_DIR.to_string(),
            target: "/certs".to_string(),
            read_only: true,
        },
        BindMount {
            source: REMOTE_DATA_DIR.to_string(),
            target: "/var/lib/registry".to_string(),
            read_only: false,
        },
    ];
    spec.constraints
        .push(format!("node.hostname=={}", host.hostname()));
    Ok(spec)
}

pub(super) async fn install(cluster: &Cluster, config: &ComponentsConfig) -> Result<()> {
    cluster.create_service(spec(cluster, config)?).await?;
    Ok(())
}

/// `ip:port` images are pushed to, once the certificate is bound.
pub(super) fn address(config: &ComponentsConfig) -> Option<String> {
    config
        .registry
        .bound_ip
        .map(|ip| socket_addr(ip, REGISTRY_PORT))
}
