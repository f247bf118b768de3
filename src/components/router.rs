// ABOUTME: Traefik ingress router on the managers, watching the swarm for routed services.

use super::{ComponentsConfig, Result, router_domain};
use crate::cluster::{Cluster, OVERLAY_NETWORK};
use crate::engine::{BindMount, PublishedPort, ServiceSpec};

pub(super) const SERVICE: &str = "router";
const DOCKER_SOCKET: &str = "/var/run/docker.sock";

pub(super) fn spec(cluster: &Cluster, config: &ComponentsConfig) -> ServiceSpec {
    let domain = router_domain(cluster, config);
    let mut spec = ServiceSpec::new(SERVICE, config.router.image.clone());
    spec.command = Some(vec![
        "--providers.swarm=true".to_string(),
        format!("--providers.swarm.endpoint=unix://{DOCKER_SOCKET}"),
        "--providers.swarm.exposedByDefault=false".to_string(),
        format!("--providers.swarm.network={OVERLAY_NETWORK}"),
        format!("--providers.swarm.defaultRule=Host(`{{{{ .Name }}}}.{domain}`)"),
        "--entrypoints.web.address=:80".to_string(),
        "--entrypoints.websecure.address=:443".to_string(),
    ]);
    spec.ports = vec![PublishedPort::tcp(80, 80), PublishedPort::tcp(443, 443)];
    spec.mounts.push(BindMount {
        source: DOCKER_SOCKET.to_string(),
        target: DOCKER_SOCKET.to_string(),
        read_only: true,
    });
    spec.constraints.push("node.role==manager".to_string());
    spec
}

pub(super) async fn install(cluster: &Cluster, config: &ComponentsConfig) -> Result<()> {
    cluster.create_service(spec(cluster, config)).await?;
    Ok(())
}
