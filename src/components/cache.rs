// ABOUTME: Redis service with append-only persistence, reachable only on the overlay network.

use super::{ComponentsConfig, Result};
use crate::cluster::Cluster;
use crate::engine::ServiceSpec;

pub(super) const SERVICE: &str = "cache";
pub(super) const PORT: u16 = 6379;

pub(super) fn spec(config: &ComponentsConfig) -> ServiceSpec {
    let mut spec = ServiceSpec::new(SERVICE, config.cache.image.clone());
    spec.command = Some(vec![
        "redis-server".to_string(),
        "--appendonly".to_string(),
        "yes".to_string(),
    ]);
    spec
}

pub(super) async fn install(cluster: &Cluster, config: &ComponentsConfig) -> Result<()> {
    cluster.create_service(spec(config)).await?;
    Ok(())
}

pub(super) fn url() -> String {
    format!("redis://{SERVICE}:{PORT}")
}
