// ABOUTME: PostgreSQL service pinned to the leader so its bind-mounted data stays put.

use super::{ComponentError, ComponentsConfig, Result};
use crate::cluster::Cluster;
use crate::engine::{BindMount, ServiceSpec};

pub(super) const SERVICE: &str = "database";
pub(super) const PORT: u16 = 5432;
const DATA_DIR: &str = "/var/lib/flotilla/database";

pub(super) fn spec(cluster: &Cluster, config: &ComponentsConfig) -> ServiceSpec {
    let settings = &config.database;
    let mut spec = ServiceSpec::new(SERVICE, settings.image.clone());
    spec.env.insert("POSTGRES_DB".into(), settings.name.clone());
    spec.env.insert("POSTGRES_USER".into(), settings.user.clone());
    spec.env
        .insert("POSTGRES_PASSWORD".into(), settings.password.clone());
    spec.mounts.push(BindMount {
        source: DATA_DIR.to_string(),
        target: "/var/lib/postgresql/data".to_string(),
        read_only: false,
    });
    spec.constraints
        .push(format!("node.hostname=={}", cluster.leader().hostname()));
    spec
}

pub(super) async fn install(cluster: &Cluster, config: &ComponentsConfig) -> Result<()> {
    // The engine refuses bind mounts whose source is missing.
    let leader = cluster.leader();
    leader
        .run_privileged(&format!("mkdir -p {DATA_DIR}"))
        .await
        .map_err(|source| ComponentError::DataDir {
            machine: leader.name().to_string(),
            path: DATA_DIR.to_string(),
            source,
        })?;
    cluster.create_service(spec(cluster, config)).await?;
    Ok(())
}

/// Connection URL other services use over the overlay network.
pub(super) fn url(config: &ComponentsConfig) -> String {
    let settings = &config.database;
    format!(
        "postgres://{}:{}@{SERVICE}:{PORT}/{}",
        settings.user, settings.password, settings.name
    )
}
