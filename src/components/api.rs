// ABOUTME: Control-plane API service wired to the other components through its environment.
// ABOUTME: After it starts, the root user is created by scripting the interactive prompt.

use super::{ComponentError, ComponentsConfig, Result, cache, database, registry, router_domain};
use crate::cluster::Cluster;
use crate::engine::{ExecRequest, PublishedPort, ServiceSpec};

pub(super) const SERVICE: &str = "api";

pub(super) fn spec(cluster: &Cluster, config: &ComponentsConfig) -> ServiceSpec {
    let settings = &config.api;
    let mut spec = ServiceSpec::new(SERVICE, settings.image.clone());
    spec.env.insert("DATABASE_URL".into(), database::url(config));
    spec.env.insert("REDIS_URL".into(), cache::url());
    spec.env
        .insert("ROUTER_DOMAIN".into(), router_domain(cluster, config));
    if let Some(address) = registry::address(config) {
        spec.env.insert("REGISTRY_ADDRESS".into(), address);
    }
    spec.env.insert("PORT".into(), settings.port.to_string());
    spec.ports
        .push(PublishedPort::tcp(settings.port, settings.port));
    spec
}

/// Answers to the root-user prompt: name, password, confirmation.
fn root_user_script(config: &ComponentsConfig) -> String {
    let api = &config.api;
    format!(
        "{}\n{}\n{}\n",
        api.root_user, api.root_password, api.root_password
    )
}

pub(super) async fn install(cluster: &Cluster, config: &ComponentsConfig) -> Result<()> {
    cluster.create_service(spec(cluster, config)).await?;
    cluster
        .wait_for_running_task(SERVICE, config.task_timeout)
        .await?;

    let request =
        ExecRequest::new(config.api.root_user_command.iter().cloned()).stdin(root_user_script(config));
    let output = cluster.service_exec(SERVICE, &request).await?;
    tracing::debug!("root user prompt output: {}", output.output);
    if !output.success() {
        return Err(ComponentError::RootUser {
            exit_code: output.exit_code,
            output: output.output,
        });
    }
    tracing::info!("created root user {}", config.api.root_user);
    Ok(())
}
