// ABOUTME: Integration tests for platform component installation on a formed cluster.
// ABOUTME: Checks install order, service wiring and the root-user bootstrap exchange.

mod support;

use async_trait::async_trait;
use flotilla::cluster::{Cluster, form_cluster};
use flotilla::components::{
    Component, ComponentError, ComponentsConfig, PlatformComponent, install_components,
    router_domain,
};
use nonempty::NonEmpty;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use support::stubs::*;

async fn cluster(n: usize, connector: &StubConnector) -> Cluster {
    cluster_on(&StubDriver::new("none"), n, connector).await
}

async fn cluster_on(driver: &StubDriver, n: usize, connector: &StubConnector) -> Cluster {
    let machines = stub_machines(driver, n).await;
    form_cluster(NonEmpty::from_vec(machines).unwrap(), 1, connector)
        .await
        .unwrap()
}

fn config() -> ComponentsConfig {
    let mut config = ComponentsConfig::default();
    config.database.password = "db-secret".to_string();
    config.api.root_user = "admin".to_string();
    config.api.root_password = "root-secret".to_string();
    config.api.port = 9000;
    config.task_timeout = Duration::from_secs(1);
    config.with_registry_ip(Some(private_ip(1)))
}

struct Recording {
    name: &'static str,
    fail: bool,
    log: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait]
impl Component for Recording {
    fn name(&self) -> &str {
        self.name
    }

    async fn install(
        &self,
        _cluster: &Cluster,
        _config: &ComponentsConfig,
    ) -> Result<(), ComponentError> {
        self.log.lock().push(self.name);
        if self.fail {
            return Err(ComponentError::MissingRegistryCertificate);
        }
        Ok(())
    }
}

#[tokio::test]
async fn installation_stops_at_first_failure() {
    let connector = StubConnector::default();
    let cluster = cluster(1, &connector).await;
    let log = Arc::new(Mutex::new(Vec::new()));
    let components: Vec<_> = [("first", false), ("second", true), ("third", false)]
        .into_iter()
        .map(|(name, fail)| Recording {
            name,
            fail,
            log: Arc::clone(&log),
        })
        .collect();

    let err = install_components(&cluster, &config(), &components)
        .await
        .unwrap_err();

    assert_eq!(err.component, "second");
    assert_eq!(*log.lock(), ["first", "second"]);
}

#[tokio::test]
async fn platform_installs_in_fixed_order() {
    let connector = StubConnector::default();
    let cluster = cluster(2, &connector).await;

    install_components(&cluster, &config(), &PlatformComponent::ALL)
        .await
        .unwrap();

    let state = connector.state.lock();
    assert_eq!(
        state.service_names(),
        ["database", "cache", "router", "registry", "api"]
    );
    for spec in &state.services {
        assert_eq!(spec.networks.len(), 1, "{} not on overlay", spec.name);
    }
}

#[tokio::test]
async fn services_are_wired_to_each_other() {
    let connector = StubConnector::default();
    let cluster = cluster(1, &connector).await;

    install_components(&cluster, &config(), &PlatformComponent::ALL)
        .await
        .unwrap();

    let state = connector.state.lock();
    let database = state.service("database").unwrap();
    assert_eq!(database.env["POSTGRES_PASSWORD"], "db-secret");
    assert!(database.ports.is_empty());

    let router = state.service("router").unwrap();
    let published: Vec<_> = router.ports.iter().map(|p| p.published).collect();
    assert_eq!(published, [80, 443]);

    let api = state.service("api").unwrap();
    assert!(api.env["DATABASE_URL"].starts_with("postgres://"));
    assert!(api.env["DATABASE_URL"].ends_with("@database:5432/flotilla"));
    assert_eq!(api.env["REDIS_URL"], "redis://cache:6379");
    assert_eq!(api.env["ROUTER_DOMAIN"], "203.0.113.1.nip.io");
    assert_eq!(api.env["REGISTRY_ADDRESS"], "10.0.0.1:5000");
    assert_eq!(api.env["PORT"], "9000");
}

#[tokio::test]
async fn database_data_dir_is_created_on_the_leader() {
    let connector = StubConnector::default();
    let driver = StubDriver::new("none");
    let cluster = cluster_on(&driver, 2, &connector).await;

    install_components(&cluster, &config(), &[PlatformComponent::Database])
        .await
        .unwrap();

    let leader = driver.remote(0).commands();
    assert!(leader.iter().any(|c| c.contains("mkdir -p /var/lib/flotilla/database")));
    let follower = driver.remote(1).commands();
    assert!(!follower.iter().any(|c| c.contains("/var/lib/flotilla/database")));
}

#[tokio::test]
async fn database_data_dir_failure_skips_the_service() {
    let connector = StubConnector::default();
    let driver = StubDriver::new("none").failing_remote("flotilla/database");
    let cluster = cluster_on(&driver, 1, &connector).await;

    let err = install_components(&cluster, &config(), &[PlatformComponent::Database])
        .await
        .unwrap_err();

    assert_eq!(err.component, "database");
    assert!(matches!(err.source, ComponentError::DataDir { .. }));
    assert!(connector.state.lock().services.is_empty());
}

#[tokio::test]
async fn registry_is_pinned_to_the_certified_node() {
    let connector = StubConnector::default();
    let cluster = cluster(3, &connector).await;
    let config = config().with_registry_ip(Some(private_ip(2)));

    install_components(&cluster, &config, &[PlatformComponent::Registry])
        .await
        .unwrap();

    let state = connector.state.lock();
    let registry = state.service("registry").unwrap();
    assert_eq!(registry.constraints, ["node.hostname==node-2"]);
    assert!(registry.mounts.iter().any(|m| m.target == "/certs" && m.read_only));
}

#[tokio::test]
async fn registry_certificate_for_unknown_address_is_rejected() {
    let connector = StubConnector::default();
    let cluster = cluster(1, &connector).await;
    let config = config().with_registry_ip(Some("10.9.9.9".parse().unwrap()));

    let err = install_components(&cluster, &config, &[PlatformComponent::Registry])
        .await
        .unwrap_err();

    assert!(matches!(
        err.source,
        ComponentError::StaleRegistryCertificate(ip) if ip.to_string() == "10.9.9.9"
    ));
    assert!(connector.state.lock().services.is_empty());
}

#[tokio::test]
async fn registry_without_certificate_is_rejected() {
    let connector = StubConnector::default();
    let cluster = cluster(1, &connector).await;
    let config = config().with_registry_ip(None);

    let err = install_components(&cluster, &config, &[PlatformComponent::Registry])
        .await
        .unwrap_err();
    assert!(matches!(err.source, ComponentError::MissingRegistryCertificate));
}

#[tokio::test]
async fn api_root_user_is_created_through_exec() {
    let connector = StubConnector::default();
    let cluster = cluster(1, &connector).await;

    install_components(&cluster, &config(), &PlatformComponent::ALL)
        .await
        .unwrap();

    let state = connector.state.lock();
    assert_eq!(state.execs.len(), 1);
    let (host, container, request) = &state.execs[0];
    assert_eq!(host, "node-1");
    assert_eq!(container.as_str(), "ctr-api");
    assert_eq!(
        request.stdin.as_deref(),
        Some(b"admin\nroot-secret\nroot-secret\n".as_slice())
    );
}

#[tokio::test]
async fn failed_root_user_creation_is_an_error() {
    let connector = StubConnector::with_behavior(Behavior {
        exec_exit_code: 2,
        ..Default::default()
    });
    let cluster = cluster(1, &connector).await;

    let err = install_components(&cluster, &config(), &PlatformComponent::ALL)
        .await
        .unwrap_err();

    assert_eq!(err.component, "api");
    assert!(matches!(err.source, ComponentError::RootUser { exit_code: 2, .. }));
}

#[tokio::test]
async fn service_failure_names_the_component() {
    let connector = StubConnector::with_behavior(Behavior {
        fail_service: Some("router".to_string()),
        ..Default::default()
    });
    let cluster = cluster(1, &connector).await;

    let err = install_components(&cluster, &config(), &PlatformComponent::ALL)
        .await
        .unwrap_err();

    assert_eq!(err.component, "router");
    assert_eq!(connector.state.lock().service_names(), ["database", "cache"]);
}

#[tokio::test]
async fn router_domain_prefers_configuration() {
    let connector = StubConnector::default();
    let cluster = cluster(1, &connector).await;

    let mut config = config();
    assert_eq!(router_domain(&cluster, &config), "203.0.113.1.nip.io");
    config.router.domain = Some("apps.example.com".to_string());
    assert_eq!(router_domain(&cluster, &config), "apps.example.com");
}

#[tokio::test]
async fn status_reports_published_ports() {
    let connector = StubConnector::default();
    let cluster = cluster(1, &connector).await;
    install_components(&cluster, &config(), &PlatformComponent::ALL)
        .await
        .unwrap();

    let status = PlatformComponent::Router.status(&cluster).await.unwrap();
    assert_eq!(status.name, "router");
    assert_eq!(status.replicas, 1);
    assert_eq!(status.published_ports.len(), 2);
}
