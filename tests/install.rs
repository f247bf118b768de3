// ABOUTME: End-to-end tests of the installer against stub collaborators.
// ABOUTME: Covers the phase sequence, the bootstrap plan and failure reporting.

mod support;

use flotilla::diagnostics::WarningKind;
use flotilla::environments::{EnvironmentRegistry, EnvironmentState};
use flotilla::install::{CONFLICTING_RULES, InstallErrorKind, teardown};
use support::harness::Harness;
use support::stubs::*;

#[tokio::test]
async fn single_host_install_runs_every_phase() {
    support::init_tracing();
    let harness = Harness::new(StubDriver::new("none"));
    let options = harness.options("prod", 1, 1, false);

    let installation = harness.installer().install(&options).await.unwrap();

    assert_eq!(installation.machines.len(), 1);
    let cluster = &installation.cluster;
    assert_eq!(cluster.manager_count(), 1);
    assert_eq!(cluster.worker_count(), 1);
    assert_eq!(cluster.leader().name().as_str(), "prod-1");

    assert_eq!(
        harness.connector.state.lock().service_names(),
        ["database", "cache", "router", "registry", "api"]
    );

    assert_eq!(installation.control_plane_url, "http://203.0.113.1:9000");
    assert_eq!(installation.plan.nodes_to_register, [private_ip(1)]);
    assert_eq!(installation.plan.nodes_to_create, 0);

    let bootstraps = harness.bootstrapper.bootstraps();
    assert_eq!(bootstraps.len(), 1);
    assert_eq!(bootstraps[0].0, "http://203.0.113.1:9000");
    assert_eq!(bootstraps[0].1, installation.plan);
    assert!(harness.bootstrapper.registrations().is_empty());

    assert!(!installation.diagnostics.has_warnings());

    let environments = harness.environments.list().unwrap();
    assert_eq!(environments.len(), 1);
    assert_eq!(environments[0].state, EnvironmentState::Ready);
    assert_eq!(
        environments[0].control_plane_url.as_deref(),
        Some("http://203.0.113.1:9000")
    );

    let summary = installation.summary().await.unwrap();
    assert_eq!(summary.nodes.len(), 1);
    assert_eq!(summary.nodes[0].ip, "203.0.113.1");
    assert!(summary.nodes[0].manager);
    assert_eq!(summary.components.len(), 5);
}

#[tokio::test]
async fn core_machines_open_the_control_plane_port() {
    let harness = Harness::new(StubDriver::new("none"));
    let options = harness.options("prod", 2, 0, false);

    harness.installer().install(&options).await.unwrap();

    for options in harness.driver.created_options() {
        assert_eq!(options.get("open-port"), Some("9000"));
        assert_eq!(options.get("region"), Some("test-1"));
        assert_eq!(options.get("swarm"), Some("false"));
    }
}

#[tokio::test]
async fn existing_target_is_rejected_before_any_machine() {
    let harness = Harness::new(StubDriver::new("none"));
    harness.environments.record("prod").unwrap();

    let failure = harness
        .installer()
        .install(&harness.options("prod", 1, 0, false))
        .await
        .unwrap_err();

    assert_eq!(failure.kind(), InstallErrorKind::PreCheck);
    assert!(failure.to_string().contains("target \"prod\" already exists"));
    assert!(failure.machines.is_empty());
    assert_eq!(harness.driver.create_calls(), 0);
}

#[tokio::test]
async fn repeated_install_of_a_recorded_target_is_rejected() {
    let harness = Harness::new(StubDriver::new("none"));
    let options = harness.options("prod", 1, 0, false);

    harness.installer().install(&options).await.unwrap();
    let failure = harness.installer().install(&options).await.unwrap_err();

    assert_eq!(failure.kind(), InstallErrorKind::PreCheck);
    assert_eq!(harness.driver.create_calls(), 1);
}

#[tokio::test]
async fn invalid_options_are_rejected_and_not_recorded() {
    let harness = Harness::new(StubDriver::new("none"));
    let options = harness.options("prod", 0, 0, false);

    let failure = harness.installer().install(&options).await.unwrap_err();

    assert_eq!(failure.kind(), InstallErrorKind::PreCheck);
    assert!(!harness.environments.contains("prod").unwrap());
}

#[tokio::test]
async fn remote_driver_asks_control_plane_for_missing_hosts() {
    let harness = Harness::new(StubDriver::new("none"));
    let options = harness.options("prod", 2, 5, false);

    let installation = harness.installer().install(&options).await.unwrap();

    assert_eq!(
        installation.plan.nodes_to_register,
        [private_ip(1), private_ip(2)]
    );
    assert_eq!(installation.plan.nodes_to_create, 3);
    assert_eq!(harness.driver.create_calls(), 2);
    assert!(harness.bootstrapper.registrations().is_empty());
}

#[tokio::test]
async fn dedicated_hosts_share_no_core_machine() {
    let harness = Harness::new(StubDriver::new("none"));
    let options = harness.options("prod", 1, 2, true);

    let installation = harness.installer().install(&options).await.unwrap();

    assert!(installation.plan.nodes_to_register.is_empty());
    assert_eq!(installation.plan.nodes_to_create, 2);
}

#[tokio::test]
async fn local_vm_pool_is_provisioned_and_registered() {
    let harness = Harness::new(StubDriver::new("virtualbox"));
    let options = harness.options("dev", 1, 3, false);

    let installation = harness.installer().install(&options).await.unwrap();

    assert_eq!(installation.plan.nodes_to_create, 0);
    assert_eq!(installation.machines.len(), 3);
    assert_eq!(installation.cluster.worker_count(), 1);

    let registrations = harness.bootstrapper.registrations();
    assert_eq!(registrations.len(), 1);
    assert_eq!(registrations[0].1, [private_ip(2), private_ip(3)]);

    // Pool machines do not publish the control-plane port.
    let created = harness.driver.created_options();
    assert_eq!(created[0].get("open-port"), Some("9000"));
    assert_eq!(created[1].get("open-port"), None);
}

#[tokio::test]
async fn provision_failure_reports_machines_created_so_far() {
    let harness = Harness::new(StubDriver::new("none").failing_create_at(2));
    let options = harness.options("prod", 3, 0, false);

    let failure = harness.installer().install(&options).await.unwrap_err();

    assert_eq!(failure.kind(), InstallErrorKind::ProvisionCore);
    let names: Vec<_> = failure.machines.iter().map(|m| m.name().as_str()).collect();
    assert_eq!(names, ["prod-1"]);
    let message = failure.to_string();
    assert!(message.contains("core machine 2"));
    assert!(message.contains("machines left running: prod-1"));
    assert!(harness.connector.connected().is_empty());
}

#[tokio::test]
async fn machine_failing_tls_fixup_is_reported_as_running() {
    let harness =
        Harness::new(StubDriver::new("none").failing_remote("systemctl restart docker"));
    let options = harness.options("prod", 1, 0, false);

    let failure = harness.installer().install(&options).await.unwrap_err();

    assert_eq!(failure.kind(), InstallErrorKind::ProvisionCore);
    let names: Vec<_> = failure.machines.iter().map(|m| m.name().as_str()).collect();
    assert_eq!(names, ["prod-1"]);
    assert!(failure.to_string().contains("machines left running: prod-1"));
}

#[tokio::test]
async fn formation_failure_keeps_every_core_machine() {
    let connector = StubConnector::with_behavior(Behavior {
        fail_join_on: Some("node-2".to_string()),
        ..Default::default()
    });
    let harness = Harness::with(
        StubDriver::new("none"),
        connector,
        StubBootstrapper::default(),
    );

    let failure = harness
        .installer()
        .install(&harness.options("prod", 2, 0, false))
        .await
        .unwrap_err();

    assert_eq!(failure.kind(), InstallErrorKind::FormCluster);
    assert_eq!(failure.machines.len(), 2);
    assert!(harness.connector.state.lock().services.is_empty());
}

#[tokio::test]
async fn component_failure_names_the_component() {
    let connector = StubConnector::with_behavior(Behavior {
        fail_service: Some("cache".to_string()),
        ..Default::default()
    });
    let harness = Harness::with(
        StubDriver::new("none"),
        connector,
        StubBootstrapper::default(),
    );

    let failure = harness
        .installer()
        .install(&harness.options("prod", 1, 0, false))
        .await
        .unwrap_err();

    assert_eq!(failure.kind(), InstallErrorKind::InstallComponents);
    assert_eq!(failure.error.component(), Some("cache"));
    assert!(harness.bootstrapper.bootstraps().is_empty());
}

#[tokio::test]
async fn bootstrap_failure_leaves_environment_installing() {
    let harness = Harness::with(
        StubDriver::new("none"),
        StubConnector::default(),
        StubBootstrapper::failing(),
    );

    let failure = harness
        .installer()
        .install(&harness.options("prod", 1, 1, false))
        .await
        .unwrap_err();

    assert_eq!(failure.kind(), InstallErrorKind::Bootstrap);
    assert_eq!(failure.machines.len(), 1);
    assert!(failure.to_string().contains("http://203.0.113.1:9000"));

    let environments = harness.environments.list().unwrap();
    assert_eq!(environments[0].state, EnvironmentState::Installing);
}

#[tokio::test]
async fn network_fixup_failures_are_warnings() {
    let harness = Harness::new(StubDriver::new("none").failing_remote("DOCKER-ISOLATION"));

    let installation = harness
        .installer()
        .install(&harness.options("prod", 2, 0, false))
        .await
        .unwrap();

    let warnings = installation.diagnostics.warnings();
    assert_eq!(warnings.len(), CONFLICTING_RULES.len() * 2);
    assert!(warnings.iter().all(|w| w.kind == WarningKind::NetworkFixup));
    assert!(warnings[0].message.contains("prod-1"));
}

#[tokio::test]
async fn teardown_continues_past_failures() {
    let harness = Harness::new(StubDriver::new("none").failing_remove("prod-2"));
    let installation = harness
        .installer()
        .install(&harness.options("prod", 3, 0, false))
        .await
        .unwrap();

    let failed = teardown(harness.driver.as_ref(), &installation.machines).await;

    let failed: Vec<_> = failed.iter().map(|n| n.as_str()).collect();
    assert_eq!(failed, ["prod-2"]);
    let removed: Vec<_> = harness
        .driver
        .removed()
        .iter()
        .map(|n| n.to_string())
        .collect();
    assert_eq!(removed, ["prod-1", "prod-3"]);
}
