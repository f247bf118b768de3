// ABOUTME: Best-effort removal of engine firewall rules that break overlay traffic.
// ABOUTME: Failures become diagnostics warnings; they never fail the install.

use crate::diagnostics::{Diagnostics, Warning};
use crate::machine::Machine;

/// Isolation rules the engine installs that drop traffic leaving through the gateway bridge.
pub const CONFLICTING_RULES: [&str; 2] = [
    "iptables -D DOCKER-ISOLATION-STAGE-2 -o docker_gwbridge -j DROP",
    "iptables -D DOCKER-ISOLATION-STAGE-1 -i docker_gwbridge ! -o docker_gwbridge -j DOCKER-ISOLATION-STAGE-2",
];

/// Delete [`CONFLICTING_RULES`] on every machine.
pub async fn apply_network_fixups(machines: &[Machine], diagnostics: &mut Diagnostics) {
    for machine in machines {
        for rule in CONFLICTING_RULES {
            match machine.run_privileged(rule).await {
                Ok(_) => tracing::debug!("{}: {}", machine.name(), rule),
                Err(e) => diagnostics.warn(Warning::network_fixup(format!(
                    "{}: `{}` failed: {}",
                    machine.name(),
                    rule,
                    e
                ))),
            }
        }
    }
}
