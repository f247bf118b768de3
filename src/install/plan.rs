// ABOUTME: Bootstrap plan: which nodes the control plane registers and how many it creates.
// ABOUTME: Derived from the driver kind, the dedicated-hosts flag and the host counts.

use crate::driver::DriverKind;
use crate::machine::Machine;
use serde::Serialize;
use std::net::IpAddr;

/// Work handed to the control plane once it answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootstrapPlan {
    /// Existing machines to register as application nodes.
    pub nodes_to_register: Vec<IpAddr>,
    /// Application nodes the control plane should create itself.
    pub nodes_to_create: usize,
}

/// Host layout of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostLayout {
    pub core_hosts: usize,
    pub apps_hosts: usize,
    /// Application workloads get their own machines instead of sharing the core ones.
    pub dedicated_hosts: bool,
}

impl HostLayout {
    /// Core machines that double as application nodes.
    pub fn shared_hosts(&self) -> usize {
        if self.dedicated_hosts {
            0
        } else {
            self.apps_hosts.min(self.core_hosts)
        }
    }

    /// Application machines that do not exist yet.
    pub fn missing_hosts(&self) -> usize {
        if self.dedicated_hosts {
            self.apps_hosts
        } else {
            self.apps_hosts.saturating_sub(self.core_hosts)
        }
    }
}

impl BootstrapPlan {
    pub fn new(kind: DriverKind, layout: HostLayout, core: &[Machine]) -> Self {
        let nodes_to_register = core
            .iter()
            .take(layout.shared_hosts())
            .map(Machine::private_ip)
            .collect();

        // Local VMs are unreachable from the control plane's own driver; the pool is
        // provisioned here and registered afterwards.
        let nodes_to_create = match kind {
            DriverKind::LocalVm => 0,
            DriverKind::Remote => layout.missing_hosts(),
        };

        Self {
            nodes_to_register,
            nodes_to_create,
        }
    }

    /// Number of machines this run must provision after bootstrap.
    pub fn local_pool_size(kind: DriverKind, layout: HostLayout) -> usize {
        match kind {
            DriverKind::LocalVm => layout.missing_hosts(),
            DriverKind::Remote => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(core: usize, apps: usize, dedicated: bool) -> HostLayout {
        HostLayout {
            core_hosts: core,
            apps_hosts: apps,
            dedicated_hosts: dedicated,
        }
    }

    #[test]
    fn shared_hosts_never_exceed_core() {
        assert_eq!(layout(3, 1, false).shared_hosts(), 1);
        assert_eq!(layout(1, 5, false).shared_hosts(), 1);
        assert_eq!(layout(1, 5, true).shared_hosts(), 0);
    }

    #[test]
    fn missing_hosts_saturates() {
        assert_eq!(layout(3, 1, false).missing_hosts(), 0);
        assert_eq!(layout(1, 5, false).missing_hosts(), 4);
        assert_eq!(layout(3, 2, true).missing_hosts(), 2);
    }

    #[test]
    fn remote_driver_creates_nothing_locally() {
        assert_eq!(
            BootstrapPlan::local_pool_size(DriverKind::Remote, layout(1, 5, false)),
            0
        );
        assert_eq!(
            BootstrapPlan::local_pool_size(DriverKind::LocalVm, layout(1, 5, false)),
            4
        );
    }

    #[test]
    fn empty_core_registers_nothing() {
        let plan = BootstrapPlan::new(DriverKind::Remote, layout(0, 2, false), &[]);
        assert!(plan.nodes_to_register.is_empty());
        assert_eq!(plan.nodes_to_create, 2);
    }
}
