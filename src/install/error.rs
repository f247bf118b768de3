// ABOUTME: Install error taxonomy with SNAFU context selectors, one variant per failing phase.
// ABOUTME: InstallFailure pairs the error with the machines left running.

use snafu::Snafu;

use crate::bootstrap::BootstrapError;
use crate::certs::CertError;
use crate::cluster::ClusterError;
use crate::components::ComponentFailure;
use crate::environments::RegistryError;
use crate::machine::{Machine, ProvisionError};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum InstallError {
    #[snafu(display("target \"{name}\" already exists"))]
    TargetExists { name: String },

    #[snafu(display("invalid install options: {reason}"))]
    InvalidOptions { reason: String },

    #[snafu(display("environment registry: {source}"))]
    Environments { source: RegistryError },

    #[snafu(display("preparing certificates failed: {source}"))]
    Setup { source: ProvisionError },

    #[snafu(display("provisioning core machine {index} failed: {source}"))]
    ProvisionCore {
        index: usize,
        source: ProvisionError,
    },

    #[snafu(display("forming cluster failed: {source}"))]
    FormCluster { source: ClusterError },

    #[snafu(display("reading registry certificate failed: {source}"))]
    RegistryCertificate { source: CertError },

    #[snafu(display("{source}"))]
    InstallComponents { source: ComponentFailure },

    #[snafu(display("bootstrapping control plane at {url} failed: {source}"))]
    Bootstrap { url: String, source: BootstrapError },

    #[snafu(display("provisioning application machine {index} failed: {source}"))]
    ProvisionPool {
        index: usize,
        source: ProvisionError,
    },

    #[snafu(display("registering application machines failed: {source}"))]
    RegisterPool { source: BootstrapError },
}

/// Phase an install failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallErrorKind {
    PreCheck,
    Setup,
    ProvisionCore,
    FormCluster,
    InstallComponents,
    Bootstrap,
    ProvisionPool,
}

impl InstallError {
    pub fn kind(&self) -> InstallErrorKind {
        match self {
            InstallError::TargetExists { .. }
            | InstallError::InvalidOptions { .. }
            | InstallError::Environments { .. } => InstallErrorKind::PreCheck,
            InstallError::Setup { .. } => InstallErrorKind::Setup,
            InstallError::ProvisionCore { .. } => InstallErrorKind::ProvisionCore,
            InstallError::FormCluster { .. } => InstallErrorKind::FormCluster,
            InstallError::RegistryCertificate { .. } | InstallError::InstallComponents { .. } => {
                InstallErrorKind::InstallComponents
            }
            InstallError::Bootstrap { .. } => InstallErrorKind::Bootstrap,
            InstallError::ProvisionPool { .. } | InstallError::RegisterPool { .. } => {
                InstallErrorKind::ProvisionPool
            }
        }
    }

    /// Name of the component that failed, for component install failures.
    pub fn component(&self) -> Option<&str> {
        match self {
            InstallError::InstallComponents { source } => Some(&source.component),
            _ => None,
        }
    }
}

/// A failed install together with every machine it created.
#[derive(Debug)]
pub struct InstallFailure {
    pub error: InstallError,
    pub machines: Vec<Machine>,
}

impl InstallFailure {
    pub fn new(error: InstallError, machines: Vec<Machine>) -> Self {
        Self { error, machines }
    }

    pub fn kind(&self) -> InstallErrorKind {
        self.error.kind()
    }
}

impl std::fmt::Display for InstallFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)?;
        if !self.machines.is_empty() {
            let names: Vec<_> = self.machines.iter().map(|m| m.name().to_string()).collect();
            write!(f, " (machines left running: {})", names.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for InstallFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_exists_message() {
        let err = InstallError::TargetExists {
            name: "prod".to_string(),
        };
        assert_eq!(err.to_string(), "target \"prod\" already exists");
        assert_eq!(err.kind(), InstallErrorKind::PreCheck);
    }

    #[test]
    fn failure_without_machines_is_just_the_error() {
        let failure = InstallFailure::new(
            InstallError::InvalidOptions {
                reason: "core_hosts must be at least 1".to_string(),
            },
            Vec::new(),
        );
        assert_eq!(
            failure.to_string(),
            "invalid install options: core_hosts must be at least 1"
        );
        assert_eq!(failure.kind(), InstallErrorKind::PreCheck);
    }
}
