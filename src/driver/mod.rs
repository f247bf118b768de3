// ABOUTME: Machine driver abstraction for creating and destroying hosts.
// ABOUTME: Defines the driver trait, option sets, and the handle returned on create.

mod generic;

pub use generic::{GENERIC_DRIVER_NAME, GenericDriver};

use crate::machine::RemoteExec;
use crate::types::MachineName;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

/// Option key carrying a TCP port the driver must open on the new machine.
pub const OPEN_PORT: &str = "open-port";

/// Driver-native clustering switches that must never be enabled.
const SWARM: &str = "swarm";
const SWARM_MASTER: &str = "swarm-master";
const SWARM_DISCOVERY: &str = "swarm-discovery";

const LOCAL_VM_DRIVERS: &[&str] = &[
    "virtualbox",
    "vmwarefusion",
    "vmwareworkstation",
    "hyperv",
    "xhyve",
    "parallels",
];

/// Where a driver's machines live relative to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DriverKind {
    /// Machines reachable from the control plane (cloud or adopted hosts).
    Remote,
    /// Machines running as local VMs on the operator's workstation.
    LocalVm,
}

impl DriverKind {
    pub fn from_name(name: &str) -> Self {
        if LOCAL_VM_DRIVERS.contains(&name) {
            DriverKind::LocalVm
        } else {
            DriverKind::Remote
        }
    }
}

/// A string-keyed option set handed to the driver on create.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverOptions(BTreeMap<String, String>);

impl DriverOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Layer `overrides` on top of `self`; keys in `overrides` win.
    pub fn merged(&self, overrides: &DriverOptions) -> DriverOptions {
        let mut merged = self.clone();
        for (k, v) in overrides.iter() {
            merged.set(k, v);
        }
        merged
    }

    /// Disable the driver's own clustering so formation stays in our hands.
    pub fn without_native_clustering(mut self) -> DriverOptions {
        self.set(SWARM, "false");
        self.set(SWARM_MASTER, "false");
        self.remove(SWARM_DISCOVERY);
        self
    }

    /// The port requested through `open-port`, if any.
    pub fn open_port(&self) -> Result<Option<u16>, DriverError> {
        self.get(OPEN_PORT)
            .map(|raw| {
                raw.parse::<u16>().map_err(|_| DriverError::InvalidOption {
                    key: OPEN_PORT.to_string(),
                    value: raw.to_string(),
                })
            })
            .transpose()
    }
}

impl FromIterator<(String, String)> for DriverOptions {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// What the driver reports back about a freshly created machine.
#[derive(Clone)]
pub struct MachineHandle {
    pub hostname: String,
    pub public_ip: IpAddr,
    pub private_ip: IpAddr,
    pub ssh_user: String,
    pub remote: Arc<dyn RemoteExec>,
}

impl fmt::Debug for MachineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineHandle")
            .field("hostname", &self.hostname)
            .field("public_ip", &self.public_ip)
            .field("private_ip", &self.private_ip)
            .field("ssh_user", &self.ssh_user)
            .finish_non_exhaustive()
    }
}

/// Creates and destroys single machines.
#[async_trait]
pub trait MachineDriver: Send + Sync {
    /// Driver name as written in configuration (`none`, `virtualbox`, ...).
    fn name(&self) -> &str;

    fn kind(&self) -> DriverKind {
        DriverKind::from_name(self.name())
    }

    async fn create(
        &self,
        name: &MachineName,
        options: &DriverOptions,
    ) -> Result<MachineHandle, DriverError>;

    async fn remove(&self, name: &MachineName) -> Result<(), DriverError>;
}

/// Errors from machine drivers.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("no unclaimed host left for machine {0}")]
    NoCapacity(String),

    #[error("unknown machine: {0}")]
    UnknownMachine(String),

    #[error("invalid driver option {key}={value}")]
    InvalidOption { key: String, value: String },

    #[error("could not resolve address of {host}: {reason}")]
    AddressResolution { host: String, reason: String },

    #[error("ssh: {0}")]
    Ssh(#[from] crate::ssh::Error),

    #[error("driver error: {0}")]
    Other(String),
}
