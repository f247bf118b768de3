// ABOUTME: The "none" driver: adopts pre-existing hosts reachable over SSH.
// ABOUTME: Each create claims the next unused host; remove releases it.

use super::{DriverError, DriverOptions, MachineDriver, MachineHandle};
use crate::config::HostConfig;
use crate::machine::{RemoteExec, privileged};
use crate::ssh::{Session, SessionConfig};
use crate::types::MachineName;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

pub const GENERIC_DRIVER_NAME: &str = "none";

/// Driver over a fixed list of hosts the operator already runs.
pub struct GenericDriver {
    hosts: Vec<HostConfig>,
    known_hosts: Option<PathBuf>,
    slots: Mutex<Vec<Option<MachineName>>>,
    sessions: Mutex<HashMap<MachineName, Arc<Session>>>,
}

impl std::fmt::Debug for GenericDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericDriver")
            .field("hosts", &self.hosts)
            .finish_non_exhaustive()
    }
}

impl GenericDriver {
    pub fn new(hosts: Vec<HostConfig>) -> Self {
        let slots = Mutex::new(vec![None; hosts.len()]);
        Self {
            hosts,
            known_hosts: None,
            slots,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts = Some(path.into());
        self
    }

    fn claim(&self, name: &MachineName) -> Result<usize, DriverError> {
        let mut slots = self.slots.lock();
        let index = slots
            .iter()
            .position(Option::is_none)
            .ok_or_else(|| DriverError::NoCapacity(name.to_string()))?;
        slots[index] = Some(name.clone());
        Ok(index)
    }

    fn release(&self, name: &MachineName) -> bool {
        let mut slots = self.slots.lock();
        match slots.iter_mut().find(|slot| slot.as_ref() == Some(name)) {
            Some(slot) => {
                *slot = None;
                true
            }
            None => false,
        }
    }

    async fn adopt(
        &self,
        host: &HostConfig,
        options: &DriverOptions,
    ) -> Result<(MachineHandle, Arc<Session>), DriverError> {
        let user = host.user_or_default();
        let mut config = SessionConfig::new(&host.host, &user)
            .port(host.port)
            .trust_on_first_use(host.trust_first_connection);
        if let Some(key) = &host.key {
            config = config.key_path(key);
        }
        if let Some(path) = &self.known_hosts {
            config = config.known_hosts_path(path);
        }

        let session = Arc::new(Session::connect(config).await?);

        let public_ip = resolve_public_ip(host).await?;
        let hostname = session.run("hostname").await?.trim().to_string();
        let private_ip = match host.private_ip {
            Some(ip) => ip,
            None => {
                let out = session.run("hostname -I").await?;
                first_address(&out).ok_or_else(|| DriverError::AddressResolution {
                    host: host.host.clone(),
                    reason: format!("no address in `hostname -I` output: {:?}", out.trim()),
                })?
            }
        };

        if let Some(port) = options.open_port()? {
            tracing::debug!("opening port {} on {}", port, host.host);
            let rule = format!("INPUT -p tcp --dport {port} -j ACCEPT");
            session
                .run(&privileged(
                    &user,
                    &format!("sh -c 'iptables -C {rule} 2>/dev/null || iptables -I {rule}'"),
                ))
                .await?;
        }

        let handle = MachineHandle {
            hostname,
            public_ip,
            private_ip,
            ssh_user: user,
            remote: session.clone(),
        };
        Ok((handle, session))
    }
}

#[async_trait]
impl MachineDriver for GenericDriver {
    fn name(&self) -> &str {
        GENERIC_DRIVER_NAME
    }

    async fn create(
        &self,
        name: &MachineName,
        options: &DriverOptions,
    ) -> Result<MachineHandle, DriverError> {
        let index = self.claim(name)?;
        let host = &self.hosts[index];
        tracing::debug!("adopting {} as {}", host.host, name);

        match self.adopt(host, options).await {
            Ok((handle, session)) => {
                self.sessions.lock().insert(name.clone(), session);
                Ok(handle)
            }
            Err(e) => {
                self.release(name);
                Err(e)
            }
        }
    }

    async fn remove(&self, name: &MachineName) -> Result<(), DriverError> {
        if !self.release(name) {
            return Err(DriverError::UnknownMachine(name.to_string()));
        }
        let session = self.sessions.lock().remove(name);
        if let Some(session) = session
            && let Err(e) = session.disconnect().await
        {
            tracing::warn!("failed to disconnect from {}: {}", name, e);
        }
        Ok(())
    }
}

async fn resolve_public_ip(host: &HostConfig) -> Result<IpAddr, DriverError> {
    if let Ok(ip) = host.host.parse::<IpAddr>() {
        return Ok(ip);
    }
    let mut addrs = tokio::net::lookup_host((host.host.as_str(), host.port))
        .await
        .map_err(|e| DriverError::AddressResolution {
            host: host.host.clone(),
            reason: e.to_string(),
        })?;
    addrs
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| DriverError::AddressResolution {
            host: host.host.clone(),
            reason: "no addresses returned".to_string(),
        })
}

/// First parseable address in whitespace-separated `hostname -I` output.
fn first_address(output: &str) -> Option<IpAddr> {
    output
        .split_whitespace()
        .find_map(|token| token.parse::<IpAddr>().ok())
}
