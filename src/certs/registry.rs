// ABOUTME: Registry certificate bound to one node IP, created by the first writer.
// ABOUTME: Also distributes registry and CA material to a machine over SSH.

use super::{
    CA_CERT_FILE, CA_KEY_FILE, CLIENT_CERT_FILE, CLIENT_KEY_FILE, CertError, CertStore,
    CertificateAuthority, REGISTRY_CERT_FILE, REGISTRY_KEY_FILE, Result, read_pem,
};
use crate::machine::{Machine, socket_addr, write_remote_file};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;
use x509_parser::prelude::*;

pub const REGISTRY_PORT: u16 = 5000;

const REMOTE_REGISTRY_DIR: &str = "/etc/flotilla/registry";
const REMOTE_REGISTRY_DATA_DIR: &str = "/var/lib/flotilla/registry";
const REMOTE_TRUST_ANCHOR: &str = "/usr/local/share/ca-certificates/flotilla-ca.crt";

/// The registry's TLS certificate and the node IP it is bound to.
#[derive(Debug, Clone)]
pub struct RegistryCertificate {
    bound_ip: IpAddr,
    cert: PathBuf,
    key: PathBuf,
}

impl RegistryCertificate {
    /// Return the existing certificate, or create one bound to `node_ip`.
    ///
    /// Once the file exists its bound IP wins over `node_ip`.
    pub fn ensure(store: &CertStore, ca: &CertificateAuthority, node_ip: IpAddr) -> Result<Self> {
        if let Some(existing) = Self::load(store)? {
            if existing.bound_ip != node_ip {
                tracing::debug!(
                    "registry certificate already bound to {}, not {}",
                    existing.bound_ip,
                    node_ip
                );
            }
            return Ok(existing);
        }

        tracing::info!("issuing registry certificate bound to {}", node_ip);
        let cert = store.registry_cert();
        let key = store.registry_key();
        ca.issue_server("registry", &[node_ip.to_string(), "localhost".to_string()])?
            .write(&cert, &key)?;

        Ok(Self {
            bound_ip: node_ip,
            cert,
            key,
        })
    }

    /// Read the registry certificate if one exists.
    pub fn load(store: &CertStore) -> Result<Option<Self>> {
        let cert = store.registry_cert();
        if !cert.exists() {
            return Ok(None);
        }
        let pem = read_pem(&cert)?;
        let bound_ip = bound_ip_from_pem(&pem)
            .map_err(|reason| CertError::Parse {
                path: cert.clone(),
                reason,
            })?
            .ok_or_else(|| CertError::NoBoundAddress(cert.clone()))?;

        Ok(Some(Self {
            bound_ip,
            cert,
            key: store.registry_key(),
        }))
    }

    pub fn bound_ip(&self) -> IpAddr {
        self.bound_ip
    }

    /// `<bound-ip>:5000`
    pub fn address(&self) -> String {
        socket_addr(self.bound_ip, REGISTRY_PORT)
    }

    pub fn cert_path(&self) -> &PathBuf {
        &self.cert
    }

    pub fn key_path(&self) -> &PathBuf {
        &self.key
    }
}

/// First IP address in a certificate's subject alternative names.
pub fn bound_ip_from_pem(pem_data: &str) -> std::result::Result<Option<IpAddr>, String> {
    let parsed = ::pem::parse(pem_data.as_bytes()).map_err(|e| e.to_string())?;
    let (_, cert) = X509Certificate::from_der(parsed.contents()).map_err(|e| e.to_string())?;
    let Some(sans) = cert.subject_alternative_name().map_err(|e| e.to_string())? else {
        return Ok(None);
    };

    Ok(sans
        .value
        .general_names
        .iter()
        .find_map(|name| match name {
            GeneralName::IPAddress(bytes) => ip_from_bytes(bytes),
            _ => None,
        }))
}

/// Every IP and DNS subject alternative name of a PEM certificate, IPs in canonical form.
pub fn san_names_from_pem(pem_data: &str) -> std::result::Result<Vec<String>, String> {
    let parsed = ::pem::parse(pem_data.as_bytes()).map_err(|e| e.to_string())?;
    let (_, cert) = X509Certificate::from_der(parsed.contents()).map_err(|e| e.to_string())?;
    let Some(sans) = cert.subject_alternative_name().map_err(|e| e.to_string())? else {
        return Ok(Vec::new());
    };

    Ok(sans
        .value
        .general_names
        .iter()
        .filter_map(|name| match name {
            GeneralName::IPAddress(bytes) => ip_from_bytes(bytes).map(|ip| ip.to_string()),
            GeneralName::DNSName(dns) => Some(dns.to_string()),
            _ => None,
        })
        .collect())
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().ok()?;
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().ok()?;
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}

/// Make `machine` trust the run's registry, creating the registry certificate if needed.
pub async fn upload_registry_certificate(
    store: &CertStore,
    ca: &CertificateAuthority,
    machine: &Machine,
) -> Result<RegistryCertificate> {
    let registry = RegistryCertificate::ensure(store, ca, machine.private_ip())?;
    let certs_dir = store.certs_dir();
    let user = machine.ssh_user();
    let remote = machine.remote();

    machine
        .run_privileged(&format!("mkdir -p {REMOTE_REGISTRY_DIR}"))
        .await?;

    for file in [
        REGISTRY_CERT_FILE,
        REGISTRY_KEY_FILE,
        CA_CERT_FILE,
        CA_KEY_FILE,
        CLIENT_CERT_FILE,
        CLIENT_KEY_FILE,
    ] {
        let dest = format!("{REMOTE_REGISTRY_DIR}/{file}");
        write_remote_file(remote, user, &certs_dir.join(file), &dest).await?;
    }

    let docker_trust_dir = format!("/etc/docker/certs.d/{}", registry.address());
    machine
        .run_privileged(&format!("mkdir -p {docker_trust_dir}"))
        .await?;
    machine
        .run_privileged(&format!(
            "cp {REMOTE_REGISTRY_DIR}/{CA_CERT_FILE} {docker_trust_dir}/ca.crt"
        ))
        .await?;
    machine
        .run_privileged(&format!(
            "cp {REMOTE_REGISTRY_DIR}/{CA_CERT_FILE} {REMOTE_TRUST_ANCHOR}"
        ))
        .await?;
    machine.run_privileged("update-ca-certificates").await?;
    machine
        .run_privileged(&format!("mkdir -p {REMOTE_REGISTRY_DATA_DIR}"))
        .await?;

    tracing::debug!(
        "{} trusts registry at {}",
        machine.name(),
        registry.address()
    );
    Ok(registry)
}
