// ABOUTME: Certificate lifecycle for a run: root CA, server, client and registry certs.
// ABOUTME: Material lives under <store>/<run>/ and is generated once, then reused.

mod authority;
mod registry;

pub use authority::{
    CertificateAuthority, ClientCertificate, IssuedCertificate, ServerCertificate,
};
pub use registry::{
    REGISTRY_PORT, RegistryCertificate, bound_ip_from_pem, san_names_from_pem,
    upload_registry_certificate,
};

use crate::types::{MachineName, TargetName};
use std::io;
use std::path::{Path, PathBuf};

pub const CA_CERT_FILE: &str = "ca.pem";
pub const CA_KEY_FILE: &str = "ca-key.pem";
pub const CLIENT_CERT_FILE: &str = "cert.pem";
pub const CLIENT_KEY_FILE: &str = "key.pem";
pub const REGISTRY_CERT_FILE: &str = "registry-cert.pem";
pub const REGISTRY_KEY_FILE: &str = "registry-key.pem";
pub const SERVER_CERT_FILE: &str = "server.pem";
pub const SERVER_KEY_FILE: &str = "server-key.pem";

/// On-disk layout of one run's TLS material.
#[derive(Debug, Clone)]
pub struct CertStore {
    run_dir: PathBuf,
}

impl CertStore {
    pub fn new(store: &Path, run: &TargetName) -> Self {
        Self {
            run_dir: store.join(run.as_str()),
        }
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn certs_dir(&self) -> PathBuf {
        self.run_dir.join("certs")
    }

    pub fn ca_cert(&self) -> PathBuf {
        self.certs_dir().join(CA_CERT_FILE)
    }

    pub fn ca_key(&self) -> PathBuf {
        self.certs_dir().join(CA_KEY_FILE)
    }

    pub fn client_cert(&self) -> PathBuf {
        self.certs_dir().join(CLIENT_CERT_FILE)
    }

    pub fn client_key(&self) -> PathBuf {
        self.certs_dir().join(CLIENT_KEY_FILE)
    }

    pub fn registry_cert(&self) -> PathBuf {
        self.certs_dir().join(REGISTRY_CERT_FILE)
    }

    pub fn registry_key(&self) -> PathBuf {
        self.certs_dir().join(REGISTRY_KEY_FILE)
    }

    pub fn machine_dir(&self, name: &MachineName) -> PathBuf {
        self.run_dir.join("machines").join(name.as_str())
    }
}

/// Errors from certificate generation, storage and distribution.
#[derive(Debug, thiserror::Error)]
pub enum CertError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("certificate generation failed: {0}")]
    Generation(#[from] rcgen::Error),

    #[error("failed to parse {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("invalid subject name {0:?}")]
    InvalidName(String),

    #[error("registry certificate {} carries no IP address", .0.display())]
    NoBoundAddress(PathBuf),

    #[error("failed to distribute certificates: {0}")]
    Upload(#[from] crate::ssh::Error),
}

pub type Result<T> = std::result::Result<T, CertError>;

pub(crate) fn read_pem(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| CertError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn write_pem(path: &Path, contents: &str, private: bool) -> Result<()> {
    let io_err = |source| CertError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, contents).map_err(io_err)?;

    #[cfg(unix)]
    if private {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(io_err)?;
    }
    #[cfg(not(unix))]
    let _ = private;

    Ok(())
}
