// ABOUTME: Root CA generation and signing of engine server and client certificates.
// ABOUTME: Uses rcgen; material is written once per run and re-read afterwards.

use super::{
    CertError, CertStore, Result, SERVER_CERT_FILE, SERVER_KEY_FILE, read_pem,
    san_names_from_pem, write_pem,
};
use crate::types::MachineName;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose, SanType, string::Ia5String,
};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

const ORGANIZATION: &str = "flotilla";
const CA_VALIDITY_DAYS: i64 = 3650;
const LEAF_VALIDITY_DAYS: i64 = 1095;

fn validity(days: i64) -> (time::OffsetDateTime, time::OffsetDateTime) {
    let now = time::OffsetDateTime::now_utc();
    (now, now + time::Duration::days(days))
}

fn subject(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, DnValue::Utf8String(common_name.to_string()));
    dn.push(
        DnType::OrganizationName,
        DnValue::Utf8String(ORGANIZATION.to_string()),
    );
    dn
}

fn san(name: &str) -> Result<SanType> {
    if let Ok(ip) = name.parse::<IpAddr>() {
        return Ok(SanType::IpAddress(ip));
    }
    Ia5String::try_from(name.to_string())
        .map(SanType::DnsName)
        .map_err(|_| CertError::InvalidName(name.to_string()))
}

/// A freshly signed certificate with its private key, both PEM encoded.
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub cert_pem: String,
    pub key_pem: String,
}

impl IssuedCertificate {
    pub fn write(&self, cert_path: &Path, key_path: &Path) -> Result<()> {
        write_pem(cert_path, &self.cert_pem, false)?;
        write_pem(key_path, &self.key_pem, true)
    }
}

/// The run's self-signed root CA.
#[derive(Clone)]
pub struct CertificateAuthority {
    cert_pem: String,
    key_pem: String,
}

impl std::fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateAuthority").finish_non_exhaustive()
    }
}

impl CertificateAuthority {
    /// Read the CA from the store, generating and persisting it on first use.
    pub fn load_or_create(store: &CertStore) -> Result<Self> {
        let cert_path = store.ca_cert();
        let key_path = store.ca_key();

        if cert_path.exists() && key_path.exists() {
            let key_pem = read_pem(&key_path)?;
            KeyPair::from_pem(&key_pem).map_err(|e| CertError::Parse {
                path: key_path.clone(),
                reason: e.to_string(),
            })?;
            return Ok(Self {
                cert_pem: read_pem(&cert_path)?,
                key_pem,
            });
        }

        tracing::info!("generating root CA in {}", store.certs_dir().display());
        let ca = Self::generate(&format!("{ORGANIZATION} root CA"))?;
        write_pem(&cert_path, &ca.cert_pem, false)?;
        write_pem(&key_path, &ca.key_pem, true)?;
        Ok(ca)
    }

    pub fn generate(common_name: &str) -> Result<Self> {
        let mut params = CertificateParams::default();
        params.distinguished_name = subject(common_name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        (params.not_before, params.not_after) = validity(CA_VALIDITY_DAYS);

        let key = KeyPair::generate()?;
        let cert = params.self_signed(&key)?;

        Ok(Self {
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
        })
    }

    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    pub fn key_pem(&self) -> &str {
        &self.key_pem
    }

    /// Sign a TLS server certificate covering every name in `sans`.
    pub fn issue_server(&self, common_name: &str, sans: &[String]) -> Result<IssuedCertificate> {
        let mut params = CertificateParams::default();
        params.distinguished_name = subject(common_name);
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        params.subject_alt_names = sans.iter().map(|s| san(s)).collect::<Result<Vec<_>>>()?;
        self.sign(params)
    }

    /// Sign a TLS client certificate.
    pub fn issue_client(&self, common_name: &str) -> Result<IssuedCertificate> {
        let mut params = CertificateParams::default();
        params.distinguished_name = subject(common_name);
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        self.sign(params)
    }

    fn sign(&self, mut params: CertificateParams) -> Result<IssuedCertificate> {
        (params.not_before, params.not_after) = validity(LEAF_VALIDITY_DAYS);

        let key = KeyPair::generate()?;
        let ca_key = KeyPair::from_pem(&self.key_pem)?;
        let issuer = Issuer::from_ca_cert_pem(&self.cert_pem, &ca_key)?;
        let cert = params.signed_by(&key, &issuer)?;

        Ok(IssuedCertificate {
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
        })
    }
}

/// Paths of the per-run client certificate used to talk to every engine.
#[derive(Debug, Clone)]
pub struct ClientCertificate {
    pub ca: PathBuf,
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl ClientCertificate {
    /// Where the client certificate of `store` lives, whether or not it exists yet.
    pub fn locate(store: &CertStore) -> Self {
        Self {
            ca: store.ca_cert(),
            cert: store.client_cert(),
            key: store.client_key(),
        }
    }

    /// Issue the client certificate unless it already exists.
    pub fn ensure(store: &CertStore, ca: &CertificateAuthority) -> Result<Self> {
        let paths = Self::locate(store);
        if !(paths.cert.exists() && paths.key.exists()) {
            tracing::debug!("issuing client certificate");
            ca.issue_client(&format!("{ORGANIZATION} client"))?
                .write(&paths.cert, &paths.key)?;
        }
        Ok(paths)
    }
}

/// Paths of one machine's engine server certificate.
#[derive(Debug, Clone)]
pub struct ServerCertificate {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl ServerCertificate {
    /// Issue the server certificate for `machine` unless one with the same names already exists.
    ///
    /// A stored certificate whose names differ from `sans` is replaced, since a recreated
    /// machine may come back with different addresses.
    pub fn ensure(
        store: &CertStore,
        ca: &CertificateAuthority,
        machine: &MachineName,
        sans: &[String],
    ) -> Result<Self> {
        let dir = store.machine_dir(machine);
        let paths = Self {
            cert: dir.join(SERVER_CERT_FILE),
            key: dir.join(SERVER_KEY_FILE),
        };
        if paths.cert.exists() && paths.key.exists() {
            if paths.names_match(sans)? {
                return Ok(paths);
            }
            tracing::info!(
                "server certificate for {} does not cover {:?}, re-issuing",
                machine,
                sans
            );
        } else {
            tracing::debug!("issuing server certificate for {}", machine);
        }
        ca.issue_server(machine.as_str(), sans)?
            .write(&paths.cert, &paths.key)?;
        Ok(paths)
    }

    fn names_match(&self, sans: &[String]) -> Result<bool> {
        let stored: BTreeSet<String> = san_names_from_pem(&read_pem(&self.cert)?)
            .map_err(|reason| CertError::Parse {
                path: self.cert.clone(),
                reason,
            })?
            .into_iter()
            .collect();
        let wanted: BTreeSet<String> = sans.iter().map(|name| canonical_name(name)).collect();
        Ok(stored == wanted)
    }
}

fn canonical_name(name: &str) -> String {
    name.parse::<IpAddr>()
        .map(|ip| ip.to_string())
        .unwrap_or_else(|_| name.to_string())
}
