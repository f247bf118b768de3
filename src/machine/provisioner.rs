// ABOUTME: Creates one machine at a time through the driver and fixes up its TLS identity.
// ABOUTME: After creation the engine listens on 2376 with mutual TLS and trusts the registry.

use super::{ENGINE_TLS_PORT, Machine, write_remote_bytes, write_remote_file};
use crate::certs::{
    self, CertError, CertStore, CertificateAuthority, ClientCertificate, RegistryCertificate,
    ServerCertificate, upload_registry_certificate,
};
use crate::driver::{DriverError, DriverOptions, MachineDriver};
use crate::ssh;
use crate::types::{MachineName, MachineNamer, TargetName};
use std::fmt;
use std::sync::Arc;

const REMOTE_DOCKER_DIR: &str = "/etc/docker";
const DROP_IN_DIR: &str = "/etc/systemd/system/docker.service.d";
const DROP_IN_FILE: &str = "10-flotilla-tls.conf";

/// The provisioning step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStep {
    Create,
    TlsFixup,
    RegistryTrust,
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProvisionStep::Create => "create",
            ProvisionStep::TlsFixup => "TLS fix-up",
            ProvisionStep::RegistryTrust => "registry trust",
        })
    }
}

/// Errors from provisioning a single machine.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("failed to create machine {machine}: {source}")]
    Create {
        machine: MachineName,
        #[source]
        source: DriverError,
    },

    #[error("{step} failed on {}: {source}", machine.name())]
    Certificates {
        machine: Box<Machine>,
        step: ProvisionStep,
        #[source]
        source: CertError,
    },

    #[error("{step} failed on {}: {source}", machine.name())]
    Remote {
        machine: Box<Machine>,
        step: ProvisionStep,
        #[source]
        source: ssh::Error,
    },

    #[error("certificate setup failed: {0}")]
    Setup(#[from] CertError),
}

impl ProvisionError {
    /// The machine the failure happened on, if one had been named yet.
    pub fn machine(&self) -> Option<&MachineName> {
        match self {
            ProvisionError::Create { machine, .. } => Some(machine),
            ProvisionError::Certificates { machine, .. } | ProvisionError::Remote { machine, .. } => {
                Some(machine.name())
            }
            ProvisionError::Setup(_) => None,
        }
    }

    /// The machine the driver created before a later step failed. It is still running.
    pub fn created_machine(&self) -> Option<&Machine> {
        match self {
            ProvisionError::Certificates { machine, .. } | ProvisionError::Remote { machine, .. } => {
                Some(machine.as_ref())
            }
            ProvisionError::Create { .. } | ProvisionError::Setup(_) => None,
        }
    }

    pub fn step(&self) -> Option<ProvisionStep> {
        match self {
            ProvisionError::Create { .. } => Some(ProvisionStep::Create),
            ProvisionError::Certificates { step, .. } | ProvisionError::Remote { step, .. } => {
                Some(*step)
            }
            ProvisionError::Setup(_) => None,
        }
    }
}

/// Wraps a driver to create machines that belong to one run.
pub struct Provisioner {
    driver: Arc<dyn MachineDriver>,
    store: CertStore,
    ca: CertificateAuthority,
    namer: MachineNamer,
    options: DriverOptions,
}

impl fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provisioner")
            .field("driver", &self.driver.name())
            .field("store", &self.store)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Provisioner {
    /// Prepare a provisioner, creating the run CA and client certificate if needed.
    pub fn new(
        driver: Arc<dyn MachineDriver>,
        store: CertStore,
        run: TargetName,
        options: DriverOptions,
    ) -> Result<Self, ProvisionError> {
        let ca = CertificateAuthority::load_or_create(&store)?;
        // Engine connections read the client certificate from the store.
        ClientCertificate::ensure(&store, &ca)?;
        Ok(Self {
            driver,
            store,
            ca,
            namer: MachineNamer::new(run),
            options,
        })
    }

    pub fn driver(&self) -> &Arc<dyn MachineDriver> {
        &self.driver
    }

    pub fn store(&self) -> &CertStore {
        &self.store
    }

    /// Registry certificate, once some machine has created it.
    pub fn registry_certificate(&self) -> Result<Option<RegistryCertificate>, CertError> {
        RegistryCertificate::load(&self.store)
    }

    /// Create one machine. A machine that fails after creation is left running.
    pub async fn provision(&self, overrides: &DriverOptions) -> Result<Machine, ProvisionError> {
        let options = self.options.merged(overrides).without_native_clustering();
        let name = self.namer.next_name();

        tracing::info!("creating machine {} with driver {}", name, self.driver.name());
        let handle = self
            .driver
            .create(&name, &options)
            .await
            .map_err(|source| ProvisionError::Create {
                machine: name.clone(),
                source,
            })?;

        let tls_dir = self.store.machine_dir(&name);
        let machine = Machine::new(name, handle, tls_dir, options);

        self.fix_tls(&machine).await?;

        upload_registry_certificate(&self.store, &self.ca, &machine)
            .await
            .map_err(|source| ProvisionError::Certificates {
                machine: Box::new(machine.clone()),
                step: ProvisionStep::RegistryTrust,
                source,
            })?;

        tracing::info!(
            "machine {} ready at {} ({})",
            machine.name(),
            machine.public_ip(),
            machine.private_ip()
        );
        Ok(machine)
    }

    async fn fix_tls(&self, machine: &Machine) -> Result<(), ProvisionError> {
        let cert_err = |source| ProvisionError::Certificates {
            machine: Box::new(machine.clone()),
            step: ProvisionStep::TlsFixup,
            source,
        };
        let remote_err = |source| ProvisionError::Remote {
            machine: Box::new(machine.clone()),
            step: ProvisionStep::TlsFixup,
            source,
        };

        let server = ServerCertificate::ensure(
            &self.store,
            &self.ca,
            machine.name(),
            &server_names(machine),
        )
        .map_err(cert_err)?;

        let user = machine.ssh_user();
        let remote = machine.remote();

        machine
            .run_privileged(&format!("mkdir -p {REMOTE_DOCKER_DIR} {DROP_IN_DIR}"))
            .await
            .map_err(remote_err)?;

        for (local, file) in [
            (self.store.ca_cert(), certs::CA_CERT_FILE),
            (server.cert.clone(), certs::SERVER_CERT_FILE),
            (server.key.clone(), certs::SERVER_KEY_FILE),
        ] {
            write_remote_file(remote, user, &local, &format!("{REMOTE_DOCKER_DIR}/{file}"))
                .await
                .map_err(remote_err)?;
        }

        write_remote_bytes(
            remote,
            user,
            engine_drop_in().as_bytes(),
            &format!("{DROP_IN_DIR}/{DROP_IN_FILE}"),
        )
        .await
        .map_err(remote_err)?;

        machine
            .run_privileged("systemctl daemon-reload")
            .await
            .map_err(remote_err)?;
        machine
            .run_privileged("systemctl restart docker")
            .await
            .map_err(remote_err)?;

        tracing::debug!("{} engine listening on {}", machine.name(), machine.engine_endpoint());
        Ok(())
    }
}

/// SAN list of an engine server certificate, without duplicates.
fn server_names(machine: &Machine) -> Vec<String> {
    let mut names = Vec::new();
    for name in [
        machine.public_ip().to_string(),
        machine.private_ip().to_string(),
        machine.hostname().to_string(),
        machine.name().to_string(),
        "localhost".to_string(),
    ] {
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

fn engine_drop_in() -> String {
    format!(
        "[Service]\n\
         ExecStart=\n\
         ExecStart=/usr/bin/dockerd -H unix:///var/run/docker.sock -H tcp://0.0.0.0:{ENGINE_TLS_PORT} \
         --tlsverify --tlscacert={dir}/{ca} --tlscert={dir}/{cert} --tlskey={dir}/{key}\n",
        dir = REMOTE_DOCKER_DIR,
        ca = certs::CA_CERT_FILE,
        cert = certs::SERVER_CERT_FILE,
        key = certs::SERVER_KEY_FILE,
    )
}
