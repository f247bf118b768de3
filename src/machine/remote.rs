// ABOUTME: Remote command execution seam used by machines and drivers.
// ABOUTME: Implemented for SSH sessions; adds a stdin-piped file write primitive.

use crate::ssh::{self, Session};
use async_trait::async_trait;
use std::path::Path;

/// Runs shell commands on one remote host.
#[async_trait]
pub trait RemoteExec: Send + Sync {
    /// Run `command` and return its stdout. Non-zero exit is an error.
    async fn run(&self, command: &str) -> ssh::Result<String>;

    /// Like [`RemoteExec::run`], with `input` written to the command's stdin.
    async fn run_with_input(&self, command: &str, input: &[u8]) -> ssh::Result<String>;
}

#[async_trait]
impl RemoteExec for Session {
    async fn run(&self, command: &str) -> ssh::Result<String> {
        let output = self.exec(command).await?;
        checked(command, output)
    }

    async fn run_with_input(&self, command: &str, input: &[u8]) -> ssh::Result<String> {
        let output = self.exec_with_input(command, input).await?;
        checked(command, output)
    }
}

fn checked(command: &str, output: ssh::CommandOutput) -> ssh::Result<String> {
    if output.success() {
        Ok(output.stdout)
    } else {
        Err(ssh::Error::NonZeroExit {
            command: command.to_string(),
            exit_code: output.exit_code,
            stderr: output.stderr,
        })
    }
}

/// Prefix `command` with sudo unless the session already runs as root.
pub fn privileged(ssh_user: &str, command: &str) -> String {
    if ssh_user == "root" {
        command.to_string()
    } else {
        format!("sudo {command}")
    }
}

/// Copy a local file to `dest` on the remote host by piping it through `tee`.
pub async fn write_remote_file(
    remote: &dyn RemoteExec,
    ssh_user: &str,
    local: &Path,
    dest: &str,
) -> ssh::Result<()> {
    let bytes = tokio::fs::read(local).await?;
    tracing::debug!("uploading {} to {}", local.display(), dest);
    write_remote_bytes(remote, ssh_user, &bytes, dest).await
}

/// Write `bytes` to `dest` on the remote host.
pub async fn write_remote_bytes(
    remote: &dyn RemoteExec,
    ssh_user: &str,
    bytes: &[u8],
    dest: &str,
) -> ssh::Result<()> {
    let command = privileged(ssh_user, &format!("tee {dest} > /dev/null"));
    remote.run_with_input(&command, bytes).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_runs_without_sudo() {
        assert_eq!(privileged("root", "mkdir -p /x"), "mkdir -p /x");
        assert_eq!(privileged("ubuntu", "mkdir -p /x"), "sudo mkdir -p /x");
    }
}
