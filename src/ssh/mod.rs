// ABOUTME: SSH client module for machine access.
// ABOUTME: Agent or key-file auth, known_hosts verification, command execution with stdin.

mod client;
mod error;

pub use client::{CommandOutput, Session, SessionConfig};
pub use error::{Error, Result};
