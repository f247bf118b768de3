// ABOUTME: Formation state types for the type state pattern.
// ABOUTME: Each state carries exactly what the previous steps produced.

use crate::engine::{JoinTokens, OverlayNetwork};

/// Engines connected, no swarm yet.
/// Available actions: `init()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Unformed;

/// Swarm initialized on the first machine.
/// Available actions: `create_network()`
#[derive(Debug, Clone)]
pub struct Initialized {
    pub(super) tokens: JoinTokens,
}

/// Overlay network created.
/// Available actions: `join()`
#[derive(Debug, Clone)]
pub struct NetworkReady {
    pub(super) tokens: JoinTokens,
    pub(super) network: OverlayNetwork,
}
