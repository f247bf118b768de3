// ABOUTME: Errors from container-engine operations.
// ABOUTME: HTTP status codes from the engine API are mapped onto domain variants.

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to connect to engine at {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("already exists: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("node is not part of a swarm: {0}")]
    NotInSwarm(String),

    #[error("exec failed: {0}")]
    Exec(String),

    #[error("unexpected engine response: {0}")]
    Malformed(String),

    #[error("engine error: {0}")]
    Api(String),
}
