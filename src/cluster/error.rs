// ABOUTME: Error types for cluster formation and cluster-wide operations.
// ABOUTME: Formation errors name the machine and the step that failed.

use crate::engine::EngineError;
use crate::types::MachineName;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormationStep {
    Connect,
    Init,
    Network,
    Join,
    Promote,
}

impl fmt::Display for FormationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FormationStep::Connect => "engine connect",
            FormationStep::Init => "swarm init",
            FormationStep::Network => "overlay network",
            FormationStep::Join => "swarm join",
            FormationStep::Promote => "manager promotion",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("{step} failed on {machine}: {source}")]
    Formation {
        machine: MachineName,
        step: FormationStep,
        #[source]
        source: EngineError,
    },

    #[error("service {0} has no running task")]
    NoRunningTask(String),

    #[error("task of service {service} has no container")]
    NoContainer { service: String },

    #[error("task of service {service} runs on node {node}, which is not a tracked machine")]
    UnknownNode { service: String, node: String },

    #[error("no running task for service {service} after {waited:?}")]
    Timeout { service: String, waited: Duration },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ClusterError {
    pub(crate) fn formation(
        machine: &MachineName,
        step: FormationStep,
    ) -> impl FnOnce(EngineError) -> ClusterError + '_ {
        move |source| ClusterError::Formation {
            machine: machine.clone(),
            step,
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClusterError>;
