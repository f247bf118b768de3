// ABOUTME: Diagnostics accumulator for non-fatal warnings during an install.
// ABOUTME: Collects warnings that shouldn't fail the run but should be shown to users.

use serde::Serialize;

/// Collects non-fatal warnings during install operations.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A non-fatal warning collected during an install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// A firewall rule could not be removed from a machine.
    pub fn network_fixup(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::NetworkFixup,
            message: message.into(),
        }
    }

    /// The environment registry could not be updated after the run.
    pub fn environment_registry(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::EnvironmentRegistry,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningKind {
    NetworkFixup,
    EnvironmentRegistry,
}
