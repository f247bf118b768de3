// ABOUTME: Secret values that are written inline or read from the environment.
// ABOUTME: `{env: NAME, default: ...}` keeps passwords out of flotilla.yml.

use crate::error::{Error, Result};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Literal(String),
    FromEnv {
        #[serde(rename = "env")]
        var: String,
        #[serde(default)]
        default: Option<String>,
    },
}

impl EnvValue {
    /// The literal, or the variable's value, or its default.
    pub fn resolve(&self) -> Result<String> {
        match self {
            EnvValue::Literal(s) => Ok(s.clone()),
            EnvValue::FromEnv { var, default } => match std::env::var(var) {
                Ok(val) => Ok(val),
                Err(_) => default
                    .clone()
                    .ok_or_else(|| Error::MissingEnvVar(var.clone())),
            },
        }
    }
}

/// Resolve a secret that must be configured under `field`.
pub(super) fn resolve_required(value: Option<&EnvValue>, field: &str) -> Result<String> {
    let value = value.ok_or_else(|| Error::InvalidConfig(format!("{field} is required")))?;
    let resolved = value.resolve()?;
    if resolved.is_empty() {
        return Err(Error::InvalidConfig(format!("{field} cannot be empty")));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_resolves_to_itself() {
        assert_eq!(EnvValue::Literal("x".into()).resolve().unwrap(), "x");
    }

    #[test]
    fn required_secret_must_be_present_and_non_empty() {
        assert!(matches!(
            resolve_required(None, "components.api.root_password"),
            Err(Error::InvalidConfig(msg)) if msg.contains("root_password is required")
        ));
        let empty = EnvValue::Literal(String::new());
        assert!(resolve_required(Some(&empty), "x").is_err());
    }

    #[test]
    fn env_reference_reads_variable() {
        let value: EnvValue = serde_yaml::from_str("{env: FLOTILLA_UNIT_SECRET}").unwrap();
        temp_env::with_var("FLOTILLA_UNIT_SECRET", Some("hunter2"), || {
            assert_eq!(value.resolve().unwrap(), "hunter2");
        });
    }

    #[test]
    fn missing_variable_falls_back_to_default_or_errors() {
        let with_default: EnvValue =
            serde_yaml::from_str("{env: FLOTILLA_UNIT_UNSET, default: fallback}").unwrap();
        let without: EnvValue = serde_yaml::from_str("{env: FLOTILLA_UNIT_UNSET}").unwrap();
        temp_env::with_var_unset("FLOTILLA_UNIT_UNSET", || {
            assert_eq!(with_default.resolve().unwrap(), "fallback");
            assert!(matches!(
                without.resolve(),
                Err(Error::MissingEnvVar(var)) if var == "FLOTILLA_UNIT_UNSET"
            ));
        });
    }
}
