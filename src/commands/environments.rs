// ABOUTME: Commands over the environment registry: list and forget.

use super::store_dir;
use crate::environments::{Environment, EnvironmentRegistry, FileRegistry};
use crate::error::{Error, Result};
use crate::output::Output;
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Registered environments, rendered as a table.
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct EnvironmentList(pub Vec<Environment>);

impl fmt::Display for EnvironmentList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No environments");
        }
        let width = self.0.iter().map(|e| e.name.len()).max().unwrap_or(0).max(4);
        writeln!(f, "{:<width$}  {:<10}  {:<20}  URL", "NAME", "STATE", "CREATED")?;
        for env in &self.0 {
            writeln!(
                f,
                "{:<width$}  {:<10}  {:<20}  {}",
                env.name,
                env.state.to_string(),
                env.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                env.control_plane_url.as_deref().unwrap_or("-"),
            )?;
        }
        Ok(())
    }
}

pub fn list_environments(config_path: Option<&Path>, output: &Output) -> Result<()> {
    let registry = FileRegistry::new(&store_dir(config_path)?);
    output.report("environments", &EnvironmentList(registry.list()?));
    Ok(())
}

pub fn forget(name: &str, config_path: Option<&Path>, output: &Output) -> Result<()> {
    let registry = FileRegistry::new(&store_dir(config_path)?);
    if !registry.forget(name)? {
        return Err(Error::UnknownEnvironment(name.to_string()));
    }
    output.success(&format!("Forgot environment {name}"));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environments::EnvironmentState;
    use chrono::{TimeZone, Utc};

    #[test]
    fn table_lists_state_and_url() {
        let list = EnvironmentList(vec![Environment {
            name: "prod".to_string(),
            state: EnvironmentState::Ready,
            control_plane_url: Some("http://203.0.113.10:9000".to_string()),
            created_at: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
            created_by: "laptop".to_string(),
        }]);
        let text = list.to_string();
        assert!(text.starts_with("NAME  STATE"));
        assert!(text.contains("prod  ready       2026-01-02 03:04:05   http://203.0.113.10:9000"));
    }

    #[test]
    fn empty_list_says_so() {
        assert_eq!(EnvironmentList(vec![]).to_string(), "No environments\n");
    }
}
