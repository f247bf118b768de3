// ABOUTME: Config scaffolding for new targets.
// ABOUTME: Writes a commented flotilla.yml template.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::TargetName;

use super::CONFIG_FILENAME;

pub fn init_config(dir: &Path, target: Option<&str>, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let target = TargetName::new(target.unwrap_or("prod"))
        .map_err(|e| Error::InvalidConfig(e.to_string()))?;

    std::fs::write(&config_path, template_yaml(&target))?;
    Ok(())
}

fn template_yaml(target: &TargetName) -> String {
    format!(
        r#"target: {target}
store: .flotilla/store

core_hosts: 1
apps_hosts: 1
# Run application workloads on their own machines instead of the core ones.
dedicated_hosts: false
control_plane_port: 9000

driver:
  name: none

# Hosts adopted by the `none` driver, one per core machine.
hosts:
  - root@203.0.113.10

components:
  database:
    password: {{env: FLOTILLA_DATABASE_PASSWORD}}
  api:
    root_user: admin
    root_password: {{env: FLOTILLA_ROOT_PASSWORD}}
  task_timeout: 3m

bootstrap:
  command: ["./bootstrap.sh"]
  ready_timeout: 5m
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn template_parses() {
        let target = TargetName::new("staging").unwrap();
        let config = Config::from_yaml(&template_yaml(&target)).unwrap();
        assert_eq!(config.target, target);
        assert_eq!(config.core_hosts, 1);
        assert_eq!(config.hosts.unwrap().len(), 1);
    }
}
