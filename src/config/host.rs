// ABOUTME: Pre-existing host entries adopted by the generic driver.
// ABOUTME: Parses formats like "host", "user@host", "host:port", "user@host:port".

use serde::Deserialize;
use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    /// Address on the cluster-internal network; discovered when absent.
    #[serde(default)]
    pub private_ip: Option<IpAddr>,
    #[serde(default)]
    pub key: Option<PathBuf>,
    #[serde(default = "default_trust_first_connection")]
    pub trust_first_connection: bool,
}

fn default_port() -> u16 {
    22
}

fn default_trust_first_connection() -> bool {
    true
}

impl HostConfig {
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("host address cannot be empty".to_string());
        }

        let (user_part, rest) = match s.split_once('@') {
            Some((user, rest)) => (Some(user), rest),
            None => (None, s),
        };

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port_str)) => {
                let port = port_str
                    .parse::<u16>()
                    .map_err(|_| format!("invalid port: {}", port_str))?;
                (host, port)
            }
            None => (rest, 22),
        };

        if host.is_empty() {
            return Err("hostname cannot be empty".to_string());
        }
        if user_part.is_some_and(str::is_empty) {
            return Err("user cannot be empty".to_string());
        }

        Ok(HostConfig {
            host: host.to_string(),
            port,
            user: user_part.map(str::to_string),
            private_ip: None,
            key: None,
            trust_first_connection: true,
        })
    }

    /// SSH user, falling back to `$USER` and then root.
    pub fn user_or_default(&self) -> String {
        self.user
            .clone()
            .unwrap_or_else(|| std::env::var("USER").unwrap_or_else(|_| "root".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_forms() {
        let h = HostConfig::parse("deploy@10.0.0.1:2222").unwrap();
        assert_eq!(h.host, "10.0.0.1");
        assert_eq!(h.port, 2222);
        assert_eq!(h.user.as_deref(), Some("deploy"));

        let h = HostConfig::parse("node1.example.com").unwrap();
        assert_eq!(h.port, 22);
        assert!(h.user.is_none());
    }

    #[test]
    fn rejects_bad_entries() {
        assert!(HostConfig::parse("").is_err());
        assert!(HostConfig::parse("user@:22").is_err());
        assert!(HostConfig::parse("host:ssh").is_err());
        assert!(HostConfig::parse("@host").is_err());
    }
}
