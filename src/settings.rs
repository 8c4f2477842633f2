//! nirn-proxy application settings
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::config_error;
use crate::error::Result;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const STANDARD_PORT_HTTP: u16 = 8080;
pub const DEFAULT_PORT_HTTP: &str = "8080";
pub const STANDARD_PORT_CLUSTER: u16 = 7946;
pub const DEFAULT_PORT_CLUSTER: &str = "7946";
pub const DEFAULT_REQUEST_TIMEOUT_MS: &str = "5000";

/// Where cluster seeds come from, in priority order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SeedSource {
    Static(Vec<String>),
    Dns(String),
    StandAlone,
}

#[derive(Clone, Debug)]
pub struct ClusterSettings {
    // Gossip bind and advertise port
    pub port: u16,

    // Static peer list, takes priority over dns
    pub members: Vec<String>,

    // Name resolved to the set of seed IPs
    pub dns: Option<String>,

    // Debug override for the node name
    pub node_name: Option<String>,

    // Externally reachable proxy port, broadcast to peers
    pub proxy_port: u16,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            port: STANDARD_PORT_CLUSTER,
            members: Vec::new(),
            dns: None,
            node_name: None,
            proxy_port: STANDARD_PORT_HTTP,
        }
    }
}

impl ClusterSettings {
    pub fn seed_source(&self) -> SeedSource {
        if !self.members.is_empty() {
            SeedSource::Static(self.members.clone())
        } else if let Some(dns) = &self.dns {
            SeedSource::Dns(dns.clone())
        } else {
            SeedSource::StandAlone
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    // Server bind address
    pub bind_ip: String,

    // HTTP API listen port
    pub port: u16,

    // Outbound timeout for remote grant calls
    pub request_timeout_ms: u64,

    // Emit logs as json
    pub log_json: bool,

    pub cluster: ClusterSettings,
}

impl Settings {
    pub fn socket_address(&self) -> Result<SocketAddr> {
        let ip = self
            .bind_ip
            .parse::<IpAddr>()
            .map_err(|e| config_error!("Invalid BIND_IP '{}': {}", self.bind_ip, e))?;
        Ok(SocketAddr::from((ip, self.port)))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            bind_ip: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_ms: 5000,
            log_json: false,
            cluster: ClusterSettings::default(),
        }
    }

    #[test]
    fn seed_source_priority() {
        let mut cluster = ClusterSettings::default();
        assert_eq!(cluster.seed_source(), SeedSource::StandAlone);

        cluster.dns = Some("nirn.internal".to_string());
        assert_eq!(
            cluster.seed_source(),
            SeedSource::Dns("nirn.internal".to_string())
        );

        cluster.members = vec!["10.0.0.1".to_string()];
        assert_eq!(
            cluster.seed_source(),
            SeedSource::Static(vec!["10.0.0.1".to_string()])
        );
    }

    #[test]
    fn socket_address() {
        let mut settings = settings();
        assert_eq!(
            settings.socket_address().unwrap(),
            "0.0.0.0:8080".parse::<SocketAddr>().unwrap()
        );
        settings.bind_ip = "not-an-ip".to_string();
        assert!(settings.socket_address().is_err());
    }

    #[test]
    fn request_timeout() {
        assert_eq!(settings().request_timeout(), Duration::from_secs(5));
    }
}
