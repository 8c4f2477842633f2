use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use crate::settings::{ClusterSettings, STANDARD_PORT_CLUSTER};

/// Largest metadata payload a node may broadcast
pub const META_MAX_SIZE: usize = 512;

/// Tunables of the gossip engine
#[derive(Clone, Debug)]
pub struct MembershipConfig {
    /// Node name, defaults to the host name
    pub name: Option<String>,
    pub bind_addr: IpAddr,
    pub bind_port: u16,
    /// Address peers should use to reach us, discovered when unset
    pub advertise_addr: Option<IpAddr>,

    pub probe_interval: Duration,
    pub probe_timeout: Duration,
    pub suspicion_timeout: Duration,
    pub gossip_interval: Duration,
    pub gossip_nodes: usize,
    pub retransmit_mult: usize,
    pub push_pull_interval: Duration,
    pub join_timeout: Duration,

    /// How long a dead node's name stays reserved for its old address
    pub dead_node_reclaim_time: Duration,
    /// How long dead and left nodes are remembered at all
    pub dead_node_retention: Duration,
}

impl MembershipConfig {
    /// Defaults suited to a LAN
    pub fn default_lan() -> Self {
        Self {
            name: None,
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            bind_port: STANDARD_PORT_CLUSTER,
            advertise_addr: None,
            probe_interval: Duration::from_secs(1),
            probe_timeout: Duration::from_millis(500),
            suspicion_timeout: Duration::from_secs(5),
            gossip_interval: Duration::from_millis(200),
            gossip_nodes: 3,
            retransmit_mult: 4,
            push_pull_interval: Duration::from_secs(30),
            join_timeout: Duration::from_secs(2),
            dead_node_reclaim_time: Duration::from_secs(30),
            dead_node_retention: Duration::from_secs(60),
        }
    }

    pub fn from_settings(settings: &ClusterSettings) -> Self {
        let mut config = Self::default_lan();
        config.bind_port = settings.port;
        // Debug override: lets the same name rejoin right away
        if let Some(name) = &settings.node_name {
            config.name = Some(name.clone());
            config.dead_node_reclaim_time = Duration::from_nanos(1);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_name_override_zeroes_reclaim_time() {
        let mut settings = ClusterSettings {
            port: 7000,
            ..Default::default()
        };
        let config = MembershipConfig::from_settings(&settings);
        assert_eq!(config.name, None);
        assert_eq!(config.bind_port, 7000);
        assert_eq!(config.dead_node_reclaim_time, Duration::from_secs(30));

        settings.node_name = Some("debug-1".to_string());
        let config = MembershipConfig::from_settings(&settings);
        assert_eq!(config.name.as_deref(), Some("debug-1"));
        assert_eq!(config.dead_node_reclaim_time, Duration::from_nanos(1));
    }
}
