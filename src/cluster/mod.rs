//! Cluster membership: who else is running, and at which proxy address.
//!
//! Seeds come from a static member list or a DNS name. Without either the
//! proxy runs stand-alone and no gossip engine is started.
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::net::lookup_host;
use tracing::{error, info, warn};

pub mod broadcast;
pub mod config;
pub mod events;
pub mod membership;
pub mod messages;
pub mod node;
pub mod state;
pub mod transport;

pub use config::MembershipConfig;
pub use events::{ClusterEvents, NodeMetaDelegate, PeerTable, ProxyPortMeta};
pub use membership::Membership;
pub use node::{Node, NodeName};

use crate::error::{GossipError, Result};
use crate::settings::{ClusterSettings, SeedSource};

/// Start the gossip engine and join the configured seeds.
///
/// Returns `None` in stand-alone mode. Failing to build the engine is fatal,
/// failing to join is not: the first node of a cluster has nobody to join.
pub async fn init_cluster(
    settings: &ClusterSettings,
    events: Arc<dyn ClusterEvents>,
) -> Result<Option<Membership>> {
    let source = settings.seed_source();
    if source == SeedSource::StandAlone {
        info!("Running in stand-alone mode");
        return Ok(None);
    }

    info!("Attempting to create/join cluster");
    let seeds = resolve_seeds(&source, settings.port).await?;

    let mut config = MembershipConfig::from_settings(settings);
    if config.advertise_addr.is_none() {
        if let Some(seed) = seeds.first() {
            config.advertise_addr = transport::outbound_ip(*seed).await;
        }
    }

    let meta = Arc::new(ProxyPortMeta::new(settings.proxy_port));
    let membership = Membership::create(config, events, meta).await?;

    if let Err(err) = membership.join(&seeds).await {
        error!(
            error = %err,
            "Failed to join existing cluster, ok if this is the first node"
        );
    }

    let members = membership
        .members()
        .iter()
        .map(|node| node.name.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    info!(members = %members, "Connected to cluster nodes");

    Ok(Some(membership))
}

/// Turn the seed source into gossip addresses, `port` filling in missing ports
pub async fn resolve_seeds(source: &SeedSource, port: u16) -> Result<Vec<SocketAddr>> {
    let mut seeds = Vec::new();
    match source {
        SeedSource::StandAlone => {}
        SeedSource::Static(members) => {
            for member in members {
                match resolve_member(member, port).await {
                    Ok(addrs) => seeds.extend(addrs),
                    Err(err) => warn!(member = %member, error = %err, "Skipping cluster member"),
                }
            }
        }
        SeedSource::Dns(name) => {
            let addrs = lookup_host((name.as_str(), port))
                .await
                .map_err(|e| GossipError::Resolve(format!("{}: {}", name, e)))?;
            seeds.extend(addrs);
            if seeds.is_empty() {
                return Err(GossipError::Resolve(format!(
                    "no addresses returned by DNS lookup for {}",
                    name
                ))
                .into());
            }
        }
    }

    let mut seen = HashSet::new();
    seeds.retain(|addr| seen.insert(*addr));
    Ok(seeds)
}

async fn resolve_member(member: &str, port: u16) -> Result<Vec<SocketAddr>> {
    if let Ok(addr) = member.parse::<SocketAddr>() {
        return Ok(vec![addr]);
    }
    if let Ok(ip) = member.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, port)]);
    }
    let resolve_error = |e: std::io::Error| GossipError::Resolve(format!("{}: {}", member, e));
    let addrs: Vec<SocketAddr> = if member.contains(':') {
        lookup_host(member).await.map_err(resolve_error)?.collect()
    } else {
        lookup_host((member, port))
            .await
            .map_err(resolve_error)?
            .collect()
    };
    Ok(addrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stand_alone_has_no_seeds() {
        let seeds = resolve_seeds(&SeedSource::StandAlone, 7946).await.unwrap();
        assert!(seeds.is_empty());
    }

    #[tokio::test]
    async fn static_members_get_default_port() {
        let source = SeedSource::Static(vec![
            "10.0.0.1".to_string(),
            "10.0.0.2:9000".to_string(),
            "10.0.0.1".to_string(),
        ]);
        let seeds = resolve_seeds(&source, 7946).await.unwrap();
        assert_eq!(
            seeds,
            vec![
                "10.0.0.1:7946".parse::<SocketAddr>().unwrap(),
                "10.0.0.2:9000".parse().unwrap(),
            ]
        );
    }

    #[tokio::test]
    async fn static_hostnames_are_resolved() {
        let source = SeedSource::Static(vec!["localhost".to_string()]);
        let seeds = resolve_seeds(&source, 7946).await.unwrap();
        assert!(!seeds.is_empty());
        assert!(seeds
            .iter()
            .all(|addr| addr.ip().is_loopback() && addr.port() == 7946));

        let source = SeedSource::Static(vec!["localhost:7000".to_string()]);
        let seeds = resolve_seeds(&source, 7946).await.unwrap();
        assert!(!seeds.is_empty());
        assert!(seeds
            .iter()
            .all(|addr| addr.ip().is_loopback() && addr.port() == 7000));
    }

    #[tokio::test]
    async fn unresolvable_static_members_are_skipped() {
        let source = SeedSource::Static(vec![
            "nirn-seed.invalid".to_string(),
            "10.0.0.1".to_string(),
        ]);
        let seeds = resolve_seeds(&source, 7946).await.unwrap();
        assert_eq!(seeds, vec!["10.0.0.1:7946".parse::<SocketAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn dns_resolves_localhost() {
        let seeds = resolve_seeds(&SeedSource::Dns("localhost".to_string()), 7946)
            .await
            .unwrap();
        assert!(!seeds.is_empty());
        assert!(seeds.iter().all(|addr| addr.port() == 7946));
    }

    #[tokio::test]
    async fn failed_dns_lookup_is_fatal() {
        let source = SeedSource::Dns("nirn-seeds.invalid".to_string());
        let err = resolve_seeds(&source, 7946).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::NirnError::Gossip(GossipError::Resolve(_))
        ));
    }

    #[tokio::test]
    async fn stand_alone_returns_no_membership() {
        let membership = init_cluster(&ClusterSettings::default(), Arc::new(PeerTable::default()))
            .await
            .unwrap();
        assert!(membership.is_none());
    }
}
