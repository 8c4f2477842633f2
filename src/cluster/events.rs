//! Capabilities the membership layer hands its observations to.
use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::warn;

use super::node::{Node, NodeName};

/// Subscriber for membership changes.
///
/// Only joins and leaves are reported. Metadata updates of a live node are
/// not part of this contract.
pub trait ClusterEvents: Send + Sync {
    fn notify_join(&self, node: &Node);
    fn notify_leave(&self, node: &Node);
}

/// Produces the metadata payload broadcast for the local node
pub trait NodeMetaDelegate: Send + Sync {
    /// Payload for the local node, at most `limit` bytes
    fn node_meta(&self, limit: usize) -> Vec<u8>;

    /// Called when a peer broadcasts changed metadata
    fn merge_remote_meta(&self, _node: &Node) {}
}

/// Broadcasts the proxy port as ASCII decimal bytes
#[derive(Clone, Copy, Debug)]
pub struct ProxyPortMeta {
    proxy_port: u16,
}

impl ProxyPortMeta {
    pub fn new(proxy_port: u16) -> Self {
        Self { proxy_port }
    }
}

impl NodeMetaDelegate for ProxyPortMeta {
    fn node_meta(&self, limit: usize) -> Vec<u8> {
        let mut meta = self.proxy_port.to_string().into_bytes();
        meta.truncate(limit);
        meta
    }
}

/// Proxy HTTP addresses of the nodes currently in the cluster
#[derive(Debug, Default)]
pub struct PeerTable {
    peers: RwLock<HashMap<NodeName, String>>,
}

impl PeerTable {
    pub fn address_of(&self, name: &NodeName) -> Option<String> {
        self.peers.read().get(name).cloned()
    }

    pub fn peers(&self) -> Vec<(NodeName, String)> {
        self.peers
            .read()
            .iter()
            .map(|(name, addr)| (name.clone(), addr.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}

impl ClusterEvents for PeerTable {
    fn notify_join(&self, node: &Node) {
        match node.http_address() {
            Some(addr) => {
                self.peers.write().insert(node.name.clone(), addr);
            }
            None => warn!(node = %node, "Joined node has no usable proxy port"),
        }
    }

    fn notify_leave(&self, node: &Node) {
        self.peers.write().remove(&node.name);
    }
}
