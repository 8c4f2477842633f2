use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Unique name of a cluster node
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub struct NodeName(String);

impl NodeName {
    pub fn new(name: String) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeName {
    fn from(name: &str) -> Self {
        NodeName::new(name.to_string())
    }
}

impl From<String> for NodeName {
    fn from(name: String) -> Self {
        NodeName::new(name)
    }
}

impl std::fmt::Display for NodeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A peer as seen through gossip: name, gossip address and broadcast metadata
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub name: NodeName,
    pub addr: SocketAddr,
    pub meta: Vec<u8>,
}

impl Node {
    pub fn new(name: impl Into<NodeName>, addr: SocketAddr, meta: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            addr,
            meta,
        }
    }

    /// The proxy port the node broadcast in its metadata
    pub fn proxy_port(&self) -> Option<u16> {
        std::str::from_utf8(&self.meta).ok()?.trim().parse().ok()
    }

    /// Address other nodes use for remote grants: gossip IP plus proxy port
    pub fn http_address(&self) -> Option<String> {
        self.proxy_port()
            .map(|port| SocketAddr::new(self.addr.ip(), port).to_string())
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} - {} - listenport: {}",
            self.name,
            self.addr,
            String::from_utf8_lossy(&self.meta)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_address_uses_meta_port() {
        let node = Node::new("node-a", "10.1.2.3:7946".parse().unwrap(), b"8080".to_vec());
        assert_eq!(node.proxy_port(), Some(8080));
        assert_eq!(node.http_address().as_deref(), Some("10.1.2.3:8080"));
        assert_eq!(
            node.to_string(),
            "node-a - 10.1.2.3:7946 - listenport: 8080"
        );
    }

    #[test]
    fn unusable_meta_has_no_http_address() {
        let node = Node::new("node-b", "[::1]:7946".parse().unwrap(), vec![0xff, 0x00]);
        assert_eq!(node.proxy_port(), None);
        assert_eq!(node.http_address(), None);

        let node = Node::new("node-c", "[::1]:7946".parse().unwrap(), b"9000".to_vec());
        assert_eq!(node.http_address().as_deref(), Some("[::1]:9000"));
    }
}
