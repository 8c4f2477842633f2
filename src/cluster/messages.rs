//! Gossip wire messages
//!
//! Every message is a single UDP datagram encoded with bincode.
use std::net::SocketAddr;

use bincode::{Decode, Encode};

use crate::error::Result;

/// Liveness of a node as gossiped between peers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Decode, Encode)]
pub enum NodeStatus {
    Alive,
    Suspect,
    Dead,
    /// Left on purpose
    Left,
}

impl NodeStatus {
    pub fn is_live(self) -> bool {
        matches!(self, NodeStatus::Alive | NodeStatus::Suspect)
    }
}

/// Everything a peer needs to know about one node
#[derive(Clone, Debug, PartialEq, Eq, Decode, Encode)]
pub struct NodeRecord {
    pub name: String,
    pub addr: SocketAddr,
    pub meta: Vec<u8>,
    pub incarnation: u32,
    pub status: NodeStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Decode, Encode)]
pub enum GossipMessage {
    /// Are you alive, `target`?
    Ping { seq: u32, target: String },
    Ack { seq: u32 },
    Alive(NodeRecord),
    Suspect {
        name: String,
        incarnation: u32,
        from: String,
    },
    /// `from == name` marks a graceful leave
    Dead {
        name: String,
        incarnation: u32,
        from: String,
    },
    /// Full state exchange; `join` is set by a node joining through us
    PushPull {
        seq: u32,
        join: bool,
        states: Vec<NodeRecord>,
    },
    PushPullReply { seq: u32, states: Vec<NodeRecord> },
}

impl GossipMessage {
    /// Name of the node this message is about, used to replace stale broadcasts
    pub fn subject(&self) -> Option<&str> {
        match self {
            GossipMessage::Alive(record) => Some(&record.name),
            GossipMessage::Suspect { name, .. } | GossipMessage::Dead { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let config = bincode::config::standard().with_big_endian();
        Ok(bincode::encode_to_vec(self, config)?)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let config = bincode::config::standard().with_big_endian();
        let (message, _) = bincode::decode_from_slice(data, config)?;
        Ok(message)
    }
}
