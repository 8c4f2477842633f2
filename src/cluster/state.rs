//! Membership state machine.
//!
//! Tracks every node we have heard of and decides which gossip is news.
//! Nodes move `Alive -> Suspect -> Dead`, or to `Left` when they say goodbye.
//! Only entering and leaving the live set is reported as a [`Transition`].
use std::collections::HashMap;

use rand::seq::SliceRandom;
use tokio::time::{Duration, Instant};
use tracing::debug;

use super::messages::{NodeRecord, NodeStatus};
use super::node::Node;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    Joined(Node),
    Left(Node),
    /// A live node broadcast new metadata
    Updated(Node),
}

/// Result of applying one piece of gossip
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Update {
    /// Stale or irrelevant, do not pass it on
    Ignored,
    /// News, pass it on
    Changed,
    Transition(Transition),
}

impl Update {
    pub fn is_news(&self) -> bool {
        !matches!(self, Update::Ignored)
    }
}

#[derive(Debug)]
struct Member {
    record: NodeRecord,
    state_change: Instant,
}

impl Member {
    fn node(&self) -> Node {
        to_node(&self.record)
    }
}

fn to_node(record: &NodeRecord) -> Node {
    Node::new(record.name.as_str(), record.addr, record.meta.clone())
}

#[derive(Debug)]
pub struct MemberTable {
    local: String,
    members: HashMap<String, Member>,
    dead_node_reclaim_time: Duration,
}

impl MemberTable {
    pub fn new(local: NodeRecord, dead_node_reclaim_time: Duration, now: Instant) -> Self {
        let name = local.name.clone();
        let mut members = HashMap::new();
        members.insert(
            name.clone(),
            Member {
                record: NodeRecord {
                    status: NodeStatus::Alive,
                    ..local
                },
                state_change: now,
            },
        );
        Self {
            local: name,
            members,
            dead_node_reclaim_time,
        }
    }

    pub fn local_name(&self) -> &str {
        &self.local
    }

    pub fn is_local(&self, name: &str) -> bool {
        self.local == name
    }

    pub fn local_record(&self) -> NodeRecord {
        self.members[&self.local].record.clone()
    }

    pub fn get(&self, name: &str) -> Option<&NodeRecord> {
        self.members.get(name).map(|m| &m.record)
    }

    /// Apply an alive announcement about another node
    pub fn alive(&mut self, record: NodeRecord, now: Instant) -> Update {
        if self.is_local(&record.name) {
            return Update::Ignored;
        }
        let record = NodeRecord {
            status: NodeStatus::Alive,
            ..record
        };

        let Some(member) = self.members.get_mut(&record.name) else {
            let node = to_node(&record);
            self.members.insert(
                record.name.clone(),
                Member {
                    record,
                    state_change: now,
                },
            );
            return Update::Transition(Transition::Joined(node));
        };

        let was_live = member.record.status.is_live();
        let reclaimable =
            !was_live && now.duration_since(member.state_change) >= self.dead_node_reclaim_time;

        if member.record.addr != record.addr && !reclaimable {
            debug!(
                name = %record.name,
                old = %member.record.addr,
                new = %record.addr,
                "Conflicting address for node, ignoring"
            );
            return Update::Ignored;
        }
        if record.incarnation <= member.record.incarnation && !reclaimable {
            return Update::Ignored;
        }

        let meta_changed = member.record.meta != record.meta;
        let was_suspect = member.record.status == NodeStatus::Suspect;
        member.record = record;
        if !was_live || was_suspect {
            member.state_change = now;
        }

        if !was_live {
            Update::Transition(Transition::Joined(member.node()))
        } else if meta_changed {
            Update::Transition(Transition::Updated(member.node()))
        } else {
            Update::Changed
        }
    }

    /// Apply a suspicion about another node
    pub fn suspect(&mut self, name: &str, incarnation: u32, now: Instant) -> Update {
        if self.is_local(name) {
            return Update::Ignored;
        }
        let Some(member) = self.members.get_mut(name) else {
            return Update::Ignored;
        };
        if incarnation < member.record.incarnation || member.record.status != NodeStatus::Alive {
            return Update::Ignored;
        }
        member.record.status = NodeStatus::Suspect;
        member.record.incarnation = incarnation;
        member.state_change = now;
        Update::Changed
    }

    /// Apply a death (or, when `graceful`, a leave) of another node
    pub fn dead(&mut self, name: &str, incarnation: u32, graceful: bool, now: Instant) -> Update {
        if self.is_local(name) {
            return Update::Ignored;
        }
        let Some(member) = self.members.get_mut(name) else {
            return Update::Ignored;
        };
        if incarnation < member.record.incarnation || !member.record.status.is_live() {
            return Update::Ignored;
        }
        member.record.status = if graceful {
            NodeStatus::Left
        } else {
            NodeStatus::Dead
        };
        member.record.incarnation = incarnation;
        member.state_change = now;
        Update::Transition(Transition::Left(member.node()))
    }

    /// Someone thinks we are suspect or dead: outbid them
    pub fn refute(&mut self, incarnation: u32) -> NodeRecord {
        let Some(local) = self.members.get_mut(&self.local) else {
            unreachable!("local node is always in the member table");
        };
        local.record.incarnation = local.record.incarnation.max(incarnation) + 1;
        local.record.status = NodeStatus::Alive;
        local.record.clone()
    }

    /// Mark ourselves as leaving, returning our current incarnation
    pub fn leave_local(&mut self, now: Instant) -> u32 {
        let Some(local) = self.members.get_mut(&self.local) else {
            unreachable!("local node is always in the member table");
        };
        local.record.status = NodeStatus::Left;
        local.state_change = now;
        local.record.incarnation
    }

    /// Declare suspects that were not refuted in time dead
    pub fn expire_suspects(
        &mut self,
        suspicion_timeout: Duration,
        now: Instant,
    ) -> Vec<(NodeRecord, Transition)> {
        self.members
            .values_mut()
            .filter(|m| {
                m.record.status == NodeStatus::Suspect
                    && now.duration_since(m.state_change) >= suspicion_timeout
            })
            .map(|m| {
                m.record.status = NodeStatus::Dead;
                m.state_change = now;
                (m.record.clone(), Transition::Left(m.node()))
            })
            .collect()
    }

    /// Forget dead and left nodes after `retention`
    pub fn prune(&mut self, retention: Duration, now: Instant) {
        let local = self.local.clone();
        self.members.retain(|name, m| {
            *name == local
                || m.record.status.is_live()
                || now.duration_since(m.state_change) < retention
        });
    }

    /// Every record we know, for a full state exchange
    pub fn records(&self) -> Vec<NodeRecord> {
        self.members.values().map(|m| m.record.clone()).collect()
    }

    /// Live nodes, ourselves included
    pub fn live_nodes(&self) -> Vec<Node> {
        self.members
            .values()
            .filter(|m| m.record.status.is_live())
            .map(Member::node)
            .collect()
    }

    /// Live nodes other than ourselves
    pub fn peers(&self) -> Vec<NodeRecord> {
        self.members
            .values()
            .filter(|m| m.record.name != self.local && m.record.status.is_live())
            .map(|m| m.record.clone())
            .collect()
    }

    pub fn random_peers(&self, count: usize) -> Vec<NodeRecord> {
        let peers = self.peers();
        peers
            .choose_multiple(&mut rand::thread_rng(), count)
            .cloned()
            .collect()
    }
}
