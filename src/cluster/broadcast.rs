use std::collections::VecDeque;

use super::messages::GossipMessage;

#[derive(Debug)]
struct Broadcast {
    message: GossipMessage,
    transmits_left: usize,
}

/// Outgoing gossip, each message retransmitted a bounded number of times.
///
/// A newer message about a node replaces any queued message about the same node.
#[derive(Debug, Default)]
pub struct BroadcastQueue {
    queue: VecDeque<Broadcast>,
}

/// Retransmissions for a cluster of `nodes` members
pub fn retransmit_limit(retransmit_mult: usize, nodes: usize) -> usize {
    let scale = ((nodes + 1) as f64).log10().ceil() as usize;
    retransmit_mult * scale.max(1)
}

impl BroadcastQueue {
    pub fn push(&mut self, message: GossipMessage, transmits: usize) {
        if let Some(subject) = message.subject() {
            self.queue
                .retain(|b| b.message.subject() != Some(subject));
        }
        self.queue.push_back(Broadcast {
            message,
            transmits_left: transmits.max(1),
        });
    }

    /// Messages to send this round, at most `max`
    pub fn take(&mut self, max: usize) -> Vec<GossipMessage> {
        // least transmitted first
        self.queue
            .make_contiguous()
            .sort_by(|a, b| b.transmits_left.cmp(&a.transmits_left));
        let mut out = Vec::with_capacity(max.min(self.queue.len()));
        for broadcast in self.queue.iter_mut().take(max) {
            broadcast.transmits_left -= 1;
            out.push(broadcast.message.clone());
        }
        self.queue.retain(|b| b.transmits_left > 0);
        out
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suspect(name: &str, incarnation: u32) -> GossipMessage {
        GossipMessage::Suspect {
            name: name.to_string(),
            incarnation,
            from: "me".to_string(),
        }
    }

    #[test]
    fn retransmit_limit_grows_with_cluster() {
        assert_eq!(retransmit_limit(4, 1), 4);
        assert_eq!(retransmit_limit(4, 9), 4);
        assert_eq!(retransmit_limit(4, 10), 8);
        assert_eq!(retransmit_limit(4, 200), 12);
    }

    #[test]
    fn messages_expire_after_their_transmits() {
        let mut queue = BroadcastQueue::default();
        queue.push(suspect("a", 0), 2);
        assert_eq!(queue.take(10).len(), 1);
        assert_eq!(queue.take(10).len(), 1);
        assert!(queue.take(10).is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn newer_message_about_node_replaces_older() {
        let mut queue = BroadcastQueue::default();
        queue.push(suspect("a", 0), 3);
        queue.push(suspect("b", 0), 3);
        queue.push(suspect("a", 1), 3);
        assert_eq!(queue.len(), 2);
        let sent = queue.take(10);
        assert!(sent.contains(&suspect("a", 1)));
        assert!(!sent.contains(&suspect("a", 0)));
    }

    #[test]
    fn fresh_messages_go_first() {
        let mut queue = BroadcastQueue::default();
        queue.push(suspect("a", 0), 3);
        queue.take(1);
        queue.push(suspect("b", 0), 3);
        assert_eq!(queue.take(1), vec![suspect("b", 0)]);
    }
}
