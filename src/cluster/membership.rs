//! Gossip membership engine.
//!
//! A small SWIM-style protocol over UDP: random probing with suspicion,
//! piggybacked dissemination through a retransmit-limited broadcast queue and
//! periodic full state exchange. Joins and leaves are handed to a
//! [`ClusterEvents`] subscriber.
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::broadcast::{retransmit_limit, BroadcastQueue};
use super::config::{MembershipConfig, META_MAX_SIZE};
use super::events::{ClusterEvents, NodeMetaDelegate};
use super::messages::{GossipMessage, NodeRecord, NodeStatus};
use super::node::Node;
use super::state::{MemberTable, Transition, Update};
use super::transport::{GossipTransport, MAX_PACKET_SIZE};
use crate::error::{NirnError, Result};

/// Upper bound of queued broadcasts sent per gossip round
const MAX_BROADCASTS_PER_ROUND: usize = 32;

struct Inner {
    config: MembershipConfig,
    transport: GossipTransport,
    table: RwLock<MemberTable>,
    broadcasts: Mutex<BroadcastQueue>,
    // seq -> waiter for an Ack or PushPullReply
    pending: Mutex<HashMap<u32, oneshot::Sender<()>>>,
    seq: AtomicU32,
    leaving: AtomicBool,
    events: Arc<dyn ClusterEvents>,
    meta: Arc<dyn NodeMetaDelegate>,
}

/// Handle on a running gossip node. Dropping it stops the background tasks.
pub struct Membership {
    inner: Arc<Inner>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Membership {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Membership")
            .field("local", &self.inner.local_name())
            .field("addr", &self.inner.transport.local_addr())
            .finish()
    }
}

fn default_node_name(advertise: SocketAddr) -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| advertise.to_string())
}

impl Membership {
    /// Bind the gossip socket and start the protocol loops.
    ///
    /// Fails only if the engine cannot be built, e.g. the port is taken.
    pub async fn create(
        config: MembershipConfig,
        events: Arc<dyn ClusterEvents>,
        meta: Arc<dyn NodeMetaDelegate>,
    ) -> Result<Self> {
        let transport =
            GossipTransport::bind(SocketAddr::new(config.bind_addr, config.bind_port)).await?;

        let advertise_ip = config.advertise_addr.unwrap_or(if config.bind_addr.is_unspecified() {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            config.bind_addr
        });
        let advertise = SocketAddr::new(advertise_ip, transport.local_addr().port());
        let local = NodeRecord {
            name: config
                .name
                .clone()
                .unwrap_or_else(|| default_node_name(advertise)),
            addr: advertise,
            meta: meta.node_meta(META_MAX_SIZE),
            incarnation: 0,
            status: NodeStatus::Alive,
        };
        info!("Created gossip node {} advertising {}", local.name, advertise);

        let table = MemberTable::new(local.clone(), config.dead_node_reclaim_time, Instant::now());
        let inner = Arc::new(Inner {
            config,
            transport,
            table: RwLock::new(table),
            broadcasts: Mutex::new(BroadcastQueue::default()),
            pending: Mutex::new(HashMap::new()),
            seq: AtomicU32::new(0),
            leaving: AtomicBool::new(false),
            events,
            meta,
        });

        inner.dispatch(Transition::Joined(Node::new(
            local.name.as_str(),
            local.addr,
            local.meta.clone(),
        )));
        inner.queue(GossipMessage::Alive(local));

        let shutdown = CancellationToken::new();
        let tasks = vec![
            tokio::spawn(recv_loop(inner.clone(), shutdown.clone())),
            tokio::spawn(probe_loop(inner.clone(), shutdown.clone())),
            tokio::spawn(gossip_loop(inner.clone(), shutdown.clone())),
            tokio::spawn(push_pull_loop(inner.clone(), shutdown.clone())),
        ];

        Ok(Self {
            inner,
            shutdown,
            tasks: Mutex::new(tasks),
        })
    }

    /// Exchange state with every seed, returning how many answered.
    ///
    /// An error means nobody answered; the node keeps running alone.
    pub async fn join(&self, seeds: &[SocketAddr]) -> Result<usize> {
        let local_addr = self.local_node().addr;
        let mut waiters = Vec::new();
        for seed in seeds.iter().filter(|seed| **seed != local_addr) {
            let (seq, rx) = self.inner.register();
            let states = self.inner.table.read().records();
            let message = GossipMessage::PushPull {
                seq,
                join: true,
                states,
            };
            match self.inner.transport.send(*seed, &message).await {
                Ok(()) => waiters.push((seq, *seed, rx)),
                Err(err) => {
                    self.inner.pending.lock().remove(&seq);
                    warn!("Failed to contact seed {}: {}", seed, err);
                }
            }
        }

        let deadline = Instant::now() + self.inner.config.join_timeout;
        let mut joined = 0;
        for (seq, seed, rx) in waiters {
            match time::timeout_at(deadline, rx).await {
                Ok(Ok(())) => joined += 1,
                _ => debug!("Seed {} did not answer", seed),
            }
            self.inner.pending.lock().remove(&seq);
        }

        if joined == 0 {
            return Err(NirnError::Join(format!(
                "none of {} seed(s) answered",
                seeds.len()
            )));
        }
        Ok(joined)
    }

    /// Tell every live peer we are leaving. Peers report us as left.
    pub async fn leave(&self, timeout: Duration) -> Result<()> {
        if self.inner.leaving.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let (name, incarnation, peers) = {
            let mut table = self.inner.table.write();
            let incarnation = table.leave_local(Instant::now());
            (table.local_name().to_string(), incarnation, table.peers())
        };
        let message = GossipMessage::Dead {
            name: name.clone(),
            incarnation,
            from: name,
        };

        let broadcast = async {
            for peer in &peers {
                if let Err(err) = self.inner.transport.send(peer.addr, &message).await {
                    warn!("Failed to send leave to {}: {}", peer.name, err);
                }
            }
        };
        time::timeout(timeout, broadcast).await.map_err(|_| {
            NirnError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "timed out broadcasting leave",
            ))
        })
    }

    /// Stop all protocol loops and wait for them
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }
    }

    /// Live nodes, ourselves included
    pub fn members(&self) -> Vec<Node> {
        self.inner.table.read().live_nodes()
    }

    pub fn num_members(&self) -> usize {
        self.members().len()
    }

    pub fn local_node(&self) -> Node {
        let record = self.inner.table.read().local_record();
        Node::new(record.name, record.addr, record.meta)
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl Inner {
    fn local_name(&self) -> String {
        self.table.read().local_name().to_string()
    }

    fn register(&self) -> (u32, oneshot::Receiver<()>) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(seq, tx);
        (seq, rx)
    }

    fn complete(&self, seq: u32) {
        if let Some(tx) = self.pending.lock().remove(&seq) {
            let _ = tx.send(());
        }
    }

    fn queue(&self, message: GossipMessage) {
        let nodes = self.table.read().live_nodes().len();
        let transmits = retransmit_limit(self.config.retransmit_mult, nodes);
        self.broadcasts.lock().push(message, transmits);
    }

    fn dispatch(&self, transition: Transition) {
        match transition {
            Transition::Joined(node) => {
                info!("Node joined the cluster: {}", node);
                self.events.notify_join(&node);
            }
            Transition::Left(node) => {
                info!("Node left the cluster: {}", node);
                self.events.notify_leave(&node);
            }
            Transition::Updated(node) => {
                debug!("Node metadata changed: {}", node);
                self.meta.merge_remote_meta(&node);
            }
        }
    }

    fn apply(&self, update: Update, message: GossipMessage) {
        if update.is_news() {
            self.queue(message);
        }
        if let Update::Transition(transition) = update {
            self.dispatch(transition);
        }
    }

    fn refute(&self, incarnation: u32) {
        if self.leaving.load(Ordering::SeqCst) {
            return;
        }
        let record = self.table.write().refute(incarnation);
        debug!(
            "Refuting suspicion, now at incarnation {}",
            record.incarnation
        );
        self.queue(GossipMessage::Alive(record));
    }

    fn handle_alive(&self, record: NodeRecord) {
        if self.table.read().is_local(&record.name) {
            return;
        }
        let update = self.table.write().alive(record.clone(), Instant::now());
        self.apply(update, GossipMessage::Alive(record));
    }

    fn handle_suspect(&self, name: &str, incarnation: u32, from: &str) {
        if self.table.read().is_local(name) {
            self.refute(incarnation);
            return;
        }
        let update = self.table.write().suspect(name, incarnation, Instant::now());
        self.apply(
            update,
            GossipMessage::Suspect {
                name: name.to_string(),
                incarnation,
                from: from.to_string(),
            },
        );
    }

    fn handle_dead(&self, name: &str, incarnation: u32, from: &str) {
        if self.table.read().is_local(name) {
            self.refute(incarnation);
            return;
        }
        let graceful = name == from;
        let update = self
            .table
            .write()
            .dead(name, incarnation, graceful, Instant::now());
        self.apply(
            update,
            GossipMessage::Dead {
                name: name.to_string(),
                incarnation,
                from: from.to_string(),
            },
        );
    }

    fn merge(&self, states: Vec<NodeRecord>) {
        let local = self.local_name();
        for record in states {
            match record.status {
                NodeStatus::Alive => self.handle_alive(record),
                NodeStatus::Suspect | NodeStatus::Dead => {
                    self.handle_suspect(&record.name, record.incarnation, &local)
                }
                NodeStatus::Left => {
                    self.handle_dead(&record.name, record.incarnation, &record.name)
                }
            }
        }
    }

    async fn handle_message(&self, message: GossipMessage, from: SocketAddr) {
        match message {
            GossipMessage::Ping { seq, target } => {
                if target == self.local_name() {
                    self.reply(from, GossipMessage::Ack { seq }).await;
                }
            }
            GossipMessage::Ack { seq } => self.complete(seq),
            GossipMessage::Alive(record) => self.handle_alive(record),
            GossipMessage::Suspect {
                name,
                incarnation,
                from,
            } => self.handle_suspect(&name, incarnation, &from),
            GossipMessage::Dead {
                name,
                incarnation,
                from,
            } => self.handle_dead(&name, incarnation, &from),
            GossipMessage::PushPull { seq, join, states } => {
                if join {
                    debug!("Node at {} is joining through us", from);
                }
                self.merge(states);
                let states = self.table.read().records();
                self.reply(from, GossipMessage::PushPullReply { seq, states })
                    .await;
            }
            GossipMessage::PushPullReply { seq, states } => {
                self.merge(states);
                self.complete(seq);
            }
        }
    }

    async fn reply(&self, target: SocketAddr, message: GossipMessage) {
        if let Err(err) = self.transport.send(target, &message).await {
            debug!("Failed to answer {}: {}", target, err);
        }
    }

    /// Ping one random peer, suspect it if it stays quiet
    async fn probe(&self) {
        let target = self.table.read().random_peers(1).into_iter().next();
        let Some(target) = target else {
            return;
        };

        let (seq, rx) = self.register();
        let ping = GossipMessage::Ping {
            seq,
            target: target.name.clone(),
        };
        if let Err(err) = self.transport.send(target.addr, &ping).await {
            debug!("Failed to ping {}: {}", target.name, err);
        }
        let acked = matches!(time::timeout(self.config.probe_timeout, rx).await, Ok(Ok(())));
        self.pending.lock().remove(&seq);

        if !acked {
            debug!("No ack from {}, suspecting it", target.name);
            let local = self.local_name();
            self.handle_suspect(&target.name, target.incarnation, &local);
        }
    }

    /// Expire unrefuted suspects and forget long dead nodes
    fn reap(&self) {
        let now = Instant::now();
        let expired = {
            let mut table = self.table.write();
            let expired = table.expire_suspects(self.config.suspicion_timeout, now);
            table.prune(self.config.dead_node_retention, now);
            expired
        };
        let local = self.local_name();
        for (record, transition) in expired {
            self.queue(GossipMessage::Dead {
                name: record.name,
                incarnation: record.incarnation,
                from: local.clone(),
            });
            self.dispatch(transition);
        }
    }

    async fn gossip(&self) {
        let peers = self.table.read().random_peers(self.config.gossip_nodes);
        if peers.is_empty() {
            return;
        }
        let messages = self.broadcasts.lock().take(MAX_BROADCASTS_PER_ROUND);
        for peer in &peers {
            for message in &messages {
                if let Err(err) = self.transport.send(peer.addr, message).await {
                    debug!("Failed to gossip to {}: {}", peer.name, err);
                }
            }
        }
    }

    async fn push_pull(&self) {
        let peer = self.table.read().random_peers(1).into_iter().next();
        let Some(peer) = peer else {
            return;
        };
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let states = self.table.read().records();
        let message = GossipMessage::PushPull {
            seq,
            join: false,
            states,
        };
        if let Err(err) = self.transport.send(peer.addr, &message).await {
            debug!("Failed push/pull with {}: {}", peer.name, err);
        }
    }
}

async fn recv_loop(inner: Arc<Inner>, shutdown: CancellationToken) {
    let mut buf = vec![0u8; MAX_PACKET_SIZE];
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            received = inner.transport.recv(&mut buf) => match received {
                Ok((message, from)) => inner.handle_message(message, from).await,
                Err(err) => debug!("Dropped gossip packet: {}", err),
            },
        }
    }
}

async fn probe_loop(inner: Arc<Inner>, shutdown: CancellationToken) {
    let mut ticker = time::interval(inner.config.probe_interval);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                inner.probe().await;
                inner.reap();
            }
        }
    }
}

async fn gossip_loop(inner: Arc<Inner>, shutdown: CancellationToken) {
    let mut ticker = time::interval(inner.config.gossip_interval);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => inner.gossip().await,
        }
    }
}

async fn push_pull_loop(inner: Arc<Inner>, shutdown: CancellationToken) {
    let period = inner.config.push_pull_interval;
    let mut ticker = time::interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => inner.push_pull().await,
        }
    }
}
