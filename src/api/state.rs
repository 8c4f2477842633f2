use std::sync::Arc;

use crate::cluster::PeerTable;
use crate::global::GlobalLimiter;
use crate::limiters::GlobalRateLimiter;

/// Shared handler state
#[derive(Clone, Debug)]
pub struct AppState {
    pub global: GlobalLimiter,
    pub peers: Arc<PeerTable>,
}

impl AppState {
    pub fn new(global: GlobalLimiter, peers: Arc<PeerTable>) -> Self {
        Self { global, peers }
    }

    pub fn gate(&self) -> &Arc<GlobalRateLimiter> {
        self.global.local()
    }
}
