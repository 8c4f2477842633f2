//! Cluster-wide global rate limiting.
//!
//! The node owning an application runs the local gate; every other node asks
//! the owner through the remote grant protocol. Who owns what is decided by
//! the caller and handed in as an [`Owner`].
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

pub mod client;

pub use client::GlobalGrantClient;

use crate::error::Result;
use crate::limiters::GlobalRateLimiter;

/// Header carrying the application key as a decimal string
pub const BOT_HASH_HEADER: &str = "Bot-Hash";
/// Header carrying the quota limit as a decimal string
pub const BOT_LIMIT_HEADER: &str = "Bot-Limit";

/// Who holds the authoritative bucket for an application
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Owner<'a> {
    Local,
    /// HTTP address (`host:port`) of the owning node
    Remote(&'a str),
}

#[derive(Clone, Debug)]
pub struct GlobalLimiter {
    local: Arc<GlobalRateLimiter>,
    remote: GlobalGrantClient,
}

impl GlobalLimiter {
    pub fn new(local: Arc<GlobalRateLimiter>, remote: GlobalGrantClient) -> Self {
        Self { local, remote }
    }

    pub fn local(&self) -> &Arc<GlobalRateLimiter> {
        &self.local
    }

    /// Wait for one unit of `bot_hash`'s global quota from its owner.
    ///
    /// `cancel` only applies to remote grants; the local gate cannot be
    /// interrupted.
    pub async fn take(
        &self,
        owner: Owner<'_>,
        bot_hash: u64,
        bot_limit: u32,
        cancel: &CancellationToken,
    ) -> Result<()> {
        match owner {
            Owner::Local => self.local.take(bot_hash, bot_limit).await,
            Owner::Remote(addr) => {
                self.remote
                    .fire_global_request(addr, bot_hash, bot_limit, cancel)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::{Duration, Instant};

    use super::*;
    use crate::error::NirnError;

    fn limiter() -> GlobalLimiter {
        GlobalLimiter::new(
            Arc::new(GlobalRateLimiter::new()),
            GlobalGrantClient::new(Duration::from_millis(200)).unwrap(),
        )
    }

    #[tokio::test]
    async fn local_owner_uses_the_gate() {
        let limiter = limiter();
        let cancel = CancellationToken::new();
        limiter.take(Owner::Local, 5, 2, &cancel).await.unwrap();
        assert_eq!(limiter.local().remaining(5), Some(1));
    }

    #[tokio::test]
    async fn local_owner_ignores_cancellation() {
        let limiter = limiter();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let start = Instant::now();
        limiter.take(Owner::Local, 6, 1, &cancel).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn remote_owner_goes_over_http() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let limiter = limiter();
        let err = limiter
            .take(Owner::Remote(&addr), 5, 2, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, NirnError::Transport(_)));
        // the local gate was never touched
        assert_eq!(limiter.local().bucket_count(), 0);
    }
}
