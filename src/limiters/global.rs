//! Process-local gate for an application's global rate limit.
//!
//! One bucket per application key, drained once per second. `take` never
//! fails because the bucket is full: it sleeps until the bucket's own reset
//! and tries again.
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::time::{self, Duration, Instant};
use tracing::debug;

use super::leaky_bucket::{BucketStorage, LeakyBucket, MemoryStorage};
use crate::error::Result;

/// Drain interval of every global bucket
pub const GLOBAL_DRAIN_INTERVAL: Duration = Duration::from_secs(1);

pub type SharedBucket = Arc<Mutex<LeakyBucket>>;

pub struct GlobalRateLimiter {
    buckets: RwLock<HashMap<u64, SharedBucket>>,
    storage: Box<dyn BucketStorage>,
}

impl std::fmt::Debug for GlobalRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalRateLimiter")
            .field("buckets", &self.bucket_count())
            .finish()
    }
}

impl Default for GlobalRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalRateLimiter {
    pub fn new() -> Self {
        Self::with_storage(MemoryStorage)
    }

    pub fn with_storage(storage: impl BucketStorage + 'static) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            storage: Box::new(storage),
        }
    }

    /// Wait until one unit of the global quota for `bot_hash` is granted.
    ///
    /// The bucket is created on first use with `bot_limit` as its capacity;
    /// later limits for the same key are ignored. The only error is a bucket
    /// the storage backend refused to build.
    ///
    /// There is no cancellation parameter. Dropping the returned future is the
    /// only way to stop waiting, and a dropped waiter never consumes a unit.
    pub async fn take(&self, bot_hash: u64, bot_limit: u32) -> Result<()> {
        let bucket = self.get_or_create(bot_hash, bot_limit)?;
        loop {
            let reset = match bucket.lock().add(1) {
                Ok(_) => return Ok(()),
                Err(full) => full.reset,
            };
            debug!(
                bot_hash,
                wait_time = ?reset.saturating_duration_since(Instant::now()),
                "Failed to grab global token, sleeping for a bit"
            );
            time::sleep_until(reset).await;
        }
    }

    /// Look up the bucket for `bot_hash`, building it exactly once.
    pub fn get_or_create(&self, bot_hash: u64, bot_limit: u32) -> Result<SharedBucket> {
        if let Some(bucket) = self.buckets.read().get(&bot_hash) {
            return Ok(bucket.clone());
        }

        let mut buckets = self.buckets.write();
        // Another caller may have built it between the two locks
        if let Some(bucket) = buckets.get(&bot_hash) {
            return Ok(bucket.clone());
        }

        let bucket = self
            .storage
            .create(&bot_hash.to_string(), bot_limit, GLOBAL_DRAIN_INTERVAL)?;
        let bucket = Arc::new(Mutex::new(bucket));
        buckets.insert(bot_hash, bucket.clone());
        Ok(bucket)
    }

    /// Units left in the current window, `None` if the key was never seen
    pub fn remaining(&self, bot_hash: u64) -> Option<u32> {
        self.buckets
            .read()
            .get(&bot_hash)
            .map(|bucket| bucket.lock().remaining())
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.read().len()
    }
}
