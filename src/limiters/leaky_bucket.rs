//! Leaky bucket rate limiting algorithm
//!
//! A bucket holds up to `capacity` units. Every `rate` the bucket drains
//! completely, so at most `capacity` units can be added within one drain window.
use tokio::time::{Duration, Instant};

use crate::error::Result;
use crate::storage_error;

/// Snapshot of a bucket after a successful add
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BucketState {
    pub capacity: u32,
    pub remaining: u32,
    pub reset: Instant,
}

/// The bucket cannot take the requested amount before `reset`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BucketFull {
    pub reset: Instant,
}

#[derive(Debug)]
pub struct LeakyBucket {
    name: String,
    capacity: u32,
    rate: Duration,
    remaining: u32,
    reset: Instant,
}

impl LeakyBucket {
    fn new(name: &str, capacity: u32, rate: Duration) -> Self {
        Self {
            name: name.to_string(),
            capacity,
            rate,
            remaining: capacity,
            reset: Instant::now() + rate,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Units still available in the current window
    pub fn remaining(&self) -> u32 {
        if Instant::now() >= self.reset {
            self.capacity
        } else {
            self.remaining
        }
    }

    /// When the current window drains
    pub fn reset(&self) -> Instant {
        self.reset
    }

    /// Add `amount` units, draining first if the window has passed.
    pub fn add(&mut self, amount: u32) -> std::result::Result<BucketState, BucketFull> {
        let now = Instant::now();
        if now >= self.reset {
            self.reset = now + self.rate;
            self.remaining = self.capacity;
        }
        if amount > self.remaining {
            return Err(BucketFull { reset: self.reset });
        }
        self.remaining -= amount;
        Ok(BucketState {
            capacity: self.capacity,
            remaining: self.remaining,
            reset: self.reset,
        })
    }
}

/// Backend able to construct buckets.
pub trait BucketStorage: Send + Sync {
    fn create(&self, name: &str, capacity: u32, rate: Duration) -> Result<LeakyBucket>;
}

/// In-process bucket storage
#[derive(Clone, Copy, Debug, Default)]
pub struct MemoryStorage;

impl BucketStorage for MemoryStorage {
    fn create(&self, name: &str, capacity: u32, rate: Duration) -> Result<LeakyBucket> {
        if capacity == 0 {
            return Err(storage_error!(
                "bucket '{}' needs a positive capacity",
                name
            ));
        }
        if rate.is_zero() {
            return Err(storage_error!(
                "bucket '{}' needs a non-zero drain interval",
                name
            ));
        }
        Ok(LeakyBucket::new(name, capacity, rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time;

    fn bucket(capacity: u32) -> LeakyBucket {
        MemoryStorage
            .create("test", capacity, Duration::from_secs(1))
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn fills_up_to_capacity() {
        let mut bucket = bucket(3);
        assert_eq!(bucket.add(1).unwrap().remaining, 2);
        assert_eq!(bucket.add(1).unwrap().remaining, 1);
        assert_eq!(bucket.add(1).unwrap().remaining, 0);

        let full = bucket.add(1).unwrap_err();
        assert_eq!(full.reset, bucket.reset());
        assert_eq!(bucket.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn drains_after_interval() {
        let mut bucket = bucket(2);
        let start = Instant::now();
        bucket.add(2).unwrap();
        assert!(bucket.add(1).is_err());
        assert_eq!(bucket.reset(), start + Duration::from_secs(1));

        time::advance(Duration::from_millis(999)).await;
        assert!(bucket.add(1).is_err());

        time::advance(Duration::from_millis(1)).await;
        assert_eq!(bucket.remaining(), 2);
        let state = bucket.add(1).unwrap();
        assert_eq!(state.remaining, 1);
        assert_eq!(state.reset, start + Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_add_is_refused() {
        let mut bucket = bucket(2);
        assert!(bucket.add(3).is_err());
        // refused adds do not consume anything
        assert_eq!(bucket.add(2).unwrap().remaining, 0);
    }

    #[test]
    fn memory_storage_rejects_invalid_buckets() {
        assert!(MemoryStorage.create("zero", 0, Duration::from_secs(1)).is_err());
        assert!(MemoryStorage.create("instant", 5, Duration::ZERO).is_err());
        let bucket = MemoryStorage
            .create("123", 5, Duration::from_secs(1))
            .unwrap();
        assert_eq!(bucket.name(), "123");
        assert_eq!(bucket.capacity(), 5);
    }
}
