pub mod global;
pub mod leaky_bucket;

pub use global::{GlobalRateLimiter, SharedBucket, GLOBAL_DRAIN_INTERVAL};
pub use leaky_bucket::{BucketFull, BucketState, BucketStorage, LeakyBucket, MemoryStorage};
