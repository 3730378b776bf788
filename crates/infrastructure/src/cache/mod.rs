pub mod storage;

pub use storage::{CachedAnswer, CacheLookup, ResponseCache, STALE_TTL_SECS};
