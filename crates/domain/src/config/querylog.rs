use serde::{Deserialize, Serialize};

/// Query log retention and privacy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryLogConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// In-memory ring capacity; oldest records drop first.
    #[serde(default = "default_ring_size")]
    pub ring_size: usize,

    /// Seconds between periodic flushes to disk.
    #[serde(default = "default_flush_secs")]
    pub flush_secs: u64,

    /// Rotated file budget, bytes per file.
    #[serde(default = "default_file_max_bytes")]
    pub file_max_bytes: u64,

    /// Zero the host bits of logged client IPs (/24 and /112).
    #[serde(default)]
    pub anonymize_clients: bool,
}

impl Default for QueryLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ring_size: default_ring_size(),
            flush_secs: default_flush_secs(),
            file_max_bytes: default_file_max_bytes(),
            anonymize_clients: false,
        }
    }
}

/// Statistics collection. A zero interval disables collection entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Bucket width, seconds. Zero disables.
    #[serde(default = "default_stats_interval")]
    pub interval_secs: u64,

    /// Buckets retained in the store.
    #[serde(default = "default_stats_retention")]
    pub retained_buckets: usize,

    /// Seconds between batched writes of dirty buckets.
    #[serde(default = "default_stats_flush")]
    pub flush_secs: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_stats_interval(),
            retained_buckets: default_stats_retention(),
            flush_secs: default_stats_flush(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ring_size() -> usize {
    1_000
}

fn default_flush_secs() -> u64 {
    60
}

fn default_file_max_bytes() -> u64 {
    16 * 1024 * 1024
}

fn default_stats_interval() -> u64 {
    3600
}

fn default_stats_retention() -> usize {
    24 * 7
}

fn default_stats_flush() -> u64 {
    60
}
