use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counters for one stats interval. Persisted in the bucket store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsBucket {
    pub start: Option<DateTime<Utc>>,

    pub total: u64,
    pub blocked_rule: u64,
    pub blocked_safebrowsing: u64,
    pub blocked_safesearch: u64,
    pub blocked_parental: u64,
    pub blocked_service: u64,

    /// Sum of per-request processing time, microseconds.
    pub elapsed_sum_us: u64,

    #[serde(default)]
    pub top_domains: Vec<TopEntry>,
    #[serde(default)]
    pub top_blocked: Vec<TopEntry>,
    #[serde(default)]
    pub top_clients: Vec<TopEntry>,
}

impl StatsBucket {
    pub fn blocked_total(&self) -> u64 {
        self.blocked_rule
            + self.blocked_safebrowsing
            + self.blocked_safesearch
            + self.blocked_parental
            + self.blocked_service
    }

    pub fn avg_elapsed_us(&self) -> u64 {
        if self.total == 0 {
            0
        } else {
            self.elapsed_sum_us / self.total
        }
    }
}

/// One top-N row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopEntry {
    pub key: String,
    pub count: u64,
}

/// Aggregated view over all retained buckets, served to collaborators.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total: u64,
    pub blocked: u64,
    pub avg_elapsed_us: u64,
    pub top_domains: Vec<TopEntry>,
    pub top_blocked: Vec<TopEntry>,
    pub top_clients: Vec<TopEntry>,
}
