use serde::{Deserialize, Serialize};

/// Response cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Byte budget for cached responses; LRU beyond it.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// TTLs below the floor are raised to it; zero disables.
    #[serde(default)]
    pub ttl_floor_secs: u32,

    /// TTLs above the ceiling are clamped to it.
    #[serde(default = "default_ttl_ceiling")]
    pub ttl_ceiling_secs: u32,

    /// Ceiling for negative (NXDOMAIN/NODATA) responses; the SOA minimum
    /// still wins when smaller.
    #[serde(default = "default_negative_ceiling")]
    pub negative_ceiling_secs: u32,

    /// Serve expired entries while refreshing in the background.
    #[serde(default)]
    pub optimistic: bool,

    /// How long past expiry a stale entry stays servable in optimistic mode.
    #[serde(default = "default_hard_expiry")]
    pub stale_hard_expiry_secs: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_bytes: default_max_bytes(),
            ttl_floor_secs: 0,
            ttl_ceiling_secs: default_ttl_ceiling(),
            negative_ceiling_secs: default_negative_ceiling(),
            optimistic: false,
            stale_hard_expiry_secs: default_hard_expiry(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_bytes() -> usize {
    4 * 1024 * 1024
}

fn default_ttl_ceiling() -> u32 {
    86_400
}

fn default_negative_ceiling() -> u32 {
    1_800
}

fn default_hard_expiry() -> u32 {
    6 * 3600
}
