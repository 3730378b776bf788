use aegis_dns_domain::{CoreError, StatsBucket};
use std::path::{Path, PathBuf};
use tracing::warn;

/// File-backed bucket store (`stats.db`). Writes are whole-file,
/// write-to-temp-and-rename, so a crash mid-flush never corrupts history.
pub struct StatsStore {
    path: PathBuf,
}

impl StatsStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("stats.db"),
        }
    }

    /// Restore retained buckets; a missing or damaged store starts empty.
    pub fn load(&self) -> Vec<StatsBucket> {
        match std::fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(buckets) => buckets,
                Err(e) => {
                    warn!(error = %e, "Damaged stats store; starting empty");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        }
    }

    pub fn save(&self, buckets: &[StatsBucket]) -> Result<(), CoreError> {
        let bytes = serde_json::to_vec(buckets)
            .map_err(|e| CoreError::Internal(format!("stats encode failed: {e}")))?;
        let tmp = self.path.with_extension("db.tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = StatsStore::new(dir.path());

        let bucket = StatsBucket {
            total: 42,
            blocked_rule: 7,
            ..StatsBucket::default()
        };
        store.save(&[bucket]).unwrap();

        let restored = store.load();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].total, 42);
        assert_eq!(restored[0].blocked_rule, 7);
    }

    #[test]
    fn missing_store_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(StatsStore::new(dir.path()).load().is_empty());
    }
}
