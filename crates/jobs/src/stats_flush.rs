use aegis_dns_infrastructure::CoreHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Persists dirty stats buckets in batches. A zero stats interval disables
/// collection, so the job simply never finds anything dirty.
pub struct StatsFlushJob {
    core: Arc<CoreHandle>,
    shutdown: CancellationToken,
}

impl StatsFlushJob {
    pub fn new(core: Arc<CoreHandle>) -> Self {
        Self {
            core,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    fn flush(core: &CoreHandle) {
        let current = core.current();
        if let Some(buckets) = current.stats.take_dirty() {
            if let Err(e) = current.stats_store.save(&buckets) {
                warn!(error = %e, "StatsFlushJob: bucket write failed");
            } else {
                debug!(buckets = buckets.len(), "StatsFlushJob: buckets written");
            }
        }
    }

    pub fn start(self) -> tokio::task::JoinHandle<()> {
        let flush_secs = self.core.current().config.stats.flush_secs.max(1);
        info!(flush_secs, "Starting stats flush job");

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(flush_secs));
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => {
                        Self::flush(&self.core);
                        info!("StatsFlushJob: final flush done, shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        Self::flush(&self.core);
                    }
                }
            }
        })
    }
}
