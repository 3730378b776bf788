use aegis_dns_infrastructure::CoreHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Drains the query-log ring to the rotating NDJSON set. One final flush on
/// shutdown so flushed records survive restart.
pub struct QueryLogFlushJob {
    core: Arc<CoreHandle>,
    shutdown: CancellationToken,
}

impl QueryLogFlushJob {
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

    pub fn start(self) -> tokio::task::JoinHandle<()> {
        let flush_secs = self.core.current().config.querylog.flush_secs.max(1);
        info!(flush_secs, "Starting query log flush job");

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(flush_secs));
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => {
                        self.core.current().querylog.flush();
                        info!("QueryLogFlushJob: final flush done, shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        let log = self.core.current().querylog.clone();
                        let pending = log.pending();
                        if pending > 0 {
                            debug!(pending, "QueryLogFlushJob: flushing");
                        }
                        // Blocking file I/O stays off the request path.
                        let _ = tokio::task::spawn_blocking(move || log.flush()).await;
                    }
                }
            }
        })
    }
}
