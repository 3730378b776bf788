use aegis_dns_infrastructure::CoreHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Walks enabled rule lists once a minute; each list re-downloads only when
/// its content is older than the configured update period, so the tick is
/// cheap when nothing is due.
pub struct FilterRefreshJob {
    core: Arc<CoreHandle>,
    tick_secs: u64,
    shutdown: CancellationToken,
}

impl FilterRefreshJob {
    pub fn new(core: Arc<CoreHandle>) -> Self {
        Self {
            core,
            tick_secs: 60,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_tick(mut self, tick_secs: u64) -> Self {
        self.tick_secs = tick_secs.max(1);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn start(self) -> tokio::task::JoinHandle<()> {
        info!(tick_secs = self.tick_secs, "Starting filter refresh job");

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(self.tick_secs));
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => {
                        info!("FilterRefreshJob: shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        let store = self.core.current().store.clone();
                        let outcome = store.refresh(false).await;
                        if outcome.attempted > 0 {
                            info!(
                                attempted = outcome.attempted,
                                updated = outcome.updated,
                                failed = outcome.failed,
                                "FilterRefreshJob: refresh pass finished"
                            );
                        } else {
                            debug!("FilterRefreshJob: nothing due");
                        }
                    }
                }
            }
        })
    }
}
