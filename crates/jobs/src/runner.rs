use crate::{FilterRefreshJob, QueryLogFlushJob, StatsFlushJob};
use aegis_dns_infrastructure::CoreHandle;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Owns every background job and their shared cancellation token.
pub struct JobRunner {
    shutdown: CancellationToken,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl JobRunner {
    pub fn start(core: Arc<CoreHandle>) -> Self {
        let shutdown = CancellationToken::new();

        let handles = vec![
            FilterRefreshJob::new(Arc::clone(&core))
                .with_cancellation(shutdown.child_token())
                .start(),
            QueryLogFlushJob::new(Arc::clone(&core))
                .with_cancellation(shutdown.child_token())
                .start(),
            StatsFlushJob::new(Arc::clone(&core))
                .with_cancellation(shutdown.child_token())
                .start(),
        ];

        info!(jobs = handles.len(), "Background jobs started");
        Self { shutdown, handles }
    }

    /// Cancel every job and wait for their final flushes.
    pub async fn stop(self) {
        self.shutdown.cancel();
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("Background jobs stopped");
    }
}
