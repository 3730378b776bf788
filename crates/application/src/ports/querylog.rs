use aegis_dns_domain::{QueryLogRecord, QueryLogSearch, StatsSnapshot};

/// Query-log sink and search surface.
pub trait QueryLogPort: Send + Sync {
    /// Append never blocks the request path; overflow drops the oldest.
    fn append(&self, record: QueryLogRecord);

    /// Search memory plus flushed files, newest first.
    fn search(&self, params: &QueryLogSearch) -> Vec<QueryLogRecord>;
}

/// Statistics counters fed by every completed request.
pub trait StatsPort: Send + Sync {
    fn record(&self, record: &QueryLogRecord);

    fn snapshot(&self) -> StatsSnapshot;
}
