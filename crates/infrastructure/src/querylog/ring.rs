use super::file::LogFiles;
use aegis_dns_application::ports::QueryLogPort;
use aegis_dns_domain::{config::QueryLogConfig, QueryLogRecord, QueryLogSearch};
use std::collections::VecDeque;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Mutex;
use tracing::warn;

/// Bounded in-memory ring flushed to the rotating NDJSON set.
///
/// `append` is the per-request hot path and never blocks on disk: it only
/// pushes into the ring, dropping the oldest on overflow. The flusher
/// job drains batches out via `flush`.
pub struct QueryLog {
    config: QueryLogConfig,
    ring: Mutex<VecDeque<QueryLogRecord>>,
    files: LogFiles,
}

impl QueryLog {
    pub fn new(config: QueryLogConfig, data_dir: &Path) -> Self {
        let files = LogFiles::new(data_dir, config.file_max_bytes);
        let ring_size = config.ring_size.max(1);
        Self {
            config,
            ring: Mutex::new(VecDeque::with_capacity(ring_size)),
            files,
        }
    }

    /// Drain the ring to disk. Bounded: one batch per call, so the flusher
    /// can never loop forever on a producer that keeps appending.
    pub fn flush(&self) {
        let batch: Vec<QueryLogRecord> = {
            let mut ring = self.ring.lock().unwrap();
            ring.drain(..).collect()
        };
        if batch.is_empty() {
            return;
        }
        if let Err(e) = self.files.append(&batch) {
            warn!(error = %e, dropped = batch.len(), "Query log flush failed");
        }
    }

    pub fn pending(&self) -> usize {
        self.ring.lock().unwrap().len()
    }

    /// Zero the host bits: /24 for IPv4, /112 for IPv6.
    fn anonymize(ip: IpAddr) -> IpAddr {
        match ip {
            IpAddr::V4(v4) => {
                let mut octets = v4.octets();
                octets[3] = 0;
                IpAddr::V4(octets.into())
            }
            IpAddr::V6(v6) => {
                let mut segments = v6.segments();
                segments[7] = 0;
                IpAddr::V6(segments.into())
            }
        }
    }

    fn matches(record: &QueryLogRecord, params: &QueryLogSearch) -> bool {
        if let Some(client) = &params.client {
            let by_ip = record
                .client_ip
                .map(|ip| ip.to_string() == *client)
                .unwrap_or(false);
            let by_name = record
                .client_name
                .as_deref()
                .map(|n| n.eq_ignore_ascii_case(client))
                .unwrap_or(false);
            if !by_ip && !by_name {
                return false;
            }
        }
        if let Some(domain) = &params.domain {
            if !record.name.contains(domain.as_str()) {
                return false;
            }
        }
        if let Some(result) = params.result {
            if record.result != result {
                return false;
            }
        }
        if let Some(since) = params.since {
            if record.started_at < since {
                return false;
            }
        }
        if let Some(until) = params.until {
            if record.started_at > until {
                return false;
            }
        }
        true
    }
}

impl QueryLogPort for QueryLog {
    fn append(&self, mut record: QueryLogRecord) {
        if !self.config.enabled {
            return;
        }
        if self.config.anonymize_clients {
            record.client_ip = record.client_ip.map(Self::anonymize);
        }

        let mut ring = self.ring.lock().unwrap();
        if ring.len() >= self.config.ring_size.max(1) {
            ring.pop_front();
        }
        ring.push_back(record);
    }

    fn search(&self, params: &QueryLogSearch) -> Vec<QueryLogRecord> {
        let limit = if params.limit == 0 { 100 } else { params.limit };
        let mut out: Vec<QueryLogRecord> = Vec::new();

        // Ring first (newest records), newest-to-oldest.
        {
            let ring = self.ring.lock().unwrap();
            for record in ring.iter().rev() {
                if Self::matches(record, params) {
                    out.push(record.clone());
                    if out.len() >= limit {
                        return out;
                    }
                }
            }
        }

        let mut flushed = self.files.read_all();
        flushed.reverse();
        for record in flushed {
            if Self::matches(&record, params) {
                out.push(record);
                if out.len() >= limit {
                    break;
                }
            }
        }
        out
    }
}
