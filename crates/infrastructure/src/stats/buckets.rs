use aegis_dns_application::ports::StatsPort;
use aegis_dns_domain::{
    config::StatsConfig, QueryLogRecord, ResultReason, StatsBucket, StatsSnapshot, TopEntry,
};
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Rows kept per top-N table.
const TOP_N: usize = 20;

#[derive(Default)]
struct Accumulator {
    start: Option<DateTime<Utc>>,
    total: u64,
    blocked_rule: u64,
    blocked_safebrowsing: u64,
    blocked_safesearch: u64,
    blocked_parental: u64,
    blocked_service: u64,
    elapsed_sum_us: u64,
    domains: FxHashMap<String, u64>,
    blocked_domains: FxHashMap<String, u64>,
    clients: FxHashMap<String, u64>,
}

impl Accumulator {
    fn finalize(self) -> StatsBucket {
        StatsBucket {
            start: self.start,
            total: self.total,
            blocked_rule: self.blocked_rule,
            blocked_safebrowsing: self.blocked_safebrowsing,
            blocked_safesearch: self.blocked_safesearch,
            blocked_parental: self.blocked_parental,
            blocked_service: self.blocked_service,
            elapsed_sum_us: self.elapsed_sum_us,
            top_domains: top_n(self.domains),
            top_blocked: top_n(self.blocked_domains),
            top_clients: top_n(self.clients),
        }
    }
}

fn top_n(counts: FxHashMap<String, u64>) -> Vec<TopEntry> {
    let mut entries: Vec<TopEntry> = counts
        .into_iter()
        .map(|(key, count)| TopEntry { key, count })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    entries.truncate(TOP_N);
    entries
}

struct Inner {
    current: Accumulator,
    sealed: VecDeque<StatsBucket>,
    dirty: bool,
}

/// Per-interval statistics counters. A zero interval disables collection
/// entirely; the flusher then has nothing to write.
pub struct StatsTracker {
    config: StatsConfig,
    inner: Mutex<Inner>,
}

impl StatsTracker {
    pub fn new(config: StatsConfig, restored: Vec<StatsBucket>) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                current: Accumulator::default(),
                sealed: restored.into(),
                dirty: false,
            }),
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.interval_secs > 0
    }

    /// Seal the current accumulator when its interval has lapsed.
    fn roll(&self, inner: &mut Inner, now: DateTime<Utc>) {
        let Some(start) = inner.current.start else {
            return;
        };
        let elapsed = (now - start).num_seconds().max(0) as u64;
        if elapsed < self.config.interval_secs {
            return;
        }

        let sealed = std::mem::take(&mut inner.current).finalize();
        inner.sealed.push_back(sealed);
        while inner.sealed.len() > self.config.retained_buckets.max(1) {
            inner.sealed.pop_front();
        }
        inner.dirty = true;
    }

    /// Sealed buckets pending a write, clearing the dirty flag. The flusher
    /// persists what this returns.
    pub fn take_dirty(&self) -> Option<Vec<StatsBucket>> {
        let mut inner = self.inner.lock().unwrap();
        self.roll(&mut inner, Utc::now());
        if !inner.dirty {
            return None;
        }
        inner.dirty = false;
        Some(inner.sealed.iter().cloned().collect())
    }
}

impl StatsPort for StatsTracker {
    fn record(&self, record: &QueryLogRecord) {
        if !self.enabled() {
            return;
        }

        let mut inner = self.inner.lock().unwrap();
        let now = record.started_at;
        self.roll(&mut inner, now);

        let current = &mut inner.current;
        if current.start.is_none() {
            current.start = Some(now);
        }

        current.total += 1;
        current.elapsed_sum_us += record.elapsed_us;

        match record.result {
            ResultReason::FilteredBlockList => current.blocked_rule += 1,
            ResultReason::FilteredSafeBrowsing => current.blocked_safebrowsing += 1,
            ResultReason::FilteredSafeSearch => current.blocked_safesearch += 1,
            ResultReason::FilteredParental => current.blocked_parental += 1,
            ResultReason::FilteredBlockedService => current.blocked_service += 1,
            _ => {}
        }

        *current.domains.entry(record.name.to_string()).or_default() += 1;
        if record.result.is_blocked() {
            *current
                .blocked_domains
                .entry(record.name.to_string())
                .or_default() += 1;
        }
        if let Some(client) = record
            .client_name
            .clone()
            .or_else(|| record.client_ip.map(|ip| ip.to_string()))
        {
            *current.clients.entry(client).or_default() += 1;
        }
    }

    fn snapshot(&self) -> StatsSnapshot {
        let inner = self.inner.lock().unwrap();

        let mut total = 0u64;
        let mut blocked = 0u64;
        let mut elapsed = 0u64;
        let mut domains: FxHashMap<String, u64> = FxHashMap::default();
        let mut blocked_domains: FxHashMap<String, u64> = FxHashMap::default();
        let mut clients: FxHashMap<String, u64> = FxHashMap::default();

        let live = [&inner.current];
        for acc in live {
            total += acc.total;
            blocked += acc.blocked_rule
                + acc.blocked_safebrowsing
                + acc.blocked_safesearch
                + acc.blocked_parental
                + acc.blocked_service;
            elapsed += acc.elapsed_sum_us;
            for (k, v) in &acc.domains {
                *domains.entry(k.clone()).or_default() += v;
            }
            for (k, v) in &acc.blocked_domains {
                *blocked_domains.entry(k.clone()).or_default() += v;
            }
            for (k, v) in &acc.clients {
                *clients.entry(k.clone()).or_default() += v;
            }
        }

        for bucket in &inner.sealed {
            total += bucket.total;
            blocked += bucket.blocked_total();
            elapsed += bucket.elapsed_sum_us;
            for entry in &bucket.top_domains {
                *domains.entry(entry.key.clone()).or_default() += entry.count;
            }
            for entry in &bucket.top_blocked {
                *blocked_domains.entry(entry.key.clone()).or_default() += entry.count;
            }
            for entry in &bucket.top_clients {
                *clients.entry(entry.key.clone()).or_default() += entry.count;
            }
        }

        StatsSnapshot {
            total,
            blocked,
            avg_elapsed_us: if total == 0 { 0 } else { elapsed / total },
            top_domains: top_n(domains),
            top_blocked: top_n(blocked_domains),
            top_clients: top_n(clients),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_dns_domain::{RCode, RecordType};
    use std::sync::Arc;

    fn config(interval: u64) -> StatsConfig {
        StatsConfig {
            interval_secs: interval,
            ..StatsConfig::default()
        }
    }

    fn record(name: &str, result: ResultReason) -> QueryLogRecord {
        QueryLogRecord {
            started_at: Utc::now(),
            name: Arc::from(name),
            qtype: RecordType::A,
            qclass: 1,
            proto: "udp".into(),
            result,
            rcode: RCode::NoError,
            rules: vec![],
            upstream: None,
            elapsed_us: 500,
            upstream_us: None,
            response_size: 48,
            client_ip: Some("10.0.0.3".parse().unwrap()),
            client_name: None,
            cached: false,
        }
    }

    #[test]
    fn zero_interval_disables_collection() {
        let stats = StatsTracker::new(config(0), vec![]);
        stats.record(&record("a.example", ResultReason::Ok));
        assert_eq!(stats.snapshot().total, 0);
    }

    #[test]
    fn counters_classify_block_reasons() {
        let stats = StatsTracker::new(config(3600), vec![]);
        stats.record(&record("a.example", ResultReason::Ok));
        stats.record(&record("ads.example", ResultReason::FilteredBlockList));
        stats.record(&record("bad.example", ResultReason::FilteredSafeBrowsing));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total, 3);
        assert_eq!(snapshot.blocked, 2);
        assert_eq!(snapshot.avg_elapsed_us, 500);
        assert!(snapshot
            .top_blocked
            .iter()
            .any(|e| e.key == "ads.example"));
        assert!(snapshot.top_clients.iter().any(|e| e.key == "10.0.0.3"));
    }
}
