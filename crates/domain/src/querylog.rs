use crate::record_type::{RCode, RecordType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;

/// Result classification written to the query log `result` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultReason {
    Ok,
    FilteredBlockList,
    /// Informational: an allow rule matched, the query was not blocked.
    FilteredAllowList,
    FilteredRewrite,
    FilteredSafeBrowsing,
    FilteredParental,
    FilteredSafeSearch,
    FilteredBlockedService,
    /// Answered from the hosts/DHCP view.
    RewrittenAutoClient,
    ServedStale,
    ErrorUpstream,
    ErrorRefusedAccess,
    ErrorFormat,
    ErrorInternal,
}

impl ResultReason {
    /// True for every classification that counts as "blocked" in statistics.
    pub fn is_blocked(self) -> bool {
        matches!(
            self,
            Self::FilteredBlockList
                | Self::FilteredSafeBrowsing
                | Self::FilteredParental
                | Self::FilteredSafeSearch
                | Self::FilteredBlockedService
        )
    }
}

/// One completed request, as appended to the query-log ring.
///
/// Encoded as NDJSON when flushed; field names are part of the on-disk
/// format and must stay stable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryLogRecord {
    #[serde(rename = "t")]
    pub started_at: DateTime<Utc>,

    pub name: Arc<str>,
    pub qtype: RecordType,
    pub qclass: u16,
    pub proto: String,

    pub result: ResultReason,
    pub rcode: RCode,

    /// Rules that applied, as `(list_id, rule_text)` pairs.
    #[serde(default)]
    pub rules: Vec<(i64, String)>,

    /// Upstream that produced the answer; `cache:<upstream>` for cache hits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<String>,

    /// Microseconds from receipt to reply.
    pub elapsed_us: u64,
    /// Microseconds spent waiting on the upstream, when one was consulted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_us: Option<u64>,

    pub response_size: usize,

    /// Possibly anonymised, absent when client logging is disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,

    #[serde(default)]
    pub cached: bool,
}

/// Search parameters for the query-log API.
#[derive(Debug, Clone, Default)]
pub struct QueryLogSearch {
    pub client: Option<String>,
    pub domain: Option<String>,
    pub result: Option<ResultReason>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_reason_serializes_snake_case() {
        let json = serde_json::to_string(&ResultReason::FilteredSafeBrowsing).unwrap();
        assert_eq!(json, "\"filtered_safe_browsing\"");
        let json = serde_json::to_string(&ResultReason::RewrittenAutoClient).unwrap();
        assert_eq!(json, "\"rewritten_auto_client\"");
    }

    #[test]
    fn blocked_classification() {
        assert!(ResultReason::FilteredBlockList.is_blocked());
        assert!(ResultReason::FilteredBlockedService.is_blocked());
        assert!(!ResultReason::FilteredAllowList.is_blocked());
        assert!(!ResultReason::ServedStale.is_blocked());
    }
}
