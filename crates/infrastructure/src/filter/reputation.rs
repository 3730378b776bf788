//! Hash-prefix reputation lookups for safe-browsing and parental control.
//!
//! The service is queried with a short hex prefix of the SHA-256 of the
//! question's registrable domain and answers with the full hashes it knows
//! under that prefix, so the queried name never leaves the host.

use aegis_dns_application::ports::ReputationLookup;
use aegis_dns_domain::{config::SafeBrowsingConfig, CoreError};
use async_trait::async_trait;
use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Hex characters of the hash sent to the service (4 bytes).
const PREFIX_LEN: usize = 8;

struct CachedVerdict {
    hashes: Vec<String>,
    fetched_at: Instant,
}

pub struct HashPrefixClient {
    endpoint: String,
    cache_ttl: Duration,
    http: reqwest::Client,
    /// prefix → full hashes served for it. Negative results cache as an
    /// empty vec.
    cache: DashMap<String, CachedVerdict, FxBuildHasher>,
}

impl HashPrefixClient {
    pub fn new(config: &SafeBrowsingConfig, http: reqwest::Client) -> Self {
        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            cache_ttl: Duration::from_secs(config.cache_secs.max(1)),
            http,
            cache: DashMap::with_hasher(FxBuildHasher),
        }
    }

    async fn hashes_for_prefix(&self, prefix: &str) -> Result<Vec<String>, CoreError> {
        if let Some(cached) = self.cache.get(prefix) {
            if cached.fetched_at.elapsed() < self.cache_ttl {
                return Ok(cached.hashes.clone());
            }
        }

        let url = format!("{}/{}", self.endpoint, prefix);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| CoreError::Internal(format!("reputation fetch failed: {e}")))?;

        if !response.status().is_success() {
            return Err(CoreError::Internal(format!(
                "reputation service returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CoreError::Internal(format!("reputation read failed: {e}")))?;

        let hashes: Vec<String> = body
            .lines()
            .map(|l| l.trim().to_ascii_lowercase())
            .filter(|l| !l.is_empty())
            .collect();

        debug!(prefix = %prefix, hits = hashes.len(), "Reputation prefix fetched");

        self.cache.insert(
            prefix.to_string(),
            CachedVerdict {
                hashes: hashes.clone(),
                fetched_at: Instant::now(),
            },
        );

        Ok(hashes)
    }
}

#[async_trait]
impl ReputationLookup for HashPrefixClient {
    async fn is_listed(&self, domain: &str) -> Result<bool, CoreError> {
        let host = registrable_domain(domain);
        let full_hash = sha256_hex(&host);
        let prefix = &full_hash[..PREFIX_LEN];

        match self.hashes_for_prefix(prefix).await {
            Ok(hashes) => Ok(hashes.iter().any(|h| h == &full_hash)),
            Err(e) => {
                // Lookup failures never block resolution.
                warn!(domain = %host, error = %e, "Reputation lookup failed");
                Err(e)
            }
        }
    }
}

fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Approximate the registrable domain: the last two labels, or three when
/// the second-level label is a well-known registry suffix (`co.uk` etc.).
pub fn registrable_domain(domain: &str) -> String {
    const REGISTRY_SECOND_LEVELS: [&str; 8] =
        ["co", "com", "org", "net", "gov", "edu", "ac", "mil"];

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() <= 2 {
        return domain.to_string();
    }

    let tld = labels[labels.len() - 1];
    let second = labels[labels.len() - 2];
    let take = if tld.len() == 2 && REGISTRY_SECOND_LEVELS.contains(&second) {
        3
    } else {
        2
    };

    labels[labels.len() - take.min(labels.len())..].join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registrable_domain_plain() {
        assert_eq!(registrable_domain("www.example.com"), "example.com");
        assert_eq!(registrable_domain("a.b.c.example.org"), "example.org");
        assert_eq!(registrable_domain("example.com"), "example.com");
    }

    #[test]
    fn registrable_domain_registry_suffix() {
        assert_eq!(registrable_domain("www.example.co.uk"), "example.co.uk");
        assert_eq!(registrable_domain("shop.example.ac.jp"), "example.ac.jp");
    }

    #[test]
    fn sha_prefix_is_stable() {
        let h = sha256_hex("example.com");
        assert_eq!(h.len(), 64);
        assert_eq!(&h[..PREFIX_LEN], &sha256_hex("example.com")[..PREFIX_LEN]);
    }
}
