use aegis_dns_domain::CoreError;
use async_trait::async_trait;

/// Hash-prefix reputation lookup backing safe-browsing and parental control.
#[async_trait]
pub trait ReputationLookup: Send + Sync {
    /// True when `domain`'s registrable domain is on the list.
    async fn is_listed(&self, domain: &str) -> Result<bool, CoreError>;
}
