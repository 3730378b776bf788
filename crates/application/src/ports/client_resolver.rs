use aegis_dns_domain::{ClientPolicy, QueryOrigin};

/// Maps a request origin to the persistent-client policy that governs it.
pub trait ClientResolverPort: Send + Sync {
    /// Never fails: unmatched origins get the anonymous default policy.
    fn resolve(&self, origin: &QueryOrigin) -> ClientPolicy;

    /// The ClientID carried by the transport, if any. Exposed separately so
    /// the access check can run before full client resolution.
    fn extract_client_id(&self, origin: &QueryOrigin) -> Option<String>;
}
