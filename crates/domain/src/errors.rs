use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid upstream endpoint: {0}")]
    InvalidUpstream(String),

    #[error("Invalid filter rule: {0}")]
    InvalidRule(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Wire format error: {0}")]
    WireFormat(String),

    #[error("All upstreams failed: {0}")]
    UpstreamFailed(String),

    #[error("Bootstrap resolution failed for {0}")]
    BootstrapFailed(String),

    #[error("Query timeout")]
    QueryTimeout,

    #[error("Access denied")]
    AccessDenied,

    #[error("Filter list error: {0}")]
    FilterList(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Io(e.to_string())
    }
}
