use aegis_dns_domain::config::LoggingConfig;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the tracing subscriber. `RUST_LOG` wins over the config file;
/// a `--log-level` flag wins over both.
pub fn init(config: &LoggingConfig, override_level: Option<&str>) {
    let directive = override_level.unwrap_or(&config.level);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directive));

    if config.json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt().with_env_filter(filter).init();
    }
}
