use aegis_dns_domain::CoreConfig;
use anyhow::Context;
use std::path::Path;
use tracing::warn;

/// Load the TOML config. A missing file starts from defaults so a bare
/// `aegis-dns` run works out of the box.
pub fn load(path: &Path, data_dir_override: Option<&str>) -> anyhow::Result<CoreConfig> {
    let mut config = if path.exists() {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        CoreConfig::from_toml(&text).with_context(|| format!("parsing {}", path.display()))?
    } else {
        warn!(path = %path.display(), "Config file not found, using defaults");
        CoreConfig::default()
    };

    if let Some(dir) = data_dir_override {
        config.server.data_dir = dir.to_string();
    }

    config.validate().context("validating configuration")?;
    Ok(config)
}
