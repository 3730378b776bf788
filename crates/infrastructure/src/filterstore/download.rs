use aegis_dns_domain::CoreError;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Download budget for one list fetch.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetch a rule list over HTTP.
///
/// Requires a 200 response and a `text/plain`-prefixed content type; anything
/// else is treated as a failed refresh and leaves the previous content alone.
pub async fn fetch_list(client: &reqwest::Client, url: &str) -> Result<String, CoreError> {
    let response = client
        .get(url)
        .timeout(FETCH_TIMEOUT)
        .send()
        .await
        .map_err(|e| CoreError::FilterList(format!("fetch error for {url}: {e}")))?;

    let status = response.status();
    if status.as_u16() != 200 {
        return Err(CoreError::FilterList(format!(
            "HTTP {} for {url}",
            status.as_u16()
        )));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !content_type.starts_with("text/plain") {
        return Err(CoreError::FilterList(format!(
            "unexpected content type {content_type:?} for {url}"
        )));
    }

    let text = response
        .text()
        .await
        .map_err(|e| CoreError::FilterList(format!("read error for {url}: {e}")))?;

    debug!(url = %url, bytes = text.len(), "Fetched rule list");
    Ok(text)
}

/// Read a locally sourced list (a filesystem path instead of a URL).
pub async fn read_local(path: &Path) -> Result<String, CoreError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CoreError::FilterList(format!("read error for {}: {e}", path.display())))
}

pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}
