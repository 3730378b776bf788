//! Safe-search redirection: hard-coded per-provider hostname maps, applied
//! when a client's policy enables the feature.

use aegis_dns_domain::RewriteValue;
use std::net::Ipv4Addr;

/// The safe variant for a search-engine hostname, if we know one.
///
/// CNAME targets are the providers' documented safe-search endpoints; Yandex
/// publishes a fixed address instead of a hostname.
pub fn lookup(host: &str) -> Option<RewriteValue> {
    // Google: every national domain shares one enforcement CNAME.
    if let Some(rest) = host.strip_prefix("www.google.") {
        if is_google_tld(rest) {
            return Some(cname("forcesafesearch.google.com"));
        }
    }

    match host {
        "www.youtube.com"
        | "m.youtube.com"
        | "youtubei.googleapis.com"
        | "youtube.googleapis.com"
        | "www.youtube-nocookie.com" => Some(cname("restrictmoderate.youtube.com")),

        "www.bing.com" => Some(cname("strict.bing.com")),

        "duckduckgo.com" | "www.duckduckgo.com" => Some(cname("safe.duckduckgo.com")),

        "pixabay.com" => Some(cname("safesearch.pixabay.com")),

        "yandex.ru" | "yandex.com" | "yandex.by" | "yandex.kz" | "yandex.ua" => {
            Some(RewriteValue::A(Ipv4Addr::new(213, 180, 193, 56)))
        }

        _ => None,
    }
}

fn cname(target: &str) -> RewriteValue {
    RewriteValue::Cname(target.to_string())
}

fn is_google_tld(tld: &str) -> bool {
    // The common single- and two-label Google ccTLDs; enough that every label
    // is short, alphabetic, and dot-separated.
    !tld.is_empty()
        && tld.len() <= 6
        && tld
            .split('.')
            .all(|l| !l.is_empty() && l.chars().all(|c| c.is_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn google_domains_redirect() {
        assert!(matches!(
            lookup("www.google.com"),
            Some(RewriteValue::Cname(t)) if t == "forcesafesearch.google.com"
        ));
        assert!(lookup("www.google.co.uk").is_some());
        assert!(lookup("maps.google.com").is_none());
    }

    #[test]
    fn youtube_restricted() {
        assert!(matches!(
            lookup("www.youtube.com"),
            Some(RewriteValue::Cname(t)) if t == "restrictmoderate.youtube.com"
        ));
    }

    #[test]
    fn yandex_uses_fixed_address() {
        assert!(matches!(lookup("yandex.ru"), Some(RewriteValue::A(_))));
    }

    #[test]
    fn unrelated_host_passes() {
        assert!(lookup("example.com").is_none());
    }
}
