//! Blocked-services registry: a built-in service → domain-suffix index.
//!
//! Per-client blocked-service sets are evaluated against this table after
//! list rules; services are policy, not lists, so allow rules (including
//! `$important` ones) do not unblock them.

/// Domains (apex + subdomains) belonging to each known service id.
const SERVICES: &[(&str, &[&str])] = &[
    ("facebook", &["facebook.com", "facebook.net", "fbcdn.net", "fb.com", "messenger.com"]),
    ("instagram", &["instagram.com", "cdninstagram.com", "ig.me"]),
    ("tiktok", &["tiktok.com", "tiktokv.com", "tiktokcdn.com", "musical.ly", "byteoversea.com"]),
    ("twitter", &["twitter.com", "twimg.com", "t.co", "x.com"]),
    ("youtube", &["youtube.com", "youtu.be", "ytimg.com", "googlevideo.com", "youtube-nocookie.com"]),
    ("netflix", &["netflix.com", "nflxvideo.net", "nflximg.net", "nflxext.com"]),
    ("twitch", &["twitch.tv", "ttvnw.net", "jtvnw.net"]),
    ("discord", &["discord.com", "discord.gg", "discordapp.com", "discordapp.net"]),
    ("reddit", &["reddit.com", "redd.it", "redditmedia.com", "redditstatic.com"]),
    ("snapchat", &["snapchat.com", "sc-cdn.net", "snap-dev.net"]),
    ("whatsapp", &["whatsapp.com", "whatsapp.net", "wa.me"]),
    ("telegram", &["telegram.org", "t.me", "telegram.me", "telesco.pe"]),
    ("steam", &["steampowered.com", "steamcommunity.com", "steamstatic.com", "steamcontent.com"]),
    ("epic_games", &["epicgames.com", "unrealengine.com", "easyanticheat.net"]),
    ("minecraft", &["minecraft.net", "mojang.com"]),
    ("spotify", &["spotify.com", "scdn.co", "spotifycdn.com"]),
    ("amazon", &["amazon.com", "amazon.co.uk", "amazon.de", "media-amazon.com", "ssl-images-amazon.com"]),
    ("ebay", &["ebay.com", "ebaystatic.com", "ebayimg.com"]),
    ("pinterest", &["pinterest.com", "pinimg.com"]),
    ("onlyfans", &["onlyfans.com"]),
];

/// True when `service` is a known id.
pub fn is_known(service: &str) -> bool {
    SERVICES.iter().any(|(id, _)| *id == service)
}

/// All known service ids, for config validation and the admin surface.
pub fn known_ids() -> impl Iterator<Item = &'static str> {
    SERVICES.iter().map(|(id, _)| *id)
}

/// True when `name` belongs to `service` (apex or subdomain).
pub fn matches(service: &str, name: &str) -> bool {
    let Some((_, domains)) = SERVICES.iter().find(|(id, _)| *id == service) else {
        return false;
    };
    domains.iter().any(|domain| {
        name == *domain
            || name
                .strip_suffix(domain)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apex_and_subdomain_match() {
        assert!(matches("youtube", "youtube.com"));
        assert!(matches("youtube", "www.youtube.com"));
        assert!(matches("youtube", "r3---sn-example.googlevideo.com"));
        assert!(!matches("youtube", "notyoutube.com"));
    }

    #[test]
    fn unknown_service_never_matches() {
        assert!(!matches("no-such-service", "example.com"));
        assert!(!is_known("no-such-service"));
        assert!(is_known("steam"));
    }
}
