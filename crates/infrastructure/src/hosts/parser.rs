use std::net::IpAddr;

/// One `IP name [aliases…]` binding from a hosts file. All aliases index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostsEntry {
    pub ip: IpAddr,
    pub names: Vec<String>,
}

/// Parse a hosts-file text. Malformed lines are skipped silently; hosts
/// files in the wild are full of them.
pub fn parse_hosts(text: &str) -> Vec<HostsEntry> {
    let mut entries = Vec::new();

    for line in text.lines() {
        let line = match line.split_once('#') {
            Some((before, _)) => before,
            None => line,
        }
        .trim();
        if line.is_empty() {
            continue;
        }

        let mut parts = line.split_whitespace();
        let Some(ip) = parts.next().and_then(|t| t.parse::<IpAddr>().ok()) else {
            continue;
        };

        let names: Vec<String> = parts
            .map(|name| {
                name.trim_end_matches('.')
                    .to_ascii_lowercase()
            })
            .filter(|name| !name.is_empty())
            .collect();

        if !names.is_empty() {
            entries.push(HostsEntry { ip, names });
        }
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases_and_comments() {
        let text = "# local machines\n192.168.1.10 NAS nas.lan storage # main box\n\nbogus line\n::1 router6\n";
        let entries = parse_hosts(text);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].names, vec!["nas", "nas.lan", "storage"]);
        assert_eq!(entries[1].ip, "::1".parse::<IpAddr>().unwrap());
    }
}
