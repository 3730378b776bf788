//! Rule list parsing: AdBlock-style rules, hosts-file lines, comments, and
//! the `! Title:` header.

use super::rewrite::parse_dnsrewrite;
use aegis_dns_domain::rules::ClientFilter;
use aegis_dns_domain::{
    CoreError, DnsRewrite, FilterRule, RecordType, RuleAction, RulePattern, RewriteValue,
};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

/// Outcome of parsing one full list text.
pub struct ParsedList {
    /// From a leading `! Title:` header, when present.
    pub title: Option<String>,
    pub rules: Vec<FilterRule>,
    /// Lines that looked like rules but failed to parse.
    pub errors: usize,
}

/// Parse a whole list. `list_id` and per-line indices are stamped onto every
/// produced rule; bad lines are counted and skipped, never fatal.
pub fn parse_list(list_id: i64, text: &str) -> ParsedList {
    let mut title = None;
    let mut rules = Vec::new();
    let mut errors = 0usize;
    let mut index = 0u32;

    for line in text.lines() {
        let line = line.trim();

        if let Some(rest) = line.strip_prefix("! Title:") {
            if title.is_none() {
                title = Some(rest.trim().to_string());
            }
            continue;
        }
        if line.is_empty() || line.starts_with('!') || line.starts_with('#') {
            continue;
        }

        match parse_rule_line(line) {
            Ok(parsed) => {
                for mut rule in parsed {
                    rule.list_id = list_id;
                    rule.index = index;
                    index += 1;
                    rules.push(rule);
                }
            }
            Err(e) => {
                debug!(line = %line, error = %e, "Skipping unparsable rule line");
                errors += 1;
            }
        }
    }

    ParsedList { title, rules, errors }
}

/// Parse one non-comment line. Hosts lines can yield several rules (one per
/// alias), which is why this returns a Vec.
pub fn parse_rule_line(line: &str) -> Result<Vec<FilterRule>, CoreError> {
    if let Some(rules) = parse_hosts_line(line) {
        return Ok(rules);
    }
    parse_adblock_line(line).map(|r| vec![r])
}

// ---------------------------------------------------------------------------
// Hosts-file syntax
// ---------------------------------------------------------------------------

/// `IP name [aliases…]`. Sinkhole addresses block; any other address becomes
/// a rewrite to that address.
fn parse_hosts_line(line: &str) -> Option<Vec<FilterRule>> {
    let mut parts = line.split_whitespace();
    let addr: IpAddr = parts.next()?.parse().ok()?;

    let names: Vec<&str> = parts.take_while(|p| !p.starts_with('#')).collect();
    if names.is_empty() {
        return None;
    }

    let sinkhole = addr.is_unspecified() || addr.is_loopback();

    let mut rules = Vec::new();
    for name in names {
        // Self-referential entries common in stock hosts files
        if matches!(
            name,
            "localhost" | "localhost.localdomain" | "broadcasthost" | "ip6-localhost" | "ip6-loopback"
        ) {
            continue;
        }
        let domain = normalize_domain(name)?;
        let action = if sinkhole {
            RuleAction::Block
        } else {
            RuleAction::Rewrite(DnsRewrite::answer(match addr {
                IpAddr::V4(v4) => RewriteValue::A(v4),
                IpAddr::V6(v6) => RewriteValue::Aaaa(v6),
            }))
        };
        rules.push(FilterRule {
            list_id: 0,
            index: 0,
            text: Arc::from(line),
            pattern: RulePattern::Exact(domain),
            action,
            important: false,
            client: None,
            denyallow: vec![],
            dnstypes: vec![],
        });
    }

    if rules.is_empty() {
        None
    } else {
        Some(rules)
    }
}

// ---------------------------------------------------------------------------
// AdBlock syntax
// ---------------------------------------------------------------------------

fn parse_adblock_line(line: &str) -> Result<FilterRule, CoreError> {
    let (body, allow) = match line.strip_prefix("@@") {
        Some(rest) => (rest, true),
        None => (line, false),
    };

    let (pattern_text, modifier_text) = split_modifiers(body);
    let pattern = parse_pattern(pattern_text)?;

    let mut action = if allow {
        RuleAction::Allow
    } else {
        RuleAction::Block
    };
    let mut important = false;
    let mut client = None;
    let mut denyallow = Vec::new();
    let mut dnstypes = Vec::new();

    if let Some(modifiers) = modifier_text {
        for (name, value) in split_modifier_list(modifiers) {
            match name {
                "important" => important = true,
                "client" => client = Some(parse_client_filter(value)?),
                "denyallow" => {
                    for domain in value.split('|') {
                        denyallow.push(
                            normalize_domain(domain)
                                .ok_or_else(|| bad_rule(line, "bad denyallow domain"))?,
                        );
                    }
                }
                "dnstype" => {
                    for token in value.split('|') {
                        dnstypes.push(token.parse::<RecordType>()?);
                    }
                }
                "dnsrewrite" => {
                    if allow {
                        return Err(bad_rule(line, "allow rules cannot rewrite"));
                    }
                    action = RuleAction::Rewrite(parse_dnsrewrite(value)?);
                }
                other => return Err(bad_rule(line, &format!("unknown modifier ${other}"))),
            }
        }
    }

    Ok(FilterRule {
        list_id: 0,
        index: 0,
        text: Arc::from(line),
        pattern,
        action,
        important,
        client,
        denyallow,
        dnstypes,
    })
}

/// Split a rule body into pattern and modifier list at the `$` separator.
/// Regex patterns keep everything up to their closing `/`.
fn split_modifiers(body: &str) -> (&str, Option<&str>) {
    if let Some(rest) = body.strip_prefix('/') {
        if let Some(end) = rest.rfind('/') {
            let pattern_end = end + 2; // opening slash + closing slash
            let tail = &body[pattern_end..];
            if let Some(mods) = tail.strip_prefix('$') {
                return (&body[..pattern_end], Some(mods));
            }
            return (body, None);
        }
    }
    match body.split_once('$') {
        Some((pattern, mods)) => (pattern, Some(mods)),
        None => (body, None),
    }
}

/// Split `a=1,b,c=x,y` into `(a,"1") (b,"") (c,"x,y")`: a comma only starts a
/// new modifier when followed by a known modifier name, so values such as
/// `ipv4hint=1.2.3.4,5.6.7.8` survive intact.
fn split_modifier_list(text: &str) -> Vec<(&str, &str)> {
    const NAMES: [&str; 5] = ["important", "client", "denyallow", "dnstype", "dnsrewrite"];

    let mut out: Vec<(usize, usize)> = Vec::new(); // (start, eq-or-end)
    let mut start = 0usize;
    for (i, ch) in text.char_indices() {
        if ch == ',' {
            let next = &text[i + 1..];
            if NAMES
                .iter()
                .any(|n| next.starts_with(n) && matches!(next.as_bytes().get(n.len()), None | Some(b'=') | Some(b',')))
            {
                out.push((start, i));
                start = i + 1;
            }
        }
    }
    out.push((start, text.len()));

    out.into_iter()
        .map(|(s, e)| {
            let token = &text[s..e];
            match token.split_once('=') {
                Some((name, value)) => (name, value),
                None => (token, ""),
            }
        })
        .collect()
}

fn parse_pattern(text: &str) -> Result<RulePattern, CoreError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CoreError::InvalidRule("empty pattern".into()));
    }

    if text.starts_with('/') && text.ends_with('/') && text.len() > 2 {
        return Ok(RulePattern::Regex(text[1..text.len() - 1].to_string()));
    }

    if let Some(rest) = text.strip_prefix("||") {
        let domain = rest.strip_suffix('^').unwrap_or(rest);
        let domain =
            normalize_domain(domain).ok_or_else(|| bad_rule(text, "bad anchored domain"))?;
        return Ok(RulePattern::Anchored(domain));
    }

    if let Some(rest) = text.strip_prefix("*.") {
        let domain = normalize_domain(rest).ok_or_else(|| bad_rule(text, "bad wildcard domain"))?;
        return Ok(RulePattern::Wildcard(domain));
    }

    let domain = normalize_domain(text).ok_or_else(|| bad_rule(text, "bad domain"))?;
    Ok(RulePattern::Exact(domain))
}

fn parse_client_filter(value: &str) -> Result<ClientFilter, CoreError> {
    let mut filter = ClientFilter::default();

    for entry in value.split('|') {
        let entry = entry.trim().trim_matches('"').trim_matches('\'');
        let entry = match entry.strip_prefix('~') {
            Some(rest) => {
                filter.negated = true;
                rest
            }
            None => entry,
        };
        if entry.is_empty() {
            continue;
        }
        if let Ok(ip) = entry.parse::<IpAddr>() {
            filter.ips.push(ip);
        } else if let Ok(net) = entry.parse::<ipnetwork::IpNetwork>() {
            filter.subnets.push(net);
        } else {
            filter.names.push(entry.to_string());
        }
    }

    if filter.is_empty() {
        return Err(CoreError::InvalidRule("empty $client value".into()));
    }
    Ok(filter)
}

/// Lowercase, strip the trailing dot, and sanity-check the labels. IP
/// literals are allowed as "domains" so IP-literal block rules can hit the
/// post-upstream pass.
pub fn normalize_domain(domain: &str) -> Option<String> {
    let domain = domain.trim().trim_end_matches('.');
    if domain.is_empty() || domain.len() > 253 {
        return None;
    }
    if domain.parse::<IpAddr>().is_ok() {
        return Some(domain.to_ascii_lowercase());
    }
    for label in domain.split('.') {
        if label.is_empty() || label.len() > 63 {
            return None;
        }
        if !label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return None;
        }
    }
    Some(domain.to_ascii_lowercase())
}

fn bad_rule(line: &str, why: &str) -> CoreError {
    CoreError::InvalidRule(format!("{why}: {line}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchored_rule() {
        let rules = parse_rule_line("||ads.example.com^").unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(
            rules[0].pattern,
            RulePattern::Anchored("ads.example.com".into())
        );
        assert_eq!(rules[0].action, RuleAction::Block);
    }

    #[test]
    fn allow_rule_with_important() {
        let rules = parse_rule_line("@@||cdn.example.com^$important").unwrap();
        assert_eq!(rules[0].action, RuleAction::Allow);
        assert!(rules[0].important);
    }

    #[test]
    fn dnstype_modifier() {
        let rules = parse_rule_line("||example.org^$dnstype=A|AAAA").unwrap();
        assert_eq!(rules[0].dnstypes, vec![RecordType::A, RecordType::AAAA]);
    }

    #[test]
    fn client_modifier_mixed_entries() {
        let rules = parse_rule_line("||example.org^$client=192.168.0.0/24|kid-tv").unwrap();
        let client = rules[0].client.as_ref().unwrap();
        assert_eq!(client.subnets.len(), 1);
        assert_eq!(client.names, vec!["kid-tv".to_string()]);
        assert!(!client.negated);
    }

    #[test]
    fn dnsrewrite_modifier_with_commas_in_value() {
        let rules = parse_rule_line(
            "example.com$dnsrewrite=NOERROR;HTTPS;1 . ipv4hint=1.2.3.4,5.6.7.8,important",
        )
        .unwrap();
        assert!(rules[0].important);
        assert!(matches!(rules[0].action, RuleAction::Rewrite(_)));
    }

    #[test]
    fn hosts_line_sinkhole_blocks() {
        let rules = parse_rule_line("0.0.0.0 tracker.evil.net cdn.evil.net").unwrap();
        assert_eq!(rules.len(), 2);
        assert!(rules.iter().all(|r| r.action == RuleAction::Block));
    }

    #[test]
    fn hosts_line_real_ip_rewrites() {
        let rules = parse_rule_line("192.168.1.10 nas.lan").unwrap();
        assert!(matches!(rules[0].action, RuleAction::Rewrite(_)));
        assert_eq!(rules[0].pattern, RulePattern::Exact("nas.lan".into()));
    }

    #[test]
    fn hosts_localhost_skipped() {
        assert!(parse_rule_line("127.0.0.1 localhost").is_err());
    }

    #[test]
    fn regex_rule_keeps_dollar_inside() {
        let rules = parse_rule_line("/^ad[0-9]+\\./").unwrap();
        assert!(matches!(rules[0].pattern, RulePattern::Regex(_)));
    }

    #[test]
    fn list_title_and_error_count() {
        let text = "! Title: Test List\n! comment\n||ads.example.com^\nnot a rule line at all\n";
        let parsed = parse_list(7, text);
        assert_eq!(parsed.title.as_deref(), Some("Test List"));
        assert_eq!(parsed.rules.len(), 1);
        assert_eq!(parsed.rules[0].list_id, 7);
        assert_eq!(parsed.errors, 1);
    }
}
