use crate::record_type::RecordType;
use ipnetwork::IpNetwork;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

/// List id carried by rules entered directly by the user. User rules outrank
/// every downloaded list in tie-breaking.
pub const USER_RULES_LIST_ID: i64 = 0;

/// How a rule's pattern binds to a query name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RulePattern {
    /// `example.com` — this name only.
    Exact(String),
    /// `*.example.com` — proper subdomains only, never the apex.
    Wildcard(String),
    /// `||example.com^` — the apex and every subdomain.
    Anchored(String),
    /// `/tracker[0-9]+/` — evaluated against the full query name.
    Regex(String),
}

impl RulePattern {
    /// The suffix the compiled trie indexes this pattern under, if any.
    pub fn trie_suffix(&self) -> Option<&str> {
        match self {
            Self::Exact(d) | Self::Wildcard(d) | Self::Anchored(d) => Some(d),
            Self::Regex(_) => None,
        }
    }
}

/// Response code a `$dnsrewrite` rule may force.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteRcode {
    NoError,
    NxDomain,
    Refused,
}

/// One synthetic resource record value produced by a rewrite rule.
///
/// Domain-valued fields keep their configured case where DNS allows it; the
/// engine lowercases only for matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteValue {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Cname(String),
    Mx { preference: u16, exchange: String },
    Srv { priority: u16, weight: u16, port: u16, target: String },
    Txt(String),
    /// SVCB and HTTPS share the wire shape; `params` keeps declaration order.
    SvcRecord {
        https: bool,
        priority: u16,
        target: String,
        params: Vec<(String, String)>,
    },
    /// Target is always stored with the trailing dot enforced.
    Ptr(String),
}

impl RewriteValue {
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::A(_) => RecordType::A,
            Self::Aaaa(_) => RecordType::AAAA,
            Self::Cname(_) => RecordType::CNAME,
            Self::Mx { .. } => RecordType::MX,
            Self::Srv { .. } => RecordType::SRV,
            Self::Txt(_) => RecordType::TXT,
            Self::SvcRecord { https: true, .. } => RecordType::HTTPS,
            Self::SvcRecord { https: false, .. } => RecordType::SVCB,
            Self::Ptr(_) => RecordType::PTR,
        }
    }
}

/// Parsed `$dnsrewrite` payload: a forced rcode, plus an optional typed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRewrite {
    pub rcode: RewriteRcode,
    pub rtype: Option<RecordType>,
    pub value: Option<RewriteValue>,
}

impl DnsRewrite {
    /// `NOERROR` with no data.
    pub fn empty() -> Self {
        Self {
            rcode: RewriteRcode::NoError,
            rtype: None,
            value: None,
        }
    }

    pub fn status(rcode: RewriteRcode) -> Self {
        Self {
            rcode,
            rtype: None,
            value: None,
        }
    }

    pub fn answer(value: RewriteValue) -> Self {
        Self {
            rcode: RewriteRcode::NoError,
            rtype: Some(value.record_type()),
            value: Some(value),
        }
    }
}

/// `$client` modifier: restricts a rule to (or excludes it from) a set of
/// clients named by tag, name, IP, or CIDR.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientFilter {
    pub names: Vec<String>,
    pub ips: Vec<IpAddr>,
    pub subnets: Vec<IpNetwork>,
    /// Entries prefixed with `~` invert: listed clients are excluded.
    pub negated: bool,
}

impl ClientFilter {
    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.ips.is_empty() && self.subnets.is_empty()
    }
}

/// What a matched rule does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleAction {
    Block,
    Allow,
    Rewrite(DnsRewrite),
}

/// One compiled filtering rule. `index` is the declaration position inside
/// its list and drives within-tier tie-breaking.
#[derive(Debug, Clone)]
pub struct FilterRule {
    pub list_id: i64,
    pub index: u32,
    pub text: Arc<str>,
    pub pattern: RulePattern,
    pub action: RuleAction,
    pub important: bool,
    pub client: Option<ClientFilter>,
    pub denyallow: Vec<String>,
    pub dnstypes: Vec<RecordType>,
}

impl FilterRule {
    pub fn rule_ref(&self) -> RuleRef {
        RuleRef {
            list_id: self.list_id,
            text: Arc::clone(&self.text),
        }
    }

    /// Tier per the matcher's resolution order. Higher wins.
    pub fn tier(&self) -> u8 {
        match (&self.action, self.important) {
            (RuleAction::Allow, true) => 5,
            (RuleAction::Block, true) => 4,
            (RuleAction::Allow, false) => 3,
            (RuleAction::Block, false) => 2,
            (RuleAction::Rewrite(_), _) => 1,
        }
    }
}

/// A matched rule as surfaced to the query log: which list it came from and
/// its original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleRef {
    pub list_id: i64,
    pub text: Arc<str>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_order_matches_resolution_contract() {
        let base = FilterRule {
            list_id: 1,
            index: 0,
            text: Arc::from("||example.com^"),
            pattern: RulePattern::Anchored("example.com".into()),
            action: RuleAction::Block,
            important: false,
            client: None,
            denyallow: vec![],
            dnstypes: vec![],
        };

        let mut important_allow = base.clone();
        important_allow.action = RuleAction::Allow;
        important_allow.important = true;

        let mut important_block = base.clone();
        important_block.important = true;

        let mut allow = base.clone();
        allow.action = RuleAction::Allow;

        let mut rewrite = base.clone();
        rewrite.action = RuleAction::Rewrite(DnsRewrite::empty());

        assert!(important_allow.tier() > important_block.tier());
        assert!(important_block.tier() > allow.tier());
        assert!(allow.tier() > base.tier());
        assert!(base.tier() > rewrite.tier());
    }

    #[test]
    fn rewrite_value_types() {
        let v = RewriteValue::SvcRecord {
            https: true,
            priority: 1,
            target: ".".into(),
            params: vec![("alpn".into(), "h2".into())],
        };
        assert_eq!(v.record_type(), RecordType::HTTPS);
        assert_eq!(
            RewriteValue::Ptr("host.example.".into()).record_type(),
            RecordType::PTR
        );
    }
}
