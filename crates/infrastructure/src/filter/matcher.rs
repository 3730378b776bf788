use super::parser::{parse_list, ParsedList};
use super::trie::DomainTrie;
use aegis_dns_domain::rules::ClientFilter;
use aegis_dns_domain::{
    ClientPolicy, FilterRule, Question, RuleAction, RulePattern, USER_RULES_LIST_ID,
};
use smallvec::SmallVec;
use tracing::{debug, warn};

/// Per-list metadata surfaced after compilation.
#[derive(Debug, Clone)]
pub struct CompiledListInfo {
    pub list_id: i64,
    pub title: Option<String>,
    pub rule_count: usize,
    pub parse_errors: usize,
}

/// The compiled, immutable matcher. Produced from every enabled list plus the
/// user's inline rules; shared by reference via `ArcSwap` and never mutated.
pub struct RuleMatcher {
    rules: Vec<FilterRule>,
    trie: DomainTrie,
    regexes: Vec<(u32, fancy_regex::Regex)>,
    lists: Vec<CompiledListInfo>,
}

impl RuleMatcher {
    /// An empty matcher that passes everything; the engine's starting state.
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            trie: DomainTrie::new(),
            regexes: Vec::new(),
            lists: Vec::new(),
        }
    }

    /// Compile `(list_id, content)` pairs plus user rules.
    ///
    /// Individual bad lines are skipped and counted; compilation itself never
    /// fails, so a half-broken download can still produce a serving matcher.
    pub fn compile(lists: &[(i64, &str)], user_rules: &[String]) -> Self {
        let mut rules: Vec<FilterRule> = Vec::new();
        let mut infos = Vec::with_capacity(lists.len() + 1);

        for (list_id, content) in lists {
            let ParsedList { title, rules: mut parsed, errors } = parse_list(*list_id, content);
            infos.push(CompiledListInfo {
                list_id: *list_id,
                title,
                rule_count: parsed.len(),
                parse_errors: errors,
            });
            rules.append(&mut parsed);
        }

        let user_text = user_rules.join("\n");
        let ParsedList { rules: mut user_parsed, errors, .. } =
            parse_list(USER_RULES_LIST_ID, &user_text);
        infos.push(CompiledListInfo {
            list_id: USER_RULES_LIST_ID,
            title: None,
            rule_count: user_parsed.len(),
            parse_errors: errors,
        });
        rules.append(&mut user_parsed);

        let mut trie = DomainTrie::new();
        let mut regexes = Vec::new();
        for (idx, rule) in rules.iter().enumerate() {
            let idx = idx as u32;
            match &rule.pattern {
                RulePattern::Regex(pattern) => {
                    match fancy_regex::Regex::new(&format!("(?i){pattern}")) {
                        Ok(re) => regexes.push((idx, re)),
                        Err(e) => {
                            warn!(rule = %rule.text, error = %e, "Dropping rule with bad regex")
                        }
                    }
                }
                other => trie.insert(other, idx),
            }
        }

        debug!(
            rules = rules.len(),
            regexes = regexes.len(),
            lists = infos.len(),
            "Rule matcher compiled"
        );

        Self {
            rules,
            trie,
            regexes,
            lists: infos,
        }
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn lists(&self) -> &[CompiledListInfo] {
        &self.lists
    }

    /// Every rule whose pattern binds `name`, unfiltered by modifiers.
    fn candidates(&self, name: &str) -> SmallVec<[u32; 8]> {
        let mut out = self.trie.matches(name);
        for (idx, re) in &self.regexes {
            if re.is_match(name).unwrap_or(false) {
                out.push(*idx);
            }
        }
        out
    }

    /// Resolve the winning rule for `question` under `policy`.
    ///
    /// Tier order: `$important` allow > `$important` block > allow > block >
    /// rewrite. Within a tier, user rules outrank list rules; among user
    /// rules the later declaration wins; among list rules the
    /// earlier-configured (lower-id) list wins, then the later declaration.
    ///
    /// `rewrites_only` is how a disabled-filtering policy still honors
    /// `$dnsrewrite` configuration.
    pub fn resolve(
        &self,
        question: &Question,
        policy: &ClientPolicy,
        rewrites_only: bool,
    ) -> Option<&FilterRule> {
        let mut winner: Option<&FilterRule> = None;

        for idx in self.candidates(&question.name) {
            let rule = &self.rules[idx as usize];

            if rewrites_only && !matches!(rule.action, RuleAction::Rewrite(_)) {
                continue;
            }
            if !rule_applies(rule, question, policy) {
                continue;
            }

            winner = match winner {
                None => Some(rule),
                Some(current) => {
                    if outranks(rule, current) {
                        Some(rule)
                    } else {
                        Some(current)
                    }
                }
            };
        }

        winner
    }

    /// Resolve a bare name with no type or client restriction satisfied
    /// implicitly; used by the post-upstream pass for CNAME targets and
    /// answer IP literals.
    pub fn resolve_name(
        &self,
        name: &str,
        question: &Question,
        policy: &ClientPolicy,
    ) -> Option<&FilterRule> {
        let renamed = Question {
            name: std::sync::Arc::from(name),
            qtype: question.qtype,
            qclass: question.qclass,
        };
        self.resolve(&renamed, policy, false)
    }
}

/// Modifier gate: `$dnstype`, `$client`, `$denyallow`.
fn rule_applies(rule: &FilterRule, question: &Question, policy: &ClientPolicy) -> bool {
    if !rule.dnstypes.is_empty() && !rule.dnstypes.contains(&question.qtype) {
        return false;
    }

    if let Some(filter) = &rule.client {
        let matched = client_matches(filter, policy);
        if matched == filter.negated {
            return false;
        }
    }

    // $denyallow carves the listed domains (and their subdomains) out of the
    // rule's reach.
    for carved in &rule.denyallow {
        if question.name.as_ref() == carved.as_str()
            || question
                .name
                .strip_suffix(carved.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
        {
            return false;
        }
    }

    true
}

fn client_matches(filter: &ClientFilter, policy: &ClientPolicy) -> bool {
    if filter.ips.contains(&policy.ip) {
        return true;
    }
    if filter.subnets.iter().any(|net| net.contains(policy.ip)) {
        return true;
    }
    filter.names.iter().any(|entry| {
        policy
            .name
            .as_deref()
            .is_some_and(|n| n.eq_ignore_ascii_case(entry))
            || policy.tags.iter().any(|t| t.eq_ignore_ascii_case(entry))
    })
}

/// True when `a` beats `b` under the tie-breaking contract.
fn outranks(a: &FilterRule, b: &FilterRule) -> bool {
    if a.tier() != b.tier() {
        return a.tier() > b.tier();
    }

    let a_user = a.list_id == USER_RULES_LIST_ID;
    let b_user = b.list_id == USER_RULES_LIST_ID;
    if a_user != b_user {
        return a_user;
    }
    if a_user {
        // Later user declaration wins.
        return a.index > b.index;
    }
    if a.list_id != b.list_id {
        // Earlier-configured list has higher priority.
        return a.list_id < b.list_id;
    }
    a.index > b.index
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_dns_domain::RecordType;
    use std::sync::Arc;

    fn policy() -> ClientPolicy {
        ClientPolicy::anonymous(
            "192.168.1.50".parse().unwrap(),
            true,
            false,
            false,
            false,
            Arc::from(Vec::new()),
        )
    }

    fn q(name: &str) -> Question {
        Question::new(name, RecordType::A)
    }

    #[test]
    fn block_rule_matches_subdomain() {
        let m = RuleMatcher::compile(&[(1, "||ads.example.com^")], &[]);
        let rule = m.resolve(&q("www.ads.example.com"), &policy(), false).unwrap();
        assert_eq!(rule.action, RuleAction::Block);
    }

    #[test]
    fn allow_overrides_block() {
        let m = RuleMatcher::compile(
            &[(1, "||ads.example.com^")],
            &["@@||ads.example.com^".to_string()],
        );
        let rule = m.resolve(&q("www.ads.example.com"), &policy(), false).unwrap();
        assert_eq!(rule.action, RuleAction::Allow);
    }

    #[test]
    fn important_block_beats_plain_allow() {
        let m = RuleMatcher::compile(
            &[(1, "||ads.example.com^$important")],
            &["@@||ads.example.com^".to_string()],
        );
        let rule = m.resolve(&q("ads.example.com"), &policy(), false).unwrap();
        assert_eq!(rule.action, RuleAction::Block);
        assert!(rule.important);
    }

    #[test]
    fn important_allow_beats_important_block() {
        let m = RuleMatcher::compile(
            &[(1, "||ads.example.com^$important")],
            &["@@||ads.example.com^$important".to_string()],
        );
        let rule = m.resolve(&q("ads.example.com"), &policy(), false).unwrap();
        assert_eq!(rule.action, RuleAction::Allow);
    }

    #[test]
    fn later_user_rule_wins_within_tier() {
        let m = RuleMatcher::compile(
            &[],
            &[
                "example.net$dnsrewrite=1.1.1.1".to_string(),
                "example.net$dnsrewrite=2.2.2.2".to_string(),
            ],
        );
        let rule = m.resolve(&q("example.net"), &policy(), false).unwrap();
        assert!(rule.text.contains("2.2.2.2"));
    }

    #[test]
    fn dnstype_gate() {
        let m = RuleMatcher::compile(&[(1, "||example.org^$dnstype=AAAA")], &[]);
        assert!(m.resolve(&q("example.org"), &policy(), false).is_none());
        let aaaa = Question::new("example.org", RecordType::AAAA);
        assert!(m.resolve(&aaaa, &policy(), false).is_some());
    }

    #[test]
    fn denyallow_carves_out_subdomain() {
        let m = RuleMatcher::compile(&[(1, "||example.org^$denyallow=ok.example.org")], &[]);
        assert!(m.resolve(&q("bad.example.org"), &policy(), false).is_some());
        assert!(m.resolve(&q("ok.example.org"), &policy(), false).is_none());
        assert!(m.resolve(&q("www.ok.example.org"), &policy(), false).is_none());
    }

    #[test]
    fn client_modifier_scopes_rule() {
        let m = RuleMatcher::compile(&[(1, "||example.org^$client=10.0.0.1")], &[]);
        assert!(m.resolve(&q("example.org"), &policy(), false).is_none());

        let mut scoped = policy();
        scoped.ip = "10.0.0.1".parse().unwrap();
        assert!(m.resolve(&q("example.org"), &scoped, false).is_some());
    }

    #[test]
    fn rewrites_only_skips_blocks() {
        let m = RuleMatcher::compile(
            &[(1, "||ads.example.com^")],
            &["static.lan$dnsrewrite=10.0.0.9".to_string()],
        );
        assert!(m
            .resolve(&q("ads.example.com"), &policy(), true)
            .is_none());
        assert!(m.resolve(&q("static.lan"), &policy(), true).is_some());
    }

    #[test]
    fn earlier_list_outranks_later_list() {
        let m = RuleMatcher::compile(
            &[
                (1, "example.net$dnsrewrite=1.1.1.1"),
                (2, "example.net$dnsrewrite=2.2.2.2"),
            ],
            &[],
        );
        let rule = m.resolve(&q("example.net"), &policy(), false).unwrap();
        assert_eq!(rule.list_id, 1);
    }
}
