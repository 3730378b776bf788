use aegis_dns_domain::RulePattern;
use compact_str::CompactString;
use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;
use std::collections::HashMap;

/// A node in the reversed-label domain trie.
///
/// Three rule sets per node, one per binding kind:
///   `exact`    — rules whose pattern terminates exactly here
///   `wildcard` — `*.suffix` rules anchored here (subdomains only)
///   `anchored` — `||suffix^` rules anchored here (apex + subdomains)
#[derive(Default)]
struct TrieNode {
    children: HashMap<CompactString, TrieNode, FxBuildHasher>,
    exact: SmallVec<[u32; 2]>,
    wildcard: SmallVec<[u32; 2]>,
    anchored: SmallVec<[u32; 2]>,
}

impl TrieNode {
    fn new() -> Self {
        Self {
            children: HashMap::with_hasher(FxBuildHasher),
            exact: SmallVec::new(),
            wildcard: SmallVec::new(),
            anchored: SmallVec::new(),
        }
    }
}

/// Longest-suffix lookup structure over every non-regex rule pattern.
///
/// Patterns are stored as reversed label paths: `||ads.example.com^` walks
/// ["com", "example", "ads"] and marks the final node. Built once per
/// compilation and replaced wholesale via `ArcSwap<RuleMatcher>`.
#[derive(Default)]
pub struct DomainTrie {
    root: TrieNode,
}

impl DomainTrie {
    pub fn new() -> Self {
        Self {
            root: TrieNode::new(),
        }
    }

    /// Index `rule_idx` under its pattern. Regex patterns are not trie
    /// material and are ignored here.
    pub fn insert(&mut self, pattern: &RulePattern, rule_idx: u32) {
        let Some(suffix) = pattern.trie_suffix() else {
            return;
        };
        let mut node = &mut self.root;
        for label in suffix.split('.').rev() {
            node = node.children.entry(CompactString::new(label)).or_default();
        }
        match pattern {
            RulePattern::Exact(_) => node.exact.push(rule_idx),
            RulePattern::Wildcard(_) => node.wildcard.push(rule_idx),
            RulePattern::Anchored(_) => node.anchored.push(rule_idx),
            RulePattern::Regex(_) => unreachable!("regex has no trie suffix"),
        }
    }

    /// Collect every rule whose pattern binds `domain`.
    ///
    /// Walking label-by-label from the TLD:
    ///   anchored rules match at any depth (apex included);
    ///   wildcard rules require at least one label beyond the node;
    ///   exact rules require full consumption of the name.
    pub fn matches(&self, domain: &str) -> SmallVec<[u32; 8]> {
        let labels: SmallVec<[&str; 8]> = domain.split('.').rev().collect();
        let n = labels.len();
        let mut node = &self.root;
        let mut out: SmallVec<[u32; 8]> = SmallVec::new();

        for (i, label) in labels.iter().enumerate() {
            match node.children.get(*label) {
                Some(child) => {
                    let consumed_all = i + 1 == n;
                    out.extend_from_slice(&child.anchored);
                    if !consumed_all {
                        out.extend_from_slice(&child.wildcard);
                    }
                    if consumed_all {
                        out.extend_from_slice(&child.exact);
                    }
                    node = child;
                }
                None => break,
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trie() -> DomainTrie {
        let mut t = DomainTrie::new();
        t.insert(&RulePattern::Exact("ads.example.com".into()), 0);
        t.insert(&RulePattern::Wildcard("example.com".into()), 1);
        t.insert(&RulePattern::Anchored("tracker.net".into()), 2);
        t
    }

    #[test]
    fn exact_matches_only_the_name() {
        let t = trie();
        assert!(t.matches("ads.example.com").contains(&0));
        assert!(!t.matches("sub.ads.example.com").contains(&0));
        assert!(!t.matches("example.com").contains(&0));
    }

    #[test]
    fn wildcard_skips_the_apex() {
        let t = trie();
        assert!(t.matches("www.example.com").contains(&1));
        assert!(t.matches("a.b.example.com").contains(&1));
        assert!(!t.matches("example.com").contains(&1));
    }

    #[test]
    fn anchored_matches_apex_and_subdomains() {
        let t = trie();
        assert!(t.matches("tracker.net").contains(&2));
        assert!(t.matches("cdn.tracker.net").contains(&2));
        assert!(!t.matches("nottracker.net").contains(&2));
    }

    #[test]
    fn unrelated_domain_matches_nothing() {
        assert!(trie().matches("example.org").is_empty());
    }
}
