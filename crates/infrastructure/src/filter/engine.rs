use super::matcher::RuleMatcher;
use super::{safesearch, services};
use aegis_dns_application::ports::{
    AnswerData, FilterEnginePort, ReputationLookup, ResponseRecord,
};
use aegis_dns_domain::{
    BlockReason, ClientPolicy, Decision, FilterRule, Question, RuleAction, RewriteRcode,
    RewriteValue,
};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, warn};

/// The rule engine.
///
/// The compiled `RuleMatcher` is swapped atomically on every list or
/// user-rule change; in-flight requests keep the snapshot they loaded.
/// Reputation lookups (safe-browsing, parental) are optional collaborators.
pub struct FilterEngine {
    matcher: ArcSwap<RuleMatcher>,
    safebrowsing: Option<Arc<dyn ReputationLookup>>,
    parental: Option<Arc<dyn ReputationLookup>>,
}

impl FilterEngine {
    pub fn new(
        matcher: RuleMatcher,
        safebrowsing: Option<Arc<dyn ReputationLookup>>,
        parental: Option<Arc<dyn ReputationLookup>>,
    ) -> Self {
        Self {
            matcher: ArcSwap::from_pointee(matcher),
            safebrowsing,
            parental,
        }
    }

    /// Atomically publish a freshly compiled matcher.
    pub fn publish(&self, matcher: RuleMatcher) {
        self.matcher.store(Arc::new(matcher));
    }

    pub fn matcher(&self) -> Arc<RuleMatcher> {
        self.matcher.load_full()
    }

    /// Map the winning rule to a decision. Rewrite values that cannot answer
    /// the question type degrade to an empty NOERROR, except CNAME which
    /// always applies.
    fn decide(rule: &FilterRule, question: &Question) -> Decision {
        match &rule.action {
            RuleAction::Allow => Decision::Allow {
                rule: rule.rule_ref(),
            },
            RuleAction::Block => Decision::Block {
                rule: Some(rule.rule_ref()),
                reason: BlockReason::BlockList,
            },
            RuleAction::Rewrite(rewrite) => {
                if rewrite.rcode != RewriteRcode::NoError {
                    return Decision::Rewrite {
                        rcode: rewrite.rcode,
                        answers: vec![],
                        rule: rule.rule_ref(),
                    };
                }
                let answers = match &rewrite.value {
                    Some(value)
                        if value.record_type() == question.qtype
                            || matches!(value, RewriteValue::Cname(_)) =>
                    {
                        vec![value.clone()]
                    }
                    _ => vec![],
                };
                Decision::Rewrite {
                    rcode: RewriteRcode::NoError,
                    answers,
                    rule: rule.rule_ref(),
                }
            }
        }
    }

    async fn reputation_verdict(
        lookup: &Arc<dyn ReputationLookup>,
        question: &Question,
        reason: BlockReason,
    ) -> Option<Decision> {
        match lookup.is_listed(&question.name).await {
            Ok(true) => Some(Decision::Block { rule: None, reason }),
            Ok(false) => None,
            // Availability over protection: a failed lookup never blocks.
            Err(_) => None,
        }
    }
}

#[async_trait]
impl FilterEnginePort for FilterEngine {
    async fn match_question(&self, question: &Question, policy: &ClientPolicy) -> Decision {
        let matcher = self.matcher.load_full();
        let rewrites_only = !policy.filtering;

        // A matcher bug must degrade to Pass, never take resolution down.
        let resolved = catch_unwind(AssertUnwindSafe(|| {
            matcher
                .resolve(question, policy, rewrites_only)
                .map(|rule| Self::decide(rule, question))
        }));

        let decision = match resolved {
            Ok(d) => d,
            Err(_) => {
                error!(question = %question, "Rule matcher panicked; passing query through");
                return Decision::Pass;
            }
        };

        let allow_win = match decision {
            Some(Decision::Allow { rule }) => Some(rule),
            Some(other) => return other,
            None => None,
        };

        if !policy.filtering {
            return match allow_win {
                Some(rule) => Decision::Allow { rule },
                None => Decision::Pass,
            };
        }

        // Services are policy, not lists: an allow rule (even `$important`)
        // does not unblock a service.
        for service in policy.blocked_services.iter() {
            if services::matches(service, &question.name) {
                return Decision::BlockedService {
                    service: Arc::from(service.as_str()),
                };
            }
        }

        if let Some(rule) = allow_win {
            // Allowlisted names skip safe-search and reputation checks.
            return Decision::Allow { rule };
        }

        if policy.safesearch && question.qtype.is_address() {
            if let Some(value) = safesearch::lookup(&question.name) {
                let applies = matches!(value, RewriteValue::Cname(_))
                    || value.record_type() == question.qtype;
                if applies {
                    return Decision::SafeSearch {
                        value,
                        rule: aegis_dns_domain::RuleRef {
                            list_id: aegis_dns_domain::USER_RULES_LIST_ID,
                            text: Arc::from(format!("safesearch:{}", question.name)),
                        },
                    };
                }
            }
        }

        if policy.safebrowsing {
            if let Some(lookup) = &self.safebrowsing {
                if let Some(block) =
                    Self::reputation_verdict(lookup, question, BlockReason::SafeBrowsing).await
                {
                    return block;
                }
            }
        }

        if policy.parental {
            if let Some(lookup) = &self.parental {
                if let Some(block) =
                    Self::reputation_verdict(lookup, question, BlockReason::Parental).await
                {
                    return block;
                }
            }
        }

        Decision::Pass
    }

    fn match_response(
        &self,
        question: &Question,
        answers: &[ResponseRecord],
        policy: &ClientPolicy,
    ) -> Decision {
        if !policy.filtering {
            return Decision::Pass;
        }

        let matcher = self.matcher.load_full();

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            for record in answers {
                let name = match &record.data {
                    AnswerData::Name(name) => name.clone(),
                    AnswerData::Ip(ip) => ip.to_string(),
                    AnswerData::Other => continue,
                };
                if let Some(rule) = matcher.resolve_name(&name, question, policy) {
                    match rule.action {
                        // An allow hit anywhere in the chain clears the
                        // whole response.
                        RuleAction::Allow => {
                            return Some(Decision::Allow {
                                rule: rule.rule_ref(),
                            })
                        }
                        RuleAction::Block => {
                            return Some(Decision::Block {
                                rule: Some(rule.rule_ref()),
                                reason: BlockReason::BlockList,
                            })
                        }
                        RuleAction::Rewrite(_) => continue,
                    }
                }
            }
            None
        }));

        match outcome {
            Ok(Some(decision)) => decision,
            Ok(None) => Decision::Pass,
            Err(_) => {
                warn!(question = %question, "Response matcher panicked; passing answer through");
                Decision::Pass
            }
        }
    }

    fn rule_count(&self) -> usize {
        self.matcher.load().rule_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_dns_domain::RecordType;

    fn policy(filtering: bool) -> ClientPolicy {
        ClientPolicy::anonymous(
            "10.0.0.7".parse().unwrap(),
            filtering,
            false,
            false,
            false,
            Arc::from(Vec::new()),
        )
    }

    fn engine(lists: &[(i64, &str)], user: &[&str]) -> FilterEngine {
        let user: Vec<String> = user.iter().map(|s| s.to_string()).collect();
        FilterEngine::new(RuleMatcher::compile(lists, &user), None, None)
    }

    #[tokio::test]
    async fn blocklist_hit() {
        let e = engine(&[(1, "||ads.example.com^")], &[]);
        let q = Question::new("www.ads.example.com", RecordType::A);
        let d = e.match_question(&q, &policy(true)).await;
        assert!(matches!(
            d,
            Decision::Block { reason: BlockReason::BlockList, .. }
        ));
    }

    #[tokio::test]
    async fn filtering_disabled_skips_blocks_but_keeps_rewrites() {
        let e = engine(
            &[(1, "||ads.example.com^")],
            &["nas.lan$dnsrewrite=10.0.0.9"],
        );
        let off = policy(false);

        let blocked = Question::new("ads.example.com", RecordType::A);
        assert!(matches!(
            e.match_question(&blocked, &off).await,
            Decision::Pass
        ));

        let rewritten = Question::new("nas.lan", RecordType::A);
        assert!(matches!(
            e.match_question(&rewritten, &off).await,
            Decision::Rewrite { .. }
        ));
    }

    #[tokio::test]
    async fn blocked_service_for_policy() {
        let e = engine(&[], &[]);
        let mut p = policy(true);
        p.blocked_services = Arc::from(vec!["youtube".to_string()]);
        let q = Question::new("www.youtube.com", RecordType::A);
        assert!(matches!(
            e.match_question(&q, &p).await,
            Decision::BlockedService { .. }
        ));
    }

    #[tokio::test]
    async fn important_allow_does_not_unblock_service() {
        let e = engine(&[], &["@@||youtube.com^$important"]);
        let mut p = policy(true);
        p.blocked_services = Arc::from(vec!["youtube".to_string()]);
        let q = Question::new("www.youtube.com", RecordType::A);
        assert!(matches!(
            e.match_question(&q, &p).await,
            Decision::BlockedService { .. }
        ));
    }

    #[tokio::test]
    async fn safesearch_rewrites_search_engine() {
        let e = engine(&[], &[]);
        let mut p = policy(true);
        p.safesearch = true;
        let q = Question::new("www.bing.com", RecordType::A);
        assert!(matches!(
            e.match_question(&q, &p).await,
            Decision::SafeSearch { .. }
        ));
    }

    #[test]
    fn response_pass_catches_cname_chain() {
        let e = engine(&[(1, "||tracker.evil.net^")], &[]);
        let q = Question::new("innocent.example.com", RecordType::A);
        let answers = vec![ResponseRecord {
            rtype: RecordType::CNAME,
            data: AnswerData::Name("cdn.tracker.evil.net".into()),
        }];
        assert!(matches!(
            e.match_response(&q, &answers, &policy(true)),
            Decision::Block { .. }
        ));
    }

    #[test]
    fn response_pass_catches_ip_literal_rule() {
        let e = engine(&[(1, "203.0.113.66")], &[]);
        let q = Question::new("innocent.example.com", RecordType::A);
        let answers = vec![ResponseRecord {
            rtype: RecordType::A,
            data: AnswerData::Ip("203.0.113.66".parse().unwrap()),
        }];
        assert!(matches!(
            e.match_response(&q, &answers, &policy(true)),
            Decision::Block { .. }
        ));
    }
}
