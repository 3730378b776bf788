use aegis_dns_domain::{ClientPolicy, Decision, Question, RecordType};
use async_trait::async_trait;
use std::net::IpAddr;

/// One answer record as seen by the post-upstream filter pass. Only the
/// dimensions rules can match on are carried.
#[derive(Debug, Clone)]
pub struct ResponseRecord {
    pub rtype: RecordType,
    pub data: AnswerData,
}

#[derive(Debug, Clone)]
pub enum AnswerData {
    Ip(IpAddr),
    /// CNAME target or other domain-valued rdata, lowercased.
    Name(String),
    Other,
}

/// The rule engine: compiled matcher plus safe-search, safe-browsing,
/// parental, and blocked-services evaluation.
#[async_trait]
pub trait FilterEnginePort: Send + Sync {
    /// Pre-upstream evaluation of a question under a client policy.
    ///
    /// Async because safe-browsing/parental verdicts may require a network
    /// lookup; everything else is in-memory.
    async fn match_question(&self, question: &Question, policy: &ClientPolicy) -> Decision;

    /// Post-upstream evaluation of the answer section: CNAME chains and
    /// answer IPs can still hit block rules.
    fn match_response(
        &self,
        question: &Question,
        answers: &[ResponseRecord],
        policy: &ClientPolicy,
    ) -> Decision;

    /// Rules in the currently published matcher.
    fn rule_count(&self) -> usize;
}
