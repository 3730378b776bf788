use crate::rules::{RewriteRcode, RewriteValue, RuleRef};
use std::sync::Arc;

/// Why a query was blocked. Feeds the query-log result classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    BlockList,
    SafeBrowsing,
    Parental,
}

/// Outcome of evaluating one question (or one upstream answer) against the
/// compiled matcher plus the per-client policy.
#[derive(Debug, Clone)]
pub enum Decision {
    /// No applicable rule; continue down the pipeline.
    Pass,
    /// An allow rule won; the query proceeds, the rule is logged.
    Allow { rule: RuleRef },
    /// A blocking rule (or reputation hit) won; answer from the sinkhole.
    Block { rule: Option<RuleRef>, reason: BlockReason },
    /// A `$dnsrewrite` rule (or hosts-style rewrite) produces the answer.
    Rewrite {
        rcode: RewriteRcode,
        answers: Vec<RewriteValue>,
        rule: RuleRef,
    },
    /// A blocked-services entry matched.
    BlockedService { service: Arc<str> },
    /// Safe-search redirected a search-engine hostname.
    SafeSearch { value: RewriteValue, rule: RuleRef },
}

impl Decision {
    /// True when the pipeline should stop before the forwarder.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pass | Self::Allow { .. })
    }
}
