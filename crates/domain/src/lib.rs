//! Aegis DNS Domain Layer
pub mod access;
pub mod client;
pub mod config;
pub mod decision;
pub mod errors;
pub mod question;
pub mod querylog;
pub mod record_type;
pub mod rules;
pub mod stats;

pub use access::AccessList;
pub use client::{ClientPolicy, ClientSource, MacAddr, PersistentClient, RuntimeClient};
pub use config::{CoreConfig, UpstreamMode};
pub use decision::{BlockReason, Decision};
pub use errors::CoreError;
pub use question::{Proto, Question, QueryOrigin, RequestFingerprint};
pub use querylog::{QueryLogRecord, QueryLogSearch, ResultReason};
pub use record_type::{RCode, RecordType};
pub use rules::{
    DnsRewrite, FilterRule, RuleAction, RulePattern, RuleRef, RewriteRcode, RewriteValue,
    USER_RULES_LIST_ID,
};
pub use stats::{StatsBucket, StatsSnapshot, TopEntry};
