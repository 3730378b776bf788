pub mod engine;
pub mod matcher;
pub mod parser;
pub mod reputation;
pub mod rewrite;
pub mod safesearch;
pub mod services;
pub mod trie;

pub use engine::FilterEngine;
pub use matcher::{CompiledListInfo, RuleMatcher};
pub use reputation::HashPrefixClient;
