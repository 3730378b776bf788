pub mod download;
pub mod store;

pub use store::{FilterStore, ListSummary, RefreshOutcome, UpdateCallback};
