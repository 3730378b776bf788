//! Aegis DNS Infrastructure Layer
//!
//! Implementations of the request pipeline and every port it composes:
//! rule engine, filter store, hosts/DHCP view, client resolver, response
//! cache, upstream forwarder, query log, and statistics.
pub mod cache;
pub mod clients;
pub mod core;
pub mod filter;
pub mod filterstore;
pub mod forward;
pub mod hosts;
pub mod pipeline;
pub mod querylog;
pub mod stats;
pub mod wire;

pub use crate::core::{Core, CoreHandle};
