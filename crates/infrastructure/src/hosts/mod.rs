pub mod parser;
pub mod view;

pub use parser::{parse_hosts, HostsEntry};
pub use view::{DhcpLease, HostsView};
