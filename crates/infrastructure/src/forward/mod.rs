pub mod bootstrap;
pub mod domains;
pub mod forwarder;
pub mod strategy;
pub mod transport;
pub mod upstream;
pub mod url;

pub use bootstrap::Bootstrap;
pub use forwarder::Forwarder;
pub use upstream::Upstream;
pub use url::{Scheme, UpstreamUrl};
