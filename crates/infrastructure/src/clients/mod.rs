pub mod clientid;
pub mod resolver;
pub mod runtime;

pub use resolver::{ClientResolver, PolicyDefaults};
pub use runtime::RuntimeClients;
