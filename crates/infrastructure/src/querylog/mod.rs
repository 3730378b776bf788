pub mod file;
pub mod ring;

pub use ring::QueryLog;
