pub mod ddr;
pub mod handler;
pub mod synth;

pub use handler::{Pipeline, PipelineSettings};
pub use synth::Sinkhole;
