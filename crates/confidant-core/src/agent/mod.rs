//! Turn handling: compression, prompt assembly, and the dialogue orchestrator.

pub mod compressor;
pub mod names;
pub mod orchestrator;
pub mod phase;
pub mod prompt;
pub mod style;
