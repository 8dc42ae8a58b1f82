/// The analyzer state machine.
pub mod analyzer;
/// Analyzer configuration and patch merging.
pub mod config;
/// The batched analysis queue.
pub mod queue;
