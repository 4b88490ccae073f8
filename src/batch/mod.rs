//! Batch email-reply processing — job submission through finalization.

pub mod orchestrator;
pub mod types;

pub use orchestrator::BatchOrchestrator;
