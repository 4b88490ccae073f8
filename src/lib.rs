//! Borrower Assist — asynchronous batch email-reply engine.

pub mod batch;
pub mod config;
pub mod dedup;
pub mod error;
pub mod executor;
pub mod generator;
pub mod limiter;
pub mod progress;
pub mod provider;
pub mod retry;
pub mod server;
