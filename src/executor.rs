//! Bounded-concurrency executor for per-item batch work.

use std::future::Future;

use futures::stream::{self, StreamExt};

/// Run `work` over every item with at most `limit` units in flight.
///
/// Items are admitted in submission order; completion order is unspecified
/// and the output order follows completion. Each item contributes exactly
/// one output — the per-item future is expected to be infallible (the item
/// boundary converts errors into outcome values before they reach here).
pub async fn run_bounded<I, T, F, Fut>(items: Vec<I>, limit: usize, work: F) -> Vec<T>
where
    F: Fn(usize, I) -> Fut,
    Fut: Future<Output = T>,
{
    stream::iter(items.into_iter().enumerate())
        .map(|(index, item)| work(index, item))
        .buffer_unordered(limit.max(1))
        .collect()
        .await
}
