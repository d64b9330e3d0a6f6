//! Bounded-concurrency runner for lazily produced work units.
//!
//! A work unit is a future that has not been polled yet. The pool pulls
//! the next unit from the producer only when a slot is free, so at most
//! `limit` units are ever in flight and unbounded producers use O(limit)
//! memory. All units run inside the calling task through
//! `FuturesUnordered`; nothing is spawned.
//!
//! A unit's failure is just its output value: it never cancels siblings
//! or stops admission. Cancellation stops admission only; units already
//! in flight are drained and their outcomes kept.

use std::future::Future;

use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::ErrorClass;

/// Errors from configuring a pool run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The concurrency limit must be at least 1.
    #[error("Concurrency limit must be at least 1, got {0}")]
    InvalidLimit(usize),
}

impl PoolError {
    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        ErrorClass::Validation
    }
}

/// Aggregate result of a pool run.
#[derive(Debug)]
pub struct PoolReport<T> {
    /// `(admission index, outcome)` in completion order.
    pub completed: Vec<(usize, T)>,
    /// Units pulled from the producer.
    pub admitted: usize,
    /// Highest number of units in flight at once.
    pub peak_in_flight: usize,
    /// Admission stopped because of cancellation.
    pub cancelled: bool,
}

impl<T> PoolReport<T> {
    fn new() -> Self {
        Self {
            completed: Vec::new(),
            admitted: 0,
            peak_in_flight: 0,
            cancelled: false,
        }
    }

    /// Number of completed units.
    pub fn len(&self) -> usize {
        self.completed.len()
    }

    /// Whether no unit ran.
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }

    /// Outcomes in producer (admission) order.
    pub fn into_ordered(mut self) -> Vec<T> {
        self.completed.sort_by_key(|(index, _)| *index);
        self.completed.into_iter().map(|(_, outcome)| outcome).collect()
    }
}

/// Run units from `producer` with at most `limit` in flight.
///
/// Admission follows producer order. When `cancel` fires, no further
/// units are pulled and the report is flagged `cancelled`.
pub async fn run_pool<I, F>(
    producer: I,
    limit: usize,
    cancel: Option<&CancellationToken>,
) -> Result<PoolReport<F::Output>, PoolError>
where
    I: IntoIterator<Item = F>,
    F: Future,
{
    if limit == 0 {
        return Err(PoolError::InvalidLimit(limit));
    }

    let mut producer = producer.into_iter().fuse();
    let mut in_flight = FuturesUnordered::new();
    let mut report = PoolReport::new();

    loop {
        while in_flight.len() < limit {
            if cancel.is_some_and(|t| t.is_cancelled()) {
                report.cancelled = true;
                break;
            }
            let Some(unit) = producer.next() else {
                break;
            };
            let index = report.admitted;
            in_flight.push(unit.map(move |outcome| (index, outcome)));
            report.admitted += 1;
            report.peak_in_flight = report.peak_in_flight.max(in_flight.len());
        }

        match in_flight.next().await {
            Some(done) => report.completed.push(done),
            None => break,
        }
    }

    if report.cancelled {
        tracing::info!(
            "Pool cancelled after admitting {} unit(s)",
            report.admitted
        );
    }
    Ok(report)
}
