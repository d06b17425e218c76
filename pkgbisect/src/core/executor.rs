//! Bounded-concurrency executor for independent asynchronous tasks.
//!
//! The executor takes an ordered list of zero-argument thunks, keeps at most
//! `limit` of their futures outstanding, and records one [`Outcome`] per task
//! at the task's original index. A failing task never affects its siblings.
//!
//! All in-flight futures are polled from the caller's task through a single
//! [`FuturesUnordered`], so the cursor, the in-flight set, and the result
//! slots are only touched by one control flow and need no locking.

use std::any::Any;
use std::future::{self, Future};
use std::panic::{AssertUnwindSafe, catch_unwind};

use anyhow::anyhow;
use futures::future::{Either, FutureExt, ready};
use futures::stream::{FuturesUnordered, StreamExt};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::outcome::{Outcome, TaskFailure};

/// Receives one notification per completed task, success or failure.
pub trait ProgressSink: Send + Sync {
    fn advance(&self);
}

impl<T: ProgressSink + ?Sized> ProgressSink for &T {
    fn advance(&self) {
        (**self).advance();
    }
}

/// Configuration errors reported before any task is started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    #[error("concurrency limit must be at least 1 (got {limit})")]
    InvalidConcurrency { limit: usize },
}

/// Runs task batches with at most `limit` tasks outstanding.
#[derive(Clone, Copy)]
pub struct Executor<'p> {
    limit: usize,
    progress: Option<&'p dyn ProgressSink>,
}

impl<'p> Executor<'p> {
    pub fn new(limit: usize) -> Result<Self, ExecutorError> {
        if limit == 0 {
            return Err(ExecutorError::InvalidConcurrency { limit });
        }
        Ok(Self {
            limit,
            progress: None,
        })
    }

    /// Executor that runs one task at a time, in submission order.
    pub fn sequential() -> Self {
        Self {
            limit: 1,
            progress: None,
        }
    }

    /// Attach a sink notified once per completed task, in completion order.
    pub fn with_progress(mut self, sink: &'p dyn ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run every task to completion and return outcomes in task order.
    pub async fn run<I, F, Fut, R>(&self, tasks: I) -> Vec<Outcome<R>>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<R>>,
    {
        self.run_until(tasks, future::pending()).await
    }

    /// Like [`Executor::run`], but stops early once `cancel` resolves.
    ///
    /// On cancellation no further tasks are started, outstanding futures are
    /// dropped, and every task without a recorded outcome gets
    /// [`Outcome::Cancelled`]. The returned vector still has one entry per task.
    #[instrument(skip_all, fields(limit = self.limit))]
    pub async fn run_until<I, F, Fut, R, C>(&self, tasks: I, cancel: C) -> Vec<Outcome<R>>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<R>>,
        C: Future<Output = ()>,
    {
        let mut queue = tasks.into_iter().enumerate().peekable();
        let mut slots: Vec<Option<Outcome<R>>> = Vec::with_capacity(queue.size_hint().0);
        let mut in_flight = FuturesUnordered::new();
        let mut cancelled = false;
        let mut cancel = std::pin::pin!(cancel);

        'schedule: loop {
            while in_flight.len() < self.limit && queue.peek().is_some() {
                // A resolved cancel must win over starting another task.
                if (&mut cancel).now_or_never().is_some() {
                    cancelled = true;
                    break 'schedule;
                }
                let Some((index, task)) = queue.next() else {
                    break;
                };
                debug!(index, in_flight = in_flight.len() + 1, "starting task");
                slots.push(None);
                in_flight.push(start_task(index, task));
            }
            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                () = &mut cancel => {
                    cancelled = true;
                    break;
                }
                Some((index, result)) = in_flight.next() => {
                    slots[index] = Some(self.record(index, result));
                }
            }
        }

        if cancelled {
            let outstanding = in_flight.len();
            drop(in_flight);
            let mut never_started = 0usize;
            for _ in queue {
                slots.push(None);
                never_started += 1;
            }
            info!(outstanding, never_started, "batch cancelled");
        }

        slots
            .into_iter()
            .map(|slot| slot.unwrap_or(Outcome::Cancelled))
            .collect()
    }

    fn record<R>(&self, index: usize, result: anyhow::Result<R>) -> Outcome<R> {
        let outcome = match result {
            Ok(value) => {
                debug!(index, "task succeeded");
                Outcome::Success(value)
            }
            Err(err) => {
                let failure = TaskFailure {
                    index,
                    message: format!("{err:#}"),
                };
                warn!(index, error = %failure.message, "task failed");
                Outcome::Failure(failure)
            }
        };
        if let Some(progress) = self.progress {
            progress.advance();
        }
        outcome
    }
}

/// Invoke a thunk and tag its eventual result with `index`.
///
/// Panics raised while building or polling the future become task failures.
fn start_task<F, Fut, R>(
    index: usize,
    task: F,
) -> impl Future<Output = (usize, anyhow::Result<R>)>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<R>>,
{
    match catch_unwind(AssertUnwindSafe(task)) {
        Ok(fut) => Either::Left(
            AssertUnwindSafe(fut)
                .catch_unwind()
                .map(move |res| (index, res.unwrap_or_else(|payload| Err(panic_error(payload))))),
        ),
        Err(payload) => Either::Right(ready((index, Err(panic_error(payload))))),
    }
}

fn panic_error(payload: Box<dyn Any + Send>) -> anyhow::Error {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    };
    anyhow!("task panicked: {message}")
}

/// Run `tasks` with at most `limit` outstanding; outcomes are in task order.
pub async fn run_all<I, F, Fut, R>(tasks: I, limit: usize) -> Result<Vec<Outcome<R>>, ExecutorError>
where
    I: IntoIterator<Item = F>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<R>>,
{
    Ok(Executor::new(limit)?.run(tasks).await)
}

/// [`run_all`] with a progress sink notified once per completed task.
pub async fn run_all_with_progress<I, F, Fut, R>(
    tasks: I,
    limit: usize,
    progress: &dyn ProgressSink,
) -> Result<Vec<Outcome<R>>, ExecutorError>
where
    I: IntoIterator<Item = F>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<R>>,
{
    Ok(Executor::new(limit)?.with_progress(progress).run(tasks).await)
}
