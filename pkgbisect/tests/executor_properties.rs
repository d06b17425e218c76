//! Scheduling properties of the bounded-concurrency executor.
//!
//! Tasks are instrumented to record when they start and finish so the tests
//! can check overlap, ordering, and failure isolation across a grid of batch
//! sizes and limits. Time is paused, so sleeps complete deterministically.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use anyhow::anyhow;
use futures::future::{FutureExt, LocalBoxFuture};
use pkgbisect::core::executor::{ExecutorError, run_all, run_all_with_progress};
use pkgbisect::core::outcome::BatchSummary;
use pkgbisect::test_support::CountingSink;
use tokio::time::sleep;

/// Shared bookkeeping for instrumented tasks.
#[derive(Default)]
struct Probe {
    running: Cell<usize>,
    max_running: Cell<usize>,
    started: RefCell<Vec<usize>>,
    finished: RefCell<Vec<usize>>,
}

impl Probe {
    fn enter(&self, index: usize) {
        self.started.borrow_mut().push(index);
        let running = self.running.get() + 1;
        self.running.set(running);
        self.max_running.set(self.max_running.get().max(running));
    }

    fn exit(&self, index: usize) {
        self.running.set(self.running.get() - 1);
        self.finished.borrow_mut().push(index);
    }
}

/// Task `i` sleeps a varying amount so completion order differs from submission order.
fn instrumented(
    probe: &Rc<Probe>,
    n: usize,
    failing: Option<usize>,
) -> Vec<impl FnOnce() -> LocalBoxFuture<'static, anyhow::Result<usize>>> {
    (0..n)
        .map(|i| {
            let probe = Rc::clone(probe);
            move || {
                async move {
                    probe.enter(i);
                    let ms = 5 + ((i * 7) % 11) as u64;
                    sleep(Duration::from_millis(ms)).await;
                    probe.exit(i);
                    if failing == Some(i) {
                        Err(anyhow!("task {i} broke"))
                    } else {
                        Ok(i * 10)
                    }
                }
                .boxed_local()
            }
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn outcomes_are_index_aligned_for_every_size_and_limit() {
    for n in [0usize, 1, 2, 5, 13] {
        for limit in [1usize, 2, 3, 8, 20] {
            let probe = Rc::new(Probe::default());
            let outcomes = run_all(instrumented(&probe, n, None), limit)
                .await
                .expect("run");

            assert_eq!(outcomes.len(), n, "n={n} limit={limit}");
            for (i, outcome) in outcomes.iter().enumerate() {
                assert_eq!(outcome.success(), Some(&(i * 10)), "n={n} limit={limit}");
            }
            assert!(
                probe.max_running.get() <= limit,
                "n={n} limit={limit} overlap={}",
                probe.max_running.get()
            );
            assert_eq!(probe.started.borrow().len(), n);
            assert_eq!(probe.finished.borrow().len(), n);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn limit_is_reached_when_enough_work_is_queued() {
    let probe = Rc::new(Probe::default());
    run_all(instrumented(&probe, 12, None), 4).await.expect("run");
    assert_eq!(probe.max_running.get(), 4);
}

#[tokio::test(start_paused = true)]
async fn limit_one_starts_in_submission_order() {
    let probe = Rc::new(Probe::default());
    run_all(instrumented(&probe, 6, None), 1).await.expect("run");
    assert_eq!(*probe.started.borrow(), vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(*probe.finished.borrow(), vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(probe.max_running.get(), 1);
}

#[tokio::test(start_paused = true)]
async fn generous_limit_starts_everything_before_anything_finishes() {
    let probe = Rc::new(Probe::default());
    let tasks = instrumented(&probe, 7, None);

    let observed = Rc::clone(&probe);
    let watcher = async move {
        // Every task sleeps at least 5ms; by 1ms all must have started.
        sleep(Duration::from_millis(1)).await;
        (observed.started.borrow().len(), observed.finished.borrow().len())
    };
    let (outcomes, (started, finished)) = tokio::join!(run_all(tasks, 7), watcher);

    assert_eq!(outcomes.expect("run").len(), 7);
    assert_eq!(started, 7);
    assert_eq!(finished, 0);
}

#[tokio::test(start_paused = true)]
async fn one_failure_leaves_siblings_untouched() {
    let probe = Rc::new(Probe::default());
    let sink = CountingSink::default();
    let outcomes = run_all_with_progress(instrumented(&probe, 9, Some(4)), 3, &sink)
        .await
        .expect("run");

    let summary = BatchSummary::from_outcomes(&outcomes);
    assert_eq!(summary.succeeded, 8);
    assert_eq!(summary.failed, 1);
    let failure = outcomes[4].failure().expect("failure at index 4");
    assert_eq!(failure.index, 4);
    assert!(failure.message.contains("task 4 broke"));
    assert_eq!(sink.count(), 9);
    assert_eq!(probe.finished.borrow().len(), 9);
}

#[tokio::test]
async fn zero_limit_is_rejected_before_any_task_runs() {
    let probe = Rc::new(Probe::default());
    let err = run_all(instrumented(&probe, 3, None), 0)
        .await
        .expect_err("invalid");
    assert_eq!(err, ExecutorError::InvalidConcurrency { limit: 0 });
    assert!(probe.started.borrow().is_empty());
}
