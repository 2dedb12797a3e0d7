//! Bounded job group for parallel shard work.

use cairn_core::{CancelToken, Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// A unit of work executed by the runner.
pub type Job<'env, T> = Box<dyn FnOnce() -> Result<T> + Send + 'env>;

/// Bounded-concurrency job group.
///
/// Workers are scoped threads pulling from a shared queue, so a group
/// never outlives the call that created it and jobs may borrow from the
/// caller's stack. At most `max_workers` jobs run at once; results are
/// returned in submission order.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    max_workers: usize,
}

impl TaskRunner {
    /// Default worker bound per operation.
    pub const DEFAULT_MAX_WORKERS: usize = 7;

    /// Runner with the given worker bound (clamped to at least 1).
    pub fn new(max_workers: usize) -> Self {
        TaskRunner {
            max_workers: max_workers.max(1),
        }
    }

    /// Run every job, returning per-job results in submission order.
    ///
    /// Jobs dequeued after the token trips are not executed; their slot
    /// carries `Error::Cancelled`. Jobs already running are left to
    /// finish (they observe the token themselves at suspension points).
    pub fn run<'env, T: Send>(&self, tok: &CancelToken, jobs: Vec<Job<'env, T>>) -> Vec<Result<T>> {
        let count = jobs.len();
        if count == 0 {
            return Vec::new();
        }

        let queue: Mutex<VecDeque<(usize, Job<'env, T>)>> =
            Mutex::new(jobs.into_iter().enumerate().collect());
        let results: Mutex<Vec<Option<Result<T>>>> =
            Mutex::new((0..count).map(|_| None).collect());

        let workers = self.max_workers.min(count);
        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let next = queue.lock().pop_front();
                    let Some((index, job)) = next else { break };
                    let outcome = if tok.is_cancelled() {
                        Err(Error::Cancelled)
                    } else {
                        job()
                    };
                    results.lock()[index] = Some(outcome);
                });
            }
        });

        results
            .into_inner()
            .into_iter()
            .map(|slot| slot.unwrap_or(Err(Error::Cancelled)))
            .collect()
    }
}

impl Default for TaskRunner {
    fn default() -> Self {
        TaskRunner::new(TaskRunner::DEFAULT_MAX_WORKERS)
    }
}

/// First error in a result set, if any.
pub fn first_error<T>(results: &[Result<T>]) -> Option<&Error> {
    results.iter().find_map(|r| r.as_ref().err())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn results_come_back_in_submission_order() {
        let runner = TaskRunner::new(4);
        let tok = CancelToken::new();
        let jobs: Vec<Job<usize>> = (0..32usize)
            .map(|i| {
                Box::new(move || {
                    std::thread::sleep(Duration::from_millis(32 - i as u64));
                    Ok(i)
                }) as Job<usize>
            })
            .collect();

        let results = runner.run(&tok, jobs);
        for (i, r) in results.into_iter().enumerate() {
            assert_eq!(r.unwrap(), i);
        }
    }

    #[test]
    fn concurrency_never_exceeds_the_bound() {
        let runner = TaskRunner::new(3);
        let tok = CancelToken::new();
        let live = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        let jobs: Vec<Job<()>> = (0..24)
            .map(|_| {
                Box::new(|| {
                    let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(5));
                    live.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }) as Job<()>
            })
            .collect();

        runner.run(&tok, jobs);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn cancellation_drains_undispatched_jobs() {
        let runner = TaskRunner::new(1);
        let tok = CancelToken::new();
        let tok2 = tok.clone();

        let mut jobs: Vec<Job<u32>> = vec![Box::new(move || {
            tok2.cancel();
            Ok(1)
        })];
        for _ in 0..5 {
            jobs.push(Box::new(|| Ok(2)));
        }

        let results = runner.run(&tok, jobs);
        assert_eq!(*results[0].as_ref().unwrap(), 1);
        for r in &results[1..] {
            assert!(r.as_ref().unwrap_err().is_cancelled());
        }
    }

    #[test]
    fn errors_are_captured_per_job() {
        let runner = TaskRunner::default();
        let tok = CancelToken::new();
        let jobs: Vec<Job<()>> = vec![
            Box::new(|| Ok(())),
            Box::new(|| Err(Error::LockNotAcquired)),
            Box::new(|| Ok(())),
        ];

        let results = runner.run(&tok, jobs);
        assert!(results[0].is_ok());
        assert!(results[2].is_ok());
        assert!(matches!(
            first_error(&results),
            Some(Error::LockNotAcquired)
        ));
    }
}
