//! A bounded pool of worker threads executing independent tasks.
//!
//! Tasks are taken from one shared FIFO queue. The first failing task records its
//! error and drains the queue: tasks already running finish, tasks still queued never
//! start, and the recorded error is returned once every worker has exited.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use crossbeam::queue::SegQueue;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

/// Receives one call per task that was attempted
pub trait ProgressSink: Sync {
    fn increment(&self);
}

/// Ignores progress
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn increment(&self) {}
}

/// Counts attempted tasks
#[derive(Debug, Default)]
pub struct ProgressCounter(AtomicUsize);

impl ProgressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }
}

impl ProgressSink for ProgressCounter {
    fn increment(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }
}

/// Logs every tenth of the expected total
#[derive(Debug)]
pub struct LogProgress {
    total: usize,
    done: AtomicUsize,
}

impl LogProgress {
    pub fn new(total: usize) -> Self {
        LogProgress { total, done: AtomicUsize::new(0) }
    }
}

impl ProgressSink for LogProgress {
    fn increment(&self) {
        let done = self.done.fetch_add(1, Ordering::AcqRel) + 1;
        let step = (self.total / 10).max(1);
        if done % step == 0 || done == self.total {
            info!(done, total = self.total, "simulation progress");
        }
    }
}

/// A unit of work. Borrowing is allowed, workers never outlive [`SimulationEngine::run`].
pub type Task<'a, E> = Box<dyn FnOnce() -> Result<(), E> + Send + 'a>;

#[derive(Debug, Clone, Copy)]
pub struct SimulationEngine {
    workers: usize,
}

impl SimulationEngine {
    pub fn new(workers: usize) -> Self {
        SimulationEngine { workers: workers.max(1) }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run every task, blocking until all of them were attempted or the run was
    /// aborted by a failure. Returns the first error recorded.
    pub fn run<'a, E: Send>(&self, tasks: Vec<Task<'a, E>>, progress: &dyn ProgressSink) -> Result<(), E> {
        let total = tasks.len();
        let queue = SegQueue::new();
        for task in tasks {
            queue.push(task);
        }
        let failure = Mutex::new(None);
        let aborted = AtomicBool::new(false);

        let worker = || {
            while let Some(task) = queue.pop() {
                if aborted.load(Ordering::Acquire) {
                    // Dequeued after the abort, so it never started
                    continue;
                }
                let result = task();
                progress.increment();
                if let Err(error) = result {
                    let mut slot = failure.lock();
                    if slot.is_none() {
                        *slot = Some(error);
                    }
                    drop(slot);
                    aborted.store(true, Ordering::Release);
                    let mut discarded = 0;
                    while queue.pop().is_some() {
                        discarded += 1;
                    }
                    debug!(discarded, "task failed, queue drained");
                }
            }
        };

        let workers = self.workers.min(total).max(1);
        debug!(tasks = total, workers, "starting simulation engine");
        thread::scope(|scope| {
            let mut spawned = 0;
            for index in 0..workers {
                let spawn = thread::Builder::new()
                    .name(format!("plg-worker-{}", index))
                    .spawn_scoped(scope, &worker);
                match spawn {
                    Ok(_) => spawned += 1,
                    Err(error) => {
                        warn!(%error, spawned, "cannot spawn worker thread");
                        break;
                    }
                }
            }
            if spawned == 0 {
                worker();
            }
        });

        match failure.into_inner() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_runs_every_task() {
        let executed = AtomicUsize::new(0);
        let progress = ProgressCounter::new();
        let tasks = (0..100)
            .map(|_| {
                let executed = &executed;
                Box::new(move || -> Result<(), String> {
                    executed.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }) as Task<'_, String>
            })
            .collect();
        SimulationEngine::new(4).run(tasks, &progress).unwrap();
        assert_eq!(executed.load(Ordering::SeqCst), 100);
        assert_eq!(progress.count(), 100);
    }

    #[test]
    fn test_single_failure_is_surfaced() {
        let executed = AtomicUsize::new(0);
        let progress = ProgressCounter::new();
        let tasks = (0..100)
            .map(|i| {
                let executed = &executed;
                Box::new(move || -> Result<(), String> {
                    executed.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(1));
                    if i == 10 {
                        Err(format!("task {} failed", i))
                    } else {
                        Ok(())
                    }
                }) as Task<'_, String>
            })
            .collect();
        let result = SimulationEngine::new(4).run(tasks, &progress);
        assert_eq!(result, Err("task 10 failed".to_string()));
        assert!(progress.count() <= 100);
        assert_eq!(progress.count(), executed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_first_writer_wins() {
        let tasks = (0..20)
            .map(|i| Box::new(move || -> Result<(), usize> { Err(i) }) as Task<'_, usize>)
            .collect();
        let progress = ProgressCounter::new();
        let result = SimulationEngine::new(1).run(tasks, &progress);
        // A single worker takes tasks in FIFO order
        assert_eq!(result, Err(0));
        assert_eq!(progress.count(), 1);
    }

    #[test]
    fn test_no_tasks() {
        let result: Result<(), ()> = SimulationEngine::new(8).run(Vec::new(), &NoProgress);
        assert!(result.is_ok());
    }
}
