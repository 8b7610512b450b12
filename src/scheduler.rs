//! Fire-and-forget background cleanup.
//!
//! Cleanup of scratch branches runs after the protocol step that produced
//! them has already reported its result. A task is retried a bounded number
//! of times; its final failure is logged and goes nowhere else.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::retry::{PollPolicy, Sleeper};

/// A unit of background work. May run more than once.
pub type Task = Box<dyn FnMut() -> anyhow::Result<()> + Send>;

/// Accepts background tasks.
pub trait Scheduler: Send + Sync {
    /// Run `task` once `delay` has elapsed. Never blocks on the task and
    /// never reports its outcome.
    fn schedule(&self, label: &str, delay: Duration, task: Task);
}

/// Run `task` until it succeeds or `retry.attempts` runs out.
fn run_task(label: &str, mut task: Task, retry: PollPolicy, sleeper: &dyn Sleeper) {
    let attempts = retry.attempts.max(1);
    for attempt in 1..=attempts {
        match task() {
            Ok(()) => {
                debug!(task = label, attempt, "background task done");
                return;
            }
            Err(e) => {
                warn!(task = label, attempt, error = %format!("{e:#}"), "background task failed");
            }
        }
        if attempt < attempts {
            sleeper.sleep(retry.interval);
        }
    }
    error!(task = label, attempts, "background task abandoned");
}

// ---------------------------------------------------------------------------
// ThreadScheduler
// ---------------------------------------------------------------------------

struct Job {
    label: String,
    due: Instant,
    task: Task,
}

enum Command {
    Job(Job),
    Shutdown,
}

/// Runs tasks on one dedicated worker thread, in submission order.
///
/// Dropping the scheduler (or calling [`shutdown`](Self::shutdown)) lets the
/// worker finish every queued task, then joins it.
pub struct ThreadScheduler {
    tx: Sender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadScheduler {
    pub fn start(retry: PollPolicy, sleeper: Arc<dyn Sleeper>) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("wsup-cleanup".to_owned())
            .spawn(move || run_worker(&rx, retry, sleeper.as_ref()))?;
        Ok(Self {
            tx,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Drain the queue and stop the worker.
    pub fn shutdown(&self) {
        if self.tx.send(Command::Shutdown).is_err() {
            debug!("cleanup worker already stopped");
        }
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            error!("cleanup worker panicked");
        }
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule(&self, label: &str, delay: Duration, task: Task) {
        let job = Job {
            label: label.to_owned(),
            due: Instant::now() + delay,
            task,
        };
        if self.tx.send(Command::Job(job)).is_err() {
            error!(task = label, "cleanup worker is gone; task dropped");
        }
    }
}

impl Drop for ThreadScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(rx: &Receiver<Command>, retry: PollPolicy, sleeper: &dyn Sleeper) {
    while let Ok(cmd) = rx.recv() {
        match cmd {
            Command::Job(job) => {
                sleeper.sleep(job.due.saturating_duration_since(Instant::now()));
                run_task(&job.label, job.task, retry, sleeper);
            }
            Command::Shutdown => break,
        }
    }
}

// ---------------------------------------------------------------------------
// InlineScheduler
// ---------------------------------------------------------------------------

/// Runs each task on the caller's thread, right away, after sleeping the
/// delay through its [`Sleeper`]. Deterministic, for test fixtures; the
/// caller blocks for the whole delay, so production wiring uses
/// [`ThreadScheduler`].
pub struct InlineScheduler {
    retry: PollPolicy,
    sleeper: Arc<dyn Sleeper>,
    labels: Mutex<Vec<String>>,
}

impl InlineScheduler {
    #[must_use]
    pub fn new(retry: PollPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            retry,
            sleeper,
            labels: Mutex::new(Vec::new()),
        }
    }

    /// Labels of every task scheduled so far.
    #[must_use]
    pub fn scheduled(&self) -> Vec<String> {
        self.labels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Scheduler for InlineScheduler {
    fn schedule(&self, label: &str, delay: Duration, task: Task) {
        self.labels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(label.to_owned());
        self.sleeper.sleep(delay);
        run_task(label, task, self.retry, self.sleeper.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::retry::{RecordingSleeper, ThreadSleeper};

    fn counting_task(counter: &Arc<AtomicU32>, fail_first: u32) -> Task {
        let counter = Arc::clone(counter);
        Box::new(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= fail_first {
                anyhow::bail!("attempt {n} failed");
            }
            Ok(())
        })
    }

    #[test]
    fn inline_runs_after_delay_and_retries() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let scheduler = InlineScheduler::new(
            PollPolicy::new(3, Duration::from_millis(10)),
            Arc::clone(&sleeper) as Arc<dyn Sleeper>,
        );
        let counter = Arc::new(AtomicU32::new(0));
        scheduler.schedule("flaky", Duration::from_secs(5), counting_task(&counter, 2));

        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(
            sleeper.pauses(),
            vec![
                Duration::from_secs(5),
                Duration::from_millis(10),
                Duration::from_millis(10)
            ]
        );
        assert_eq!(scheduler.scheduled(), vec!["flaky".to_owned()]);
    }

    #[test]
    fn inline_gives_up_quietly() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let scheduler = InlineScheduler::new(
            PollPolicy::new(2, Duration::ZERO),
            Arc::clone(&sleeper) as Arc<dyn Sleeper>,
        );
        let counter = Arc::new(AtomicU32::new(0));
        scheduler.schedule("doomed", Duration::ZERO, counting_task(&counter, u32::MAX));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn thread_scheduler_drains_queue_on_shutdown() {
        let scheduler = ThreadScheduler::start(
            PollPolicy::new(3, Duration::from_millis(1)),
            Arc::new(ThreadSleeper),
        )
        .unwrap();
        let counter = Arc::new(AtomicU32::new(0));
        for _ in 0..4 {
            scheduler.schedule("count", Duration::from_millis(1), counting_task(&counter, 0));
        }
        scheduler.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 4);

        // Scheduling after shutdown is dropped, not a panic.
        scheduler.schedule("late", Duration::ZERO, counting_task(&counter, 0));
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let scheduler = ThreadScheduler::start(
            PollPolicy::new(1, Duration::ZERO),
            Arc::new(ThreadSleeper),
        )
        .unwrap();
        let counter = Arc::new(AtomicU32::new(0));
        scheduler.schedule("once", Duration::ZERO, counting_task(&counter, 0));
        scheduler.shutdown();
        // The worker is gone; the second Shutdown has no receiver.
        scheduler.shutdown();
        drop(scheduler);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
