//! Background persistence queue.
//!
//! Writes that the caller should not wait for (ban, mute, unmute) are
//! submitted here as [`PersistJob`]s. A bounded queue feeds one dedicated
//! worker thread, which runs jobs in submission order.
//!
//! Guarantees:
//!
//! - **At-least-once:** a failing job is retried up to
//!   `max_attempts` times with `retry_backoff_ms` between attempts. Jobs must
//!   therefore be idempotent.
//! - **No silent drop on overload:** when the queue is full (or the worker is
//!   gone) the job runs inline on the submitting thread instead.
//! - **Drain on shutdown:** dropping the writer closes the queue and joins
//!   the worker after it has finished everything already queued.
//!
//! A process crash before the worker runs a job loses that write; callers
//! treat background writes as eventually durable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::config::WriterConfig;
use crate::error::{Result, RosterError};

/// A unit of background persistence work.
pub struct PersistJob {
    /// Short description for logs (e.g. `"ban pb-123"`).
    pub label: String,
    /// The write itself. Called once per attempt.
    pub run: Box<dyn FnMut() -> Result<()> + Send>,
}

impl PersistJob {
    /// Wrap a closure as a job.
    pub fn new(label: impl Into<String>, run: impl FnMut() -> Result<()> + Send + 'static) -> Self {
        Self {
            label: label.into(),
            run: Box::new(run),
        }
    }
}

impl std::fmt::Debug for PersistJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistJob")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

enum Message {
    Job(PersistJob),
    Flush(oneshot::Sender<()>),
}

/// Counters describing the writer's lifetime activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Jobs accepted onto the queue.
    pub queued: u64,
    /// Jobs run on the caller's thread because the queue was full or closed.
    pub inline: u64,
    /// Jobs that eventually succeeded.
    pub completed: u64,
    /// Attempts that failed and were retried.
    pub retried: u64,
    /// Jobs abandoned after exhausting every attempt.
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    queued: AtomicU64,
    inline: AtomicU64,
    completed: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
}

/// Bounded queue plus one worker thread for fire-and-forget writes.
pub struct BackgroundWriter {
    sender: Mutex<Option<mpsc::Sender<Message>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
    policy: RetryPolicy,
}

#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl std::fmt::Debug for BackgroundWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundWriter")
            .field("policy", &self.policy)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl BackgroundWriter {
    /// Start the worker thread.
    ///
    /// # Errors
    /// Returns [`RosterError::Writer`] if the thread cannot be spawned.
    pub fn spawn(config: &WriterConfig) -> Result<Self> {
        let (sender, mut receiver) = mpsc::channel::<Message>(config.queue_capacity.max(1));
        let counters = Arc::new(Counters::default());
        let policy = RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_millis(config.retry_backoff_ms),
        };

        let worker_counters = Arc::clone(&counters);
        let worker = std::thread::Builder::new()
            .name("roster-writer".into())
            .spawn(move || {
                while let Some(message) = receiver.blocking_recv() {
                    match message {
                        Message::Job(job) => run_with_retry(job, policy, &worker_counters),
                        Message::Flush(done) => {
                            let _ = done.send(());
                        }
                    }
                }
                debug!("Background writer drained and stopped");
            })
            .map_err(|e| RosterError::Writer(e.to_string()))?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            counters,
            policy,
        })
    }

    /// Queue a job without waiting for it.
    ///
    /// If the queue is full or closed the job runs inline, so its result is
    /// returned directly; a queued job always yields `Ok(())` here.
    ///
    /// # Errors
    /// Only when the job ran inline and failed every attempt.
    pub fn submit(&self, job: PersistJob) -> Result<()> {
        let rejected = {
            let sender = self.sender.lock();
            match sender.as_ref() {
                Some(sender) => match sender.try_send(Message::Job(job)) {
                    Ok(()) => None,
                    Err(mpsc::error::TrySendError::Full(Message::Job(job))) => {
                        warn!(job = %job.label, "Writer queue full, writing inline");
                        Some(job)
                    }
                    Err(mpsc::error::TrySendError::Closed(Message::Job(job))) => Some(job),
                    // Only jobs go through try_send.
                    Err(_) => None,
                },
                None => Some(job),
            }
        };

        match rejected {
            None => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Some(mut job) => {
                self.counters.inline.fetch_add(1, Ordering::Relaxed);
                run_inline(&mut job, self.policy, &self.counters)
            }
        }
    }

    /// Block until every job queued before this call has finished.
    ///
    /// Must not be called from inside an async runtime thread.
    pub fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        // Clone out so a full queue does not block submitters on the lock.
        let sender = self.sender.lock().clone();
        let sent =
            sender.is_some_and(|sender| sender.blocking_send(Message::Flush(done_tx)).is_ok());
        if sent {
            let _ = done_rx.blocking_recv();
        }
    }

    /// Snapshot of the lifetime counters.
    #[must_use]
    pub fn stats(&self) -> WriterStats {
        WriterStats {
            queued: self.counters.queued.load(Ordering::Relaxed),
            inline: self.counters.inline.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            retried: self.counters.retried.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Close the queue and wait for the worker to finish the backlog.
    /// Later submissions run inline.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                error!("Background writer thread panicked");
            }
        }
    }
}

impl Drop for BackgroundWriter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_with_retry(mut job: PersistJob, policy: RetryPolicy, counters: &Counters) {
    if let Err(e) = attempt(&mut job, policy, counters) {
        counters.failed.fetch_add(1, Ordering::Relaxed);
        error!(
            job = %job.label,
            attempts = policy.max_attempts,
            error = %e,
            "Background write abandoned after exhausting retries"
        );
    }
}

fn run_inline(job: &mut PersistJob, policy: RetryPolicy, counters: &Counters) -> Result<()> {
    attempt(job, policy, counters).inspect_err(|_| {
        counters.failed.fetch_add(1, Ordering::Relaxed);
    })
}

fn attempt(job: &mut PersistJob, policy: RetryPolicy, counters: &Counters) -> Result<()> {
    let mut tries = 0;
    loop {
        tries += 1;
        match (job.run)() {
            Ok(()) => {
                counters.completed.fetch_add(1, Ordering::Relaxed);
                debug!(job = %job.label, tries, "Background write completed");
                return Ok(());
            }
            Err(e) if tries < policy.max_attempts => {
                counters.retried.fetch_add(1, Ordering::Relaxed);
                warn!(job = %job.label, tries, error = %e, "Background write failed, retrying");
                std::thread::sleep(policy.backoff);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn config(capacity: usize, attempts: u32) -> WriterConfig {
        WriterConfig {
            queue_capacity: capacity,
            max_attempts: attempts,
            retry_backoff_ms: 1,
        }
    }

    #[test]
    fn jobs_run_in_order_and_flush_waits() {
        let writer = BackgroundWriter::spawn(&config(16, 1)).expect("spawn");
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let seen = Arc::clone(&seen);
            writer
                .submit(PersistJob::new(format!("job {i}"), move || {
                    seen.lock().push(i);
                    Ok(())
                }))
                .expect("submit");
        }
        writer.flush();
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
        assert_eq!(writer.stats().completed, 5);
    }

    #[test]
    fn failing_job_is_retried_until_it_succeeds() {
        let writer = BackgroundWriter::spawn(&config(4, 3)).expect("spawn");
        let calls = Arc::new(AtomicUsize::new(0));
        let job_calls = Arc::clone(&calls);
        writer
            .submit(PersistJob::new("flaky", move || {
                if job_calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(RosterError::Io(std::io::Error::other("disk busy")))
                } else {
                    Ok(())
                }
            }))
            .expect("submit");
        writer.flush();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let stats = writer.stats();
        assert_eq!(stats.retried, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 0);
    }

    #[test]
    fn job_is_abandoned_after_max_attempts() {
        let writer = BackgroundWriter::spawn(&config(4, 2)).expect("spawn");
        writer
            .submit(PersistJob::new("doomed", || {
                Err(RosterError::Io(std::io::Error::other("read-only fs")))
            }))
            .expect("queued");
        writer.flush();
        let stats = writer.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.retried, 1);
    }

    #[test]
    fn after_shutdown_jobs_run_inline_and_report_errors() {
        let writer = BackgroundWriter::spawn(&config(4, 1)).expect("spawn");
        writer.shutdown();

        let ran = Arc::new(AtomicUsize::new(0));
        let job_ran = Arc::clone(&ran);
        writer
            .submit(PersistJob::new("late", move || {
                job_ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .expect("inline ok");
        assert_eq!(ran.load(Ordering::SeqCst), 1);

        let err = writer.submit(PersistJob::new("late failure", || {
            Err(RosterError::Io(std::io::Error::other("gone")))
        }));
        assert!(err.is_err());
        assert_eq!(writer.stats().inline, 2);
        // Flushing a closed writer returns immediately.
        writer.flush();
    }

    #[test]
    fn drop_drains_the_backlog() {
        let ran = Arc::new(AtomicUsize::new(0));
        {
            let writer = BackgroundWriter::spawn(&config(64, 1)).expect("spawn");
            for _ in 0..20 {
                let ran = Arc::clone(&ran);
                writer
                    .submit(PersistJob::new("count", move || {
                        ran.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }))
                    .expect("submit");
            }
        }
        assert_eq!(ran.load(Ordering::SeqCst), 20);
    }
}
