//! Worker thread re-delivering rejected batches.
//!
//! Jobs arrive over a bounded channel and are kept in a schedule ordered by
//! due time. The worker blocks on the channel until the earliest job is due,
//! so a long delay on one batch never holds up commands or other batches.

use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    io,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering as AtomicOrdering},
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError, bounded};
use log::{info, warn};

use crate::{
    config::RetryPolicy, dispatch::Dispatcher, error::DeliveryError, error::RetryQueueError,
    rate_limited_warner::RateLimitedWarner,
};

use super::backoff::Backoff;

/// A rejected batch awaiting another delivery attempt.
#[derive(Debug, Clone)]
pub struct RetryJob {
    /// Serialised JSON body, identical for every attempt.
    pub body: Arc<[u8]>,
    /// Number of records in the body, for log output.
    pub records: usize,
    /// Retries already performed for this batch.
    pub attempt: u32,
}

impl RetryJob {
    /// A batch that was rejected on its first post.
    pub fn new(body: Arc<[u8]>, records: usize) -> Self {
        Self {
            body,
            records,
            attempt: 0,
        }
    }
}

/// Commands processed by the worker thread.
#[derive(Debug)]
pub enum RetryCommand {
    Retry(RetryJob),
    Flush(Sender<()>),
    Shutdown(Sender<()>),
}

/// State shared between the worker and the shipper handle.
#[derive(Debug)]
pub struct WorkerShared {
    pub pending: AtomicUsize,
    pub warner: RateLimitedWarner,
}

impl WorkerShared {
    pub fn new(warn_interval: Duration) -> Self {
        Self {
            pending: AtomicUsize::new(0),
            warner: RateLimitedWarner::new(warn_interval),
        }
    }

    fn job_finished(&self) {
        self.pending.fetch_sub(1, AtomicOrdering::AcqRel);
    }

    fn warn_dropped(&self, reason: &str) {
        self.warner.record_drop();
        self.warner.warn_if_due(|count| {
            warn!("LogShipper dropped {count} batches {reason}");
        });
    }
}

struct Scheduled {
    due: Instant,
    seq: u64,
    job: RetryJob,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // Reversed so the max-heap yields the earliest due job first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Spawns the background retry worker.
///
/// # Returns
///
/// A tuple containing:
/// * A sender for submitting [`RetryCommand`]s to the worker
/// * A join handle for the spawned thread
///
/// # Errors
///
/// Returns an I/O error if the operating system refuses to create the thread.
pub fn spawn_worker(
    dispatcher: Arc<Dispatcher>,
    policy: RetryPolicy,
    capacity: usize,
    shared: Arc<WorkerShared>,
) -> io::Result<(Sender<RetryCommand>, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded(capacity);
    let handle = thread::Builder::new()
        .name("loganalytics-retry".into())
        .spawn(move || Worker::new(dispatcher, policy, shared).run(rx))?;
    Ok((tx, handle))
}

struct Worker {
    dispatcher: Arc<Dispatcher>,
    backoff: Backoff,
    shared: Arc<WorkerShared>,
    schedule: BinaryHeap<Scheduled>,
    next_seq: u64,
}

impl Worker {
    fn new(dispatcher: Arc<Dispatcher>, policy: RetryPolicy, shared: Arc<WorkerShared>) -> Self {
        Self {
            dispatcher,
            backoff: Backoff::new(policy),
            shared,
            schedule: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    fn schedule_job(&mut self, job: RetryJob, now: Instant) {
        let delay = self.backoff.delay(job.attempt + 1);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.schedule.push(Scheduled {
            due: now + delay,
            seq,
            job,
        });
    }

    fn fire_due(&mut self) {
        let now = Instant::now();
        while self.schedule.peek().is_some_and(|s| s.due <= now) {
            let Some(scheduled) = self.schedule.pop() else {
                break;
            };
            self.attempt(scheduled.job, true);
        }
    }

    /// Deliver one job. When `reschedule` is false the job is dropped on
    /// failure regardless of the remaining attempt budget.
    fn attempt(&mut self, mut job: RetryJob, reschedule: bool) {
        job.attempt += 1;
        match self.dispatcher.deliver(&job.body) {
            Ok(()) => {
                info!(
                    "LogShipper posted {} messages on retry {}",
                    job.records, job.attempt
                );
                self.shared.job_finished();
            }
            Err(err @ DeliveryError::HttpStatus { .. })
                if reschedule && self.backoff.allows(job.attempt) =>
            {
                warn!(
                    "LogShipper retry {} failed, will retry again: {err}",
                    job.attempt
                );
                self.schedule_job(job, Instant::now());
            }
            Err(err) => {
                warn!(
                    "LogShipper retry {} of {} messages failed, dropping batch: {err}",
                    job.attempt, job.records
                );
                self.shared.job_finished();
                self.shared.warn_dropped("after failed retries");
            }
        }
    }

    /// Acknowledge a flush or shutdown barrier.
    ///
    /// Commands are handled in order, so by the time the barrier is read every
    /// job queued ahead of it has been scheduled. Delayed retries keep their
    /// due time.
    fn acknowledge(&mut self, ack: Sender<()>) {
        // A caller that timed out has dropped its receiver.
        let _ = ack.send(());
    }

    fn drain_pending(&mut self, rx: &Receiver<RetryCommand>) {
        loop {
            match rx.try_recv() {
                Ok(RetryCommand::Retry(job)) => self.schedule_job(job, Instant::now()),
                Ok(RetryCommand::Flush(ack)) | Ok(RetryCommand::Shutdown(ack)) => {
                    self.acknowledge(ack);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    /// Give every scheduled job one final immediate attempt.
    fn finish(&mut self) {
        if !self.schedule.is_empty() {
            info!(
                "LogShipper attempting {} pending retries before shutdown",
                self.schedule.len()
            );
        }
        while let Some(scheduled) = self.schedule.pop() {
            self.attempt(scheduled.job, false);
        }
        self.shared.warner.flush(|count| {
            warn!("LogShipper dropped {count} batches after failed retries");
        });
    }

    fn next_command(&mut self, rx: &Receiver<RetryCommand>) -> Option<RetryCommand> {
        loop {
            let Some(due) = self.schedule.peek().map(|s| s.due) else {
                return rx.recv().ok();
            };
            let now = Instant::now();
            if due <= now {
                self.fire_due();
                continue;
            }
            match rx.recv_timeout(due - now) {
                Ok(command) => return Some(command),
                Err(RecvTimeoutError::Timeout) => self.fire_due(),
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    fn run(mut self, rx: Receiver<RetryCommand>) {
        loop {
            match self.next_command(&rx) {
                Some(RetryCommand::Retry(job)) => self.schedule_job(job, Instant::now()),
                Some(RetryCommand::Flush(ack)) => self.acknowledge(ack),
                Some(RetryCommand::Shutdown(ack)) => {
                    self.drain_pending(&rx);
                    self.finish();
                    self.acknowledge(ack);
                    break;
                }
                None => {
                    self.finish();
                    break;
                }
            }
        }
    }
}

/// Hands a rejected batch to the retry worker.
///
/// This is a non-blocking operation. If the queue is full, the batch is
/// dropped and a rate-limited warning is emitted.
///
/// # Errors
///
/// * [`RetryQueueError::QueueFull`] - The queue is at capacity; batch was dropped
/// * [`RetryQueueError::Closed`] - The worker has shut down; batch was dropped
pub fn enqueue_retry(
    tx: &Sender<RetryCommand>,
    job: RetryJob,
    shared: &WorkerShared,
) -> Result<(), RetryQueueError> {
    shared.pending.fetch_add(1, AtomicOrdering::AcqRel);
    match tx.try_send(RetryCommand::Retry(job)) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(_)) => {
            shared.job_finished();
            shared.warn_dropped("because the retry queue was full");
            Err(RetryQueueError::QueueFull)
        }
        Err(TrySendError::Disconnected(_)) => {
            shared.job_finished();
            shared.warn_dropped("because the retry worker has shut down");
            Err(RetryQueueError::Closed)
        }
    }
}

/// Wait until the worker has taken every job queued before this call.
///
/// `timeout` bounds the whole exchange: a full queue and a busy worker share
/// one deadline. Returns `false` when the barrier was not acknowledged in
/// time or the worker is gone.
pub fn flush_queue(tx: &Sender<RetryCommand>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let (ack_tx, ack_rx) = bounded(1);
    tx.send_deadline(RetryCommand::Flush(ack_tx), deadline)
        .is_ok()
        && ack_rx.recv_deadline(deadline).is_ok()
}
