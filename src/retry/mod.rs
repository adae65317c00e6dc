//! Deferred re-delivery of batches the ingestion endpoint rejected.
//!
//! A rejected batch is handed to a dedicated worker thread over a bounded
//! channel. The worker re-signs and re-posts it on an exponential schedule,
//! bounded by [`RetryPolicy::max_attempts`](crate::RetryPolicy), and gives
//! every outstanding batch one last attempt when the shipper is closed.
//!
//! # Retry Semantics
//!
//! - **200**: Delivered; the batch is discarded.
//! - **Any other status**: Retried until the attempt budget is spent.
//! - **Transport errors**: Never retried; the batch is dropped and logged.

mod backoff;
mod worker;

use std::{
    sync::{Arc, atomic::Ordering},
    thread,
    time::Duration,
};

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use crate::{config::RetryPolicy, dispatch::Dispatcher, error::RetryQueueError};

pub use worker::RetryJob;

use worker::{RetryCommand, WorkerShared, enqueue_retry, flush_queue, spawn_worker};

/// Owner of the retry worker thread.
pub struct RetryWorker {
    tx: Mutex<Option<Sender<RetryCommand>>>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    shared: Arc<WorkerShared>,
    /// Upper bound on how long [`close`](Self::close) waits for the final
    /// attempts to finish.
    shutdown_timeout: Duration,
}

impl RetryWorker {
    /// Spawn the worker thread.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the thread cannot be created.
    pub fn spawn(
        dispatcher: Arc<Dispatcher>,
        policy: RetryPolicy,
        capacity: usize,
        warn_interval: Duration,
        shutdown_timeout: Duration,
    ) -> std::io::Result<Self> {
        let shared = Arc::new(WorkerShared::new(warn_interval));
        let (tx, handle) = spawn_worker(dispatcher, policy, capacity, Arc::clone(&shared))?;
        Ok(Self {
            tx: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
            shared,
            shutdown_timeout,
        })
    }

    fn sender(&self) -> Option<Sender<RetryCommand>> {
        self.tx.lock().as_ref().cloned()
    }

    /// Queue a rejected batch for re-delivery.
    ///
    /// # Errors
    ///
    /// * [`RetryQueueError::QueueFull`] if the worker is saturated.
    /// * [`RetryQueueError::Closed`] if the worker has been shut down.
    pub fn schedule(&self, job: RetryJob) -> Result<(), RetryQueueError> {
        let Some(tx) = self.sender() else {
            self.shared.warner.record_drop();
            self.shared.warner.warn_if_due(|count| {
                log::warn!("LogShipper dropped {count} batches after shutdown");
            });
            return Err(RetryQueueError::Closed);
        };
        enqueue_retry(&tx, job, &self.shared)
    }

    /// Number of batches queued or waiting for their next attempt.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Wait until the worker has processed every command queued so far.
    ///
    /// Does not wait for delayed retries to fire.
    pub fn flush(&self, timeout: Duration) -> bool {
        let Some(tx) = self.sender() else {
            return false;
        };
        self.shared.warner.flush(|count| {
            log::warn!("LogShipper dropped {count} batches in the last interval");
        });
        flush_queue(&tx, timeout)
    }

    /// Stop accepting retries, make a final attempt for each pending batch
    /// and join the worker thread.
    ///
    /// Returns `false` if the worker did not finish within the shutdown
    /// timeout; the thread is then detached.
    pub fn close(&self) -> bool {
        let Some(tx) = self.tx.lock().take() else {
            return true;
        };
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        let acknowledged = tx
            .send_timeout(RetryCommand::Shutdown(ack_tx), self.shutdown_timeout)
            .is_ok()
            && ack_rx.recv_timeout(self.shutdown_timeout).is_ok();
        drop(tx);

        let Some(handle) = self.handle.lock().take() else {
            return acknowledged;
        };
        if !acknowledged {
            log::warn!(
                "LogShipper retry worker did not finish within {:?}; {} batches abandoned",
                self.shutdown_timeout,
                self.pending()
            );
            return false;
        }
        if handle.join().is_err() {
            log::warn!("LogShipper: retry worker thread panicked");
            return false;
        }
        true
    }
}

impl Drop for RetryWorker {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for RetryWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryWorker")
            .field("pending", &self.pending())
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish()
    }
}
