use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::cluster::errors::ChannelError;
use crate::cluster::message::{Envelope, Tag};

const NO_ABORT: usize = usize::MAX;

/// Inbound queue of one rank on one communicator, demultiplexed by tag.
/// Messages from a single source keep their arrival order.
pub struct Mailbox {
    queues: Mutex<HashMap<Tag, VecDeque<Envelope>>>,
    notify: Notify,
    closed: AtomicBool,
    aborted_by: AtomicUsize,
}

impl Mailbox {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            aborted_by: AtomicUsize::new(NO_ABORT),
        }
    }

    pub fn deliver(&self, envelope: Envelope) -> Result<(), ChannelError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(self.closed_error());
        }
        self.queues
            .lock()
            .entry(envelope.tag)
            .or_default()
            .push_back(envelope);
        self.notify.notify_waiters();
        Ok(())
    }

    /// Waits for the next message with `tag`, optionally from one source only.
    pub async fn take(&self, tag: Tag, source: Option<usize>) -> Result<Envelope, ChannelError> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a delivery in between is not missed.
            notified.as_mut().enable();

            if self.closed.load(Ordering::Acquire) {
                return Err(self.closed_error());
            }
            if let Some(envelope) = self.try_take(tag, source) {
                return Ok(envelope);
            }
            notified.await;
        }
    }

    pub fn try_take(&self, tag: Tag, source: Option<usize>) -> Option<Envelope> {
        let mut queues = self.queues.lock();
        let queue = queues.get_mut(&tag)?;
        match source {
            None => queue.pop_front(),
            Some(source) => {
                let idx = queue.iter().position(|e| e.source == source)?;
                queue.remove(idx)
            }
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn abort(&self, by: usize) {
        let _ = self
            .aborted_by
            .compare_exchange(NO_ABORT, by, Ordering::AcqRel, Ordering::Acquire);
        self.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn closed_error(&self) -> ChannelError {
        match self.aborted_by.load(Ordering::Acquire) {
            NO_ABORT => ChannelError::Closed,
            rank => ChannelError::Aborted(rank),
        }
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}
