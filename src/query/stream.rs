use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering, fence};

use bytes::Bytes;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::cluster::{ChannelError, Communicator, Envelope, Tag};
use crate::query::buffer::{DoubleBuffer, FillOutcome, FrameError, FrameIter};
use crate::query::errors::QueryError;

const LOG_TARGET: &str = "query::stream";

type SendHandle = JoinHandle<Result<(), ChannelError>>;

/// Double-buffered sender of framed records to one destination.
///
/// Filling the active buffer never blocks. When it is full its bytes are
/// handed to a background send task and filling continues in the other
/// buffer; the sender only waits when it needs a buffer whose send has not
/// completed yet.
pub struct RecordSender {
    runtime: Handle,
    comm: Arc<dyn Communicator>,
    dest: usize,
    tag: Tag,
    buffers: DoubleBuffer,
    /// Dropping the sender detaches this send rather than cancelling it, so
    /// a frame is never cut off halfway through a TCP write.
    inflight: Option<SendHandle>,
    messages: u64,
}

impl RecordSender {
    pub fn new(runtime: Handle, comm: Arc<dyn Communicator>, dest: usize, tag: Tag) -> Self {
        Self::with_buffers(runtime, comm, dest, tag, DoubleBuffer::new())
    }

    pub fn with_buffers(
        runtime: Handle,
        comm: Arc<dyn Communicator>,
        dest: usize,
        tag: Tag,
        buffers: DoubleBuffer,
    ) -> Self {
        Self {
            runtime,
            comm,
            dest,
            tag,
            buffers,
            inflight: None,
            messages: 0,
        }
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages
    }

    /// Queues one serialized record from a blocking thread. Returns the
    /// number of records handed to the network by this call.
    pub fn push_blocking(&mut self, record: &[u8]) -> Result<u64, QueryError> {
        if self.buffers.fill(record)? == FillOutcome::Stored {
            return Ok(0);
        }
        self.wait_inflight_blocking()?;
        let flushed = self.launch();
        self.refill(record)?;
        Ok(flushed)
    }

    /// Async counterpart of `push_blocking`.
    pub async fn push(&mut self, record: &[u8]) -> Result<u64, QueryError> {
        if self.buffers.fill(record)? == FillOutcome::Stored {
            return Ok(0);
        }
        self.wait_inflight().await?;
        let flushed = self.launch();
        self.refill(record)?;
        Ok(flushed)
    }

    /// Sends whatever is buffered and waits for every send to complete.
    pub fn finish_blocking(mut self) -> Result<u64, QueryError> {
        self.wait_inflight_blocking()?;
        let mut flushed = 0;
        if self.buffers.has_pending() {
            flushed = self.launch();
            self.wait_inflight_blocking()?;
        }
        Ok(flushed)
    }

    pub async fn finish(mut self) -> Result<u64, QueryError> {
        self.wait_inflight().await?;
        let mut flushed = 0;
        if self.buffers.has_pending() {
            flushed = self.launch();
            self.wait_inflight().await?;
        }
        Ok(flushed)
    }

    fn refill(&mut self, record: &[u8]) -> Result<(), QueryError> {
        match self.buffers.fill(record)? {
            FillOutcome::Stored => Ok(()),
            FillOutcome::Full => Err(FrameError::TooLarge {
                len: record.len(),
                capacity: self.buffers.capacity(),
            }
            .into()),
        }
    }

    fn launch(&mut self) -> u64 {
        let records = self.buffers.pending_records() as u64;
        let payload = self.buffers.take_for_send();
        let comm = Arc::clone(&self.comm);
        let (dest, tag) = (self.dest, self.tag);
        trace!(target: LOG_TARGET, dest, %tag, bytes = payload.len(), records, "Sending record buffer");
        self.inflight = Some(
            self.runtime
                .spawn(async move { comm.send(dest, tag, payload).await }),
        );
        self.messages += 1;
        records
    }

    fn wait_inflight_blocking(&mut self) -> Result<(), QueryError> {
        if let Some(handle) = self.inflight.take() {
            self.runtime.block_on(handle)??;
        }
        Ok(())
    }

    async fn wait_inflight(&mut self) -> Result<(), QueryError> {
        if let Some(handle) = self.inflight.take() {
            handle.await??;
        }
        Ok(())
    }
}

/// Ends the stream for `tag` from this rank.
pub async fn send_terminator(
    comm: &dyn Communicator,
    dest: usize,
    tag: Tag,
) -> Result<(), QueryError> {
    comm.send(dest, tag, Bytes::new()).await?;
    debug!(target: LOG_TARGET, rank = comm.rank(), %tag, "Stream terminated");
    Ok(())
}

/// Worker-wide record limit shared by the scanning threads. The limit only
/// suppresses further output; it never aborts the file loop.
#[derive(Debug)]
pub struct RecordLimit {
    limit: u64,
    flushed: AtomicU64,
    reached: AtomicBool,
}

impl RecordLimit {
    /// A limit of zero never triggers.
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            flushed: AtomicU64::new(0),
            reached: AtomicBool::new(false),
        }
    }

    pub fn is_reached(&self) -> bool {
        if self.limit == 0 {
            return false;
        }
        fence(Ordering::Acquire);
        self.reached.load(Ordering::Acquire)
    }

    /// Accounts records that have left the worker. Returns whether the limit
    /// is now reached.
    pub fn record_flush(&self, records: u64) -> bool {
        if self.limit == 0 {
            return false;
        }
        let total = self.flushed.fetch_add(records, Ordering::AcqRel) + records;
        if total >= self.limit {
            self.reached.store(true, Ordering::Release);
        }
        fence(Ordering::SeqCst);
        self.reached.load(Ordering::Acquire)
    }

    pub fn flushed(&self) -> u64 {
        self.flushed.load(Ordering::Acquire)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StreamStats {
    pub messages: u64,
    pub records: u64,
    pub bytes: u64,
    pub terminators: u64,
}

/// Coordinator receive loop for one mode tag.
///
/// Accepts messages from any of the `sources` worker ranks in completion
/// order and feeds every framed record to `on_record`. The next receive is
/// posted before the current message is processed. Each source must end its
/// stream with exactly one empty message; the loop returns once all have.
pub async fn receive_records<F>(
    comm: &Arc<dyn Communicator>,
    tag: Tag,
    sources: usize,
    mut on_record: F,
) -> Result<StreamStats, QueryError>
where
    F: FnMut(&[u8]) -> Result<(), QueryError>,
{
    let mut stats = StreamStats::default();
    let mut finished = vec![false; comm.size()];
    let mut active = sources;
    let mut pending = (active > 0).then(|| post_receive(comm, tag));

    while let Some(receive) = pending.take() {
        let envelope = receive.await??;

        if envelope.is_terminator() {
            mark_finished(&mut finished, &envelope)?;
            active -= 1;
            stats.terminators += 1;
            debug!(target: LOG_TARGET, %tag, source = envelope.source, remaining = active, "Source finished");
        }
        if active > 0 {
            pending = Some(post_receive(comm, tag));
        }
        if envelope.is_terminator() {
            continue;
        }

        stats.messages += 1;
        stats.bytes += envelope.payload.len() as u64;
        if let Err(e) = walk_frames(&envelope, &mut on_record, &mut stats) {
            if let Some(outstanding) = pending.take() {
                outstanding.abort();
                let _ = outstanding.await;
            }
            return Err(e);
        }
    }

    Ok(stats)
}

fn post_receive(comm: &Arc<dyn Communicator>, tag: Tag) -> JoinHandle<Result<Envelope, ChannelError>> {
    let comm = Arc::clone(comm);
    tokio::spawn(async move { comm.recv(tag, None).await })
}

fn mark_finished(finished: &mut [bool], envelope: &Envelope) -> Result<(), QueryError> {
    match finished.get_mut(envelope.source) {
        Some(done) if !*done => {
            *done = true;
            Ok(())
        }
        Some(_) => Err(ChannelError::Malformed(format!(
            "rank {} terminated its {} stream twice",
            envelope.source, envelope.tag
        ))
        .into()),
        None => Err(ChannelError::Malformed(format!(
            "terminator from unknown rank {}",
            envelope.source
        ))
        .into()),
    }
}

fn walk_frames<F>(envelope: &Envelope, on_record: &mut F, stats: &mut StreamStats) -> Result<(), QueryError>
where
    F: FnMut(&[u8]) -> Result<(), QueryError>,
{
    for frame in FrameIter::new(&envelope.payload) {
        on_record(frame?)?;
        stats.records += 1;
    }
    Ok(())
}
