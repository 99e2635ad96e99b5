//! Three-round distributed top-N over aggregated traffic volumes.
//!
//! Round 1 ships each worker's local top-N and yields a lower bound on the
//! global N-th value. Round 2 ships every local group whose partial sum
//! reaches `bound / workers`; the union is a superset of the true top-N.
//! Round 3 broadcasts that candidate set back and collects exact partial
//! sums for each candidate from every worker.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};

use crate::cluster::communicator::{decode_u64, encode_words};
use crate::cluster::{Communicator, ROOT, Tag};
use crate::engine::record::FlowRecord;
use crate::engine::table::{AggregationTable, SortDirection, TableLayout};
use crate::engine::types::FieldValue;
use crate::query::buffer::{FrameIter, RecordBuffer};
use crate::query::errors::QueryError;
use crate::query::stream::{RecordSender, receive_records, send_terminator};

const LOG_TARGET: &str = "query::tput";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TputPhase {
    LocalTop,
    Candidates,
    Resolve,
}

/// Coordinator-side bookkeeping of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TputState {
    pub phase: TputPhase,
    pub bottom: u64,
    pub threshold: u64,
    pub candidates: usize,
}

/// Pruning value sent to workers after round 1.
///
/// Descending: a group whose global total reaches `bottom` has at least one
/// partial sum of `ceil(bottom / workers)`. Ascending keeps the mirrored
/// relation (`bottom * workers`) so the bound stays on the safe side.
pub fn compute_threshold(bottom: u64, workers: usize, direction: SortDirection) -> u64 {
    let workers = workers.max(1) as u64;
    match direction {
        SortDirection::Desc => bottom.div_ceil(workers),
        SortDirection::Asc => bottom.saturating_mul(workers),
    }
}

fn sort_value(layout: &TableLayout, row: &FlowRecord) -> Result<u64, QueryError> {
    let sort = layout
        .sort()
        .ok_or_else(|| QueryError::Argument("top-N needs a sort key".to_string()))?;
    row.get(sort.field).as_u64().ok_or_else(|| {
        QueryError::Argument(format!("top-N sort key {} is not numeric", sort.field))
    })
}

fn passes(value: u64, threshold: u64, direction: SortDirection) -> bool {
    match direction {
        SortDirection::Desc => value >= threshold,
        SortDirection::Asc => value <= threshold,
    }
}

fn direction_of(layout: &TableLayout) -> SortDirection {
    layout
        .sort()
        .map(|s| s.direction)
        .unwrap_or(SortDirection::Desc)
}

/// Coordinator side. Returns the table holding exact global totals for every
/// candidate group; its first `limit` sorted rows are the answer.
pub async fn coordinate(
    comm: &Arc<dyn Communicator>,
    layout: Arc<TableLayout>,
    limit: u64,
) -> Result<(AggregationTable, TputState), QueryError> {
    let workers = comm.size().saturating_sub(1);
    let direction = direction_of(&layout);

    let mut local_tops = AggregationTable::new(Arc::clone(&layout));
    receive_records(comm, Tag::TputPhase1, workers, |raw| {
        Ok(local_tops.write_raw(raw)?)
    })
    .await?;

    // With fewer than `limit` rows the last row bounds the answer; an empty
    // table bounds nothing.
    let bottom = match local_tops.nth_sort_value(limit as usize) {
        Some(FieldValue::Unsigned(v)) => v,
        _ => 0,
    };
    let threshold = compute_threshold(bottom, workers, direction);
    info!(target: LOG_TARGET, bottom, threshold, workers, "Round 1 complete");
    comm.broadcast(ROOT, Some(encode_words(&[threshold])))
        .await?;

    let mut candidates = AggregationTable::new(Arc::clone(&layout));
    receive_records(comm, Tag::TputPhase2, workers, |raw| {
        Ok(candidates.write_raw(raw)?)
    })
    .await?;
    debug!(target: LOG_TARGET, candidates = candidates.len(), "Round 2 complete");

    broadcast_rows(comm.as_ref(), candidates.rows()).await?;

    let mut exact = AggregationTable::new(layout);
    receive_records(comm, Tag::TputPhase3, workers, |raw| Ok(exact.write_raw(raw)?)).await?;
    debug!(target: LOG_TARGET, groups = exact.len(), "Round 3 complete");

    let state = TputState {
        phase: TputPhase::Resolve,
        bottom,
        threshold,
        candidates: candidates.len(),
    };
    Ok((exact, state))
}

/// Worker side, run after the local table is complete.
pub async fn participate(
    comm: &Arc<dyn Communicator>,
    table: &AggregationTable,
    limit: u64,
) -> Result<(), QueryError> {
    let layout = Arc::clone(table.layout());
    let direction = direction_of(&layout);
    let mut scratch = Vec::with_capacity(128);

    let mut sender = RecordSender::new(
        tokio::runtime::Handle::current(),
        Arc::clone(comm),
        ROOT,
        Tag::TputPhase1,
    );
    for row in table.top(limit as usize) {
        row.encode_into(&mut scratch)?;
        sender.push(&scratch).await?;
    }
    sender.finish().await?;
    send_terminator(comm.as_ref(), ROOT, Tag::TputPhase1).await?;

    let threshold = decode_u64(&comm.broadcast(ROOT, None).await?)?;

    let mut sender = RecordSender::new(
        tokio::runtime::Handle::current(),
        Arc::clone(comm),
        ROOT,
        Tag::TputPhase2,
    );
    let mut sent = 0usize;
    for row in table.rows() {
        if passes(sort_value(&layout, row)?, threshold, direction) {
            row.encode_into(&mut scratch)?;
            sender.push(&scratch).await?;
            sent += 1;
        }
    }
    sender.finish().await?;
    send_terminator(comm.as_ref(), ROOT, Tag::TputPhase2).await?;
    debug!(target: LOG_TARGET, rank = comm.rank(), threshold, sent, "Sent round 2 candidates");

    let mut sender = RecordSender::new(
        tokio::runtime::Handle::current(),
        Arc::clone(comm),
        ROOT,
        Tag::TputPhase3,
    );
    loop {
        let chunk = comm.broadcast(ROOT, None).await?;
        if chunk.is_empty() {
            break;
        }
        for frame in FrameIter::new(&chunk) {
            let candidate = FlowRecord::decode(frame?)?;
            if let Some(row) = table.lookup(&candidate) {
                row.encode_into(&mut scratch)?;
                sender.push(&scratch).await?;
            }
        }
    }
    sender.finish().await?;
    send_terminator(comm.as_ref(), ROOT, Tag::TputPhase3).await?;
    Ok(())
}

/// Broadcasts rows as framed chunks followed by an empty chunk.
async fn broadcast_rows<'a>(
    comm: &dyn Communicator,
    rows: impl Iterator<Item = &'a FlowRecord>,
) -> Result<(), QueryError> {
    let mut buffer = RecordBuffer::new();
    let mut scratch = Vec::with_capacity(128);
    for row in rows {
        row.encode_into(&mut scratch)?;
        if !buffer.try_push(&scratch)? {
            comm.broadcast(ROOT, Some(buffer.take())).await?;
            buffer.reclaim();
            buffer.try_push(&scratch)?;
        }
    }
    if !buffer.is_empty() {
        comm.broadcast(ROOT, Some(buffer.take())).await?;
    }
    comm.broadcast(ROOT, Some(Bytes::new())).await?;
    Ok(())
}
