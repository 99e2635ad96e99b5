use std::sync::atomic::{AtomicU64, Ordering};

use crate::cluster::{ChannelError, Communicator, ROOT};
use crate::engine::file::{FileMetadata, TrafficCounters};
use crate::query::errors::QueryError;

pub const PROCESSED_WORDS: usize = 3;
pub const METADATA_WORDS: usize = 12;

pub fn processed_to_words(counters: &TrafficCounters) -> [u64; PROCESSED_WORDS] {
    [counters.flows, counters.packets, counters.bytes]
}

pub fn processed_from_words(words: &[u64]) -> Result<TrafficCounters, QueryError> {
    match words {
        [flows, packets, bytes] => Ok(TrafficCounters {
            flows: *flows,
            packets: *packets,
            bytes: *bytes,
        }),
        _ => Err(shape_error("processed summary", PROCESSED_WORDS, words.len())),
    }
}

pub fn metadata_to_words(meta: &FileMetadata) -> [u64; METADATA_WORDS] {
    let mut words = [0u64; METADATA_WORDS];
    for (chunk, counters) in words.chunks_exact_mut(PROCESSED_WORDS).zip(&meta.by_proto) {
        chunk.copy_from_slice(&processed_to_words(counters));
    }
    words
}

pub fn metadata_from_words(words: &[u64]) -> Result<FileMetadata, QueryError> {
    if words.len() != METADATA_WORDS {
        return Err(shape_error("metadata summary", METADATA_WORDS, words.len()));
    }
    let mut meta = FileMetadata::default();
    for (counters, chunk) in meta.by_proto.iter_mut().zip(words.chunks_exact(PROCESSED_WORDS)) {
        *counters = processed_from_words(chunk)?;
    }
    Ok(meta)
}

fn shape_error(what: &str, expected: usize, got: usize) -> QueryError {
    ChannelError::Malformed(format!("{what} expects {expected} values, got {got}")).into()
}

/// Job-wide statistics as seen by the coordinator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuerySummary {
    pub processed: TrafficCounters,
    pub metadata: FileMetadata,
}

/// Runs both statistics reductions. Every rank must call this in the same
/// position of the protocol; only the root gets `Some`.
pub async fn reduce_summary(
    comm: &dyn Communicator,
    local: &QuerySummary,
) -> Result<Option<QuerySummary>, QueryError> {
    let processed = comm
        .reduce_sum(ROOT, &processed_to_words(&local.processed))
        .await?;
    let metadata = comm
        .reduce_sum(ROOT, &metadata_to_words(&local.metadata))
        .await?;
    match (processed, metadata) {
        (Some(p), Some(m)) => Ok(Some(QuerySummary {
            processed: processed_from_words(&p)?,
            metadata: metadata_from_words(&m)?,
        })),
        _ => Ok(None),
    }
}

/// Lock-free totals shared by the scanning threads. Each thread keeps
/// private counters and folds them in once when its file loop ends.
#[derive(Debug, Default)]
pub struct SharedCounters {
    flows: AtomicU64,
    packets: AtomicU64,
    bytes: AtomicU64,
}

impl SharedCounters {
    pub fn fold(&self, local: &TrafficCounters) {
        self.flows.fetch_add(local.flows, Ordering::Relaxed);
        self.packets.fetch_add(local.packets, Ordering::Relaxed);
        self.bytes.fetch_add(local.bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TrafficCounters {
        TrafficCounters {
            flows: self.flows.load(Ordering::Acquire),
            packets: self.packets.load(Ordering::Acquire),
            bytes: self.bytes.load(Ordering::Acquire),
        }
    }
}

#[derive(Debug, Default)]
pub struct SharedMetadata {
    by_proto: [SharedCounters; 4],
}

impl SharedMetadata {
    pub fn fold(&self, local: &FileMetadata) {
        for (shared, counters) in self.by_proto.iter().zip(&local.by_proto) {
            shared.fold(counters);
        }
    }

    pub fn snapshot(&self) -> FileMetadata {
        let mut meta = FileMetadata::default();
        for (counters, shared) in meta.by_proto.iter_mut().zip(&self.by_proto) {
            *counters = shared.snapshot();
        }
        meta
    }
}
