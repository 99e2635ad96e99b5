use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;

use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::cluster::{Communicator, ROOT, Tag};
use crate::engine::file::{FileMetadata, FlowFileReader, TrafficCounters};
use crate::engine::filter::Filter;
use crate::engine::record::FlowRecord;
use crate::engine::table::{AggregationTable, TableLayout};
use crate::query::context::RuntimeContext;
use crate::query::errors::QueryError;
use crate::query::progress::{ProgressHandle, ProgressReporter};
use crate::query::query_spec::{QuerySpec, WorkingMode, receive_query};
use crate::query::stats::{QuerySummary, SharedCounters, SharedMetadata, reduce_summary};
use crate::query::stream::{RecordLimit, RecordSender, send_terminator};
use crate::query::tput;
use crate::shared::path::enumerate_inputs;

const LOG_TARGET: &str = "query::worker";

/// Local inputs of one worker. The broadcast path selector, when present,
/// is resolved against each root.
#[derive(Debug, Clone, Default)]
pub struct WorkerInput {
    pub roots: Vec<PathBuf>,
}

impl WorkerInput {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorkerReport {
    pub files: usize,
    pub files_failed: u64,
    pub threads: usize,
    pub summary: QuerySummary,
    pub progress_sent: u64,
}

/// Runs one query as a worker rank. Any fatal failure aborts both channels
/// for every rank.
pub async fn run_worker(ctx: &RuntimeContext, input: &WorkerInput) -> Result<WorkerReport, QueryError> {
    let outcome = execute(ctx, input).await;
    if let Err(e) = &outcome {
        e.log_error(ctx.rank());
        ctx.abort().await;
    }
    outcome
}

async fn execute(ctx: &RuntimeContext, input: &WorkerInput) -> Result<WorkerReport, QueryError> {
    let world = Arc::clone(ctx.world());
    let rank = ctx.rank();

    let spec = Arc::new(receive_query(world.as_ref()).await?);
    let filter = Arc::new(spec.compile_filter()?);
    let files = enumerate_inputs(&input.roots, spec.path.as_deref());
    let threads = thread_count(files.len(), ctx.settings().query.max_threads);
    info!(
        target: LOG_TARGET,
        rank,
        files = files.len(),
        threads,
        mode = ?spec.mode,
        "Query received"
    );

    let reporter = ProgressReporter::start(Arc::clone(ctx.progress()), files.len() as u64).await?;
    let scan = Scan {
        spec: Arc::clone(&spec),
        filter,
        files,
        threads,
        rank,
        world: Arc::clone(&world),
        runtime: Handle::current(),
        progress: reporter.handle(),
    };
    let file_count = scan.files.len();
    let outcome = tokio::task::spawn_blocking(move || scan.run()).await??;

    let limit = spec.record_limit;
    match spec.mode {
        WorkingMode::List => send_terminator(world.as_ref(), ROOT, Tag::List).await?,
        WorkingMode::Sort if spec.streams_records() => {
            send_terminator(world.as_ref(), ROOT, Tag::Sort).await?
        }
        WorkingMode::Sort => {
            let rows = outcome.table.top(limit as usize);
            stream_rows(&world, Tag::Sort, rows.into_iter()).await?;
        }
        WorkingMode::Aggregate if spec.use_fast_topn => {
            tput::participate(&world, &outcome.table, limit).await?;
        }
        WorkingMode::Aggregate => {
            let groups = outcome.table.len();
            debug!(target: LOG_TARGET, rank, groups, "Shipping full local table");
            stream_rows(&world, Tag::Aggregate, outcome.table.rows()).await?;
        }
        WorkingMode::MetadataOnly => {}
    }

    let summary = QuerySummary {
        processed: outcome.processed,
        metadata: outcome.metadata,
    };
    reduce_summary(world.as_ref(), &summary).await?;
    let progress_sent = reporter.finish().await?;

    info!(
        target: LOG_TARGET,
        rank,
        files = file_count,
        failed = outcome.files_failed,
        "Worker finished"
    );
    Ok(WorkerReport {
        files: file_count,
        files_failed: outcome.files_failed,
        threads,
        summary,
        progress_sent,
    })
}

/// Sends rows through a double-buffered sender, then the terminator.
async fn stream_rows<'a>(
    world: &Arc<dyn Communicator>,
    tag: Tag,
    rows: impl Iterator<Item = &'a FlowRecord> + Send,
) -> Result<(), QueryError> {
    let mut sender = RecordSender::new(Handle::current(), Arc::clone(world), ROOT, tag);
    let mut scratch = Vec::with_capacity(128);
    for row in rows {
        row.encode_into(&mut scratch)?;
        sender.push(&scratch).await?;
    }
    sender.finish().await?;
    send_terminator(world.as_ref(), ROOT, tag).await
}

/// Scanning threads: `min(available cores, files)`, optionally capped.
pub fn thread_count(files: usize, cap: Option<usize>) -> usize {
    let available = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let threads = available.min(files);
    match cap {
        Some(cap) => threads.min(cap.max(1)),
        None => threads,
    }
}

struct ScanOutcome {
    /// Merged partitions; empty when the mode keeps no local table.
    table: AggregationTable,
    processed: TrafficCounters,
    metadata: FileMetadata,
    files_failed: u64,
}

/// State shared by the scanning threads of one worker.
struct ScanShared {
    layout: Arc<TableLayout>,
    next_file: AtomicUsize,
    limit: RecordLimit,
    halted: AtomicBool,
    processed: SharedCounters,
    metadata: SharedMetadata,
    failed: AtomicU64,
}

struct Scan {
    spec: Arc<QuerySpec>,
    filter: Arc<Filter>,
    files: Vec<PathBuf>,
    threads: usize,
    rank: usize,
    world: Arc<dyn Communicator>,
    runtime: Handle,
    progress: ProgressHandle,
}

/// Per-thread mutable state; never shared.
struct ThreadState {
    sender: Option<RecordSender>,
    table: Option<AggregationTable>,
    raw: Vec<u8>,
    processed: TrafficCounters,
    metadata: FileMetadata,
}

impl Scan {
    fn run(self) -> Result<ScanOutcome, QueryError> {
        let list_limit = match self.spec.mode {
            WorkingMode::List => self.spec.record_limit,
            _ => 0,
        };
        let shared = ScanShared {
            layout: Arc::new(self.spec.table_layout()),
            next_file: AtomicUsize::new(0),
            limit: RecordLimit::new(list_limit),
            halted: AtomicBool::new(false),
            processed: SharedCounters::default(),
            metadata: SharedMetadata::default(),
            failed: AtomicU64::new(0),
        };

        let results: Vec<Result<Option<AggregationTable>, QueryError>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..self.threads)
                .map(|_| scope.spawn(|| self.scan_thread(&shared)))
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join().unwrap_or_else(|_| {
                        Err(QueryError::Resource("scan thread panicked".to_string()))
                    })
                })
                .collect()
        });

        let mut merged: Option<AggregationTable> = None;
        for partition in results {
            let Some(table) = partition? else {
                continue;
            };
            match merged.as_mut() {
                Some(acc) => acc.merge(table)?,
                None => merged = Some(table),
            }
        }

        Ok(ScanOutcome {
            table: merged.unwrap_or_else(|| AggregationTable::new(Arc::clone(&shared.layout))),
            processed: shared.processed.snapshot(),
            metadata: shared.metadata.snapshot(),
            files_failed: shared.failed.load(Ordering::Acquire),
        })
    }

    fn scan_thread(&self, shared: &ScanShared) -> Result<Option<AggregationTable>, QueryError> {
        let sender = match (self.spec.streams_records(), self.spec.stream_tag()) {
            (true, Some(tag)) => Some(RecordSender::new(
                self.runtime.clone(),
                Arc::clone(&self.world),
                ROOT,
                tag,
            )),
            _ => None,
        };
        let mut state = ThreadState {
            sender,
            table: self
                .spec
                .needs_local_table()
                .then(|| AggregationTable::new(Arc::clone(&shared.layout))),
            raw: Vec::with_capacity(256),
            processed: TrafficCounters::default(),
            metadata: FileMetadata::default(),
        };

        let mut result = Ok(());
        while !shared.halted.load(Ordering::Acquire) {
            let idx = shared.next_file.fetch_add(1, Ordering::Relaxed);
            let Some(path) = self.files.get(idx) else {
                break;
            };
            let outcome = self.scan_file(path, shared, &mut state);
            self.progress.file_done();
            match outcome {
                Ok(()) => {}
                Err(e) if e.is_file_local() => {
                    e.log_error(self.rank);
                    shared.failed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }

        if let (Ok(()), Some(sender)) = (&result, state.sender.take()) {
            match sender.finish_blocking() {
                Ok(flushed) => {
                    shared.limit.record_flush(flushed);
                }
                Err(e) => result = Err(e),
            }
        }

        shared.processed.fold(&state.processed);
        shared.metadata.fold(&state.metadata);
        if result.is_err() {
            shared.halted.store(true, Ordering::Release);
        }
        result.map(|()| state.table)
    }

    fn scan_file(&self, path: &Path, shared: &ScanShared, state: &mut ThreadState) -> Result<(), QueryError> {
        let mut reader =
            FlowFileReader::open(path).map_err(|e| QueryError::from_open(path.to_path_buf(), e))?;
        state.metadata.add(reader.metadata());

        if self.spec.mode != WorkingMode::MetadataOnly && !shared.limit.is_reached() {
            while reader.next_raw(&mut state.raw)? {
                let record = FlowRecord::decode(&state.raw)?;
                if !self.selects(&record) {
                    continue;
                }
                if let Some(sender) = state.sender.as_mut() {
                    if shared.limit.is_reached() {
                        break;
                    }
                    state.processed.account(&record);
                    let flushed = sender.push_blocking(&state.raw)?;
                    if flushed > 0 {
                        shared.limit.record_flush(flushed);
                    }
                } else if let Some(table) = state.table.as_mut() {
                    state.processed.account(&record);
                    table.write(&record)?;
                } else {
                    state.processed.account(&record);
                }
            }
        }
        Ok(())
    }

    fn selects(&self, record: &FlowRecord) -> bool {
        self.spec
            .time_window
            .is_none_or(|window| window.overlaps(record))
            && self.filter.matches(record)
    }
}
