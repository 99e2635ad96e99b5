use std::sync::Arc;

use tracing::{debug, info};

use crate::cluster::{Communicator, Tag};
use crate::engine::record::FlowRecord;
use crate::engine::table::{AggregationTable, TableLayout};
use crate::query::context::RuntimeContext;
use crate::query::errors::QueryError;
use crate::query::progress::{ProgressState, run_progress_duty};
use crate::query::query_spec::{QuerySpec, WorkingMode, broadcast_query};
use crate::query::stats::{QuerySummary, reduce_summary};
use crate::query::stream::{StreamStats, receive_records};
use crate::query::tput::{self, TputState};
use crate::shared::output::RecordPrinter;

const LOG_TARGET: &str = "query::coordinator";

#[derive(Debug, Clone, Default)]
pub struct QueryReport {
    pub records_printed: u64,
    pub stream: StreamStats,
    pub summary: QuerySummary,
    pub tput: Option<TputState>,
    pub progress: Option<ProgressState>,
}

/// Runs one query as rank 0: the main duty on the world channel and the
/// progress duty on the progress channel, concurrently. Any failure aborts
/// both channels for every rank.
pub async fn run_coordinator(
    ctx: &RuntimeContext,
    spec: &QuerySpec,
    printer: &mut dyn RecordPrinter,
) -> Result<QueryReport, QueryError> {
    let progress = tokio::spawn(run_progress_duty(
        Arc::clone(ctx.progress()),
        ctx.settings().query.progress.renderer(),
    ));
    let progress_abort = progress.abort_handle();

    let outcome = match drive(ctx, spec, printer).await {
        Ok(mut report) => match progress.await {
            Ok(Ok(state)) => {
                report.progress = Some(state);
                Ok(report)
            }
            Ok(Err(e)) => Err(e),
            Err(e) => Err(e.into()),
        },
        Err(e) => {
            progress_abort.abort();
            Err(e)
        }
    };

    if let Err(e) = &outcome {
        e.log_error(ctx.rank());
        ctx.abort().await;
    }
    outcome
}

async fn drive(
    ctx: &RuntimeContext,
    spec: &QuerySpec,
    printer: &mut dyn RecordPrinter,
) -> Result<QueryReport, QueryError> {
    let world = ctx.world();
    let workers = ctx.workers();
    info!(
        target: LOG_TARGET,
        workers,
        mode = ?spec.mode,
        limit = spec.record_limit,
        fast_topn = spec.use_fast_topn,
        "Starting query"
    );

    broadcast_query(world.as_ref(), spec).await?;
    printer
        .begin(&spec.printed_fields())
        .map_err(QueryError::Output)?;

    let mut report = QueryReport::default();
    let limit = spec.record_limit;
    let layout = Arc::new(spec.table_layout());

    match spec.mode {
        WorkingMode::List => {
            let (printed, stream) = list(world, workers, limit, printer).await?;
            report.records_printed = printed;
            report.stream = stream;
        }
        WorkingMode::Sort => {
            let (table, stream) = collect(world, Tag::Sort, workers, layout).await?;
            report.records_printed = print_rows(printer, table.top(limit as usize))?;
            report.stream = stream;
        }
        WorkingMode::Aggregate if spec.use_fast_topn => {
            let (table, state) = tput::coordinate(world, layout, limit).await?;
            report.records_printed = print_rows(printer, table.top(limit as usize))?;
            report.tput = Some(state);
        }
        WorkingMode::Aggregate => {
            let (table, stream) = collect(world, Tag::Aggregate, workers, layout).await?;
            debug!(target: LOG_TARGET, groups = table.len(), "Full shuffle merged");
            report.records_printed = print_rows(printer, table.top(limit as usize))?;
            report.stream = stream;
        }
        WorkingMode::MetadataOnly => {}
    }

    let summary = reduce_summary(world.as_ref(), &QuerySummary::default())
        .await?
        .ok_or_else(|| QueryError::Resource("statistics reduction returned nothing on root".to_string()))?;
    printer
        .print_summary(&summary.processed, &summary.metadata)
        .map_err(QueryError::Output)?;
    report.summary = summary;

    info!(
        target: LOG_TARGET,
        printed = report.records_printed,
        flows = summary.processed.flows,
        "Query finished"
    );
    Ok(report)
}

/// Prints records as they arrive. Once the limit is reached the stream is
/// still drained to its terminators, because workers cannot know the global
/// count, but nothing more is printed.
async fn list(
    world: &Arc<dyn Communicator>,
    workers: usize,
    limit: u64,
    printer: &mut dyn RecordPrinter,
) -> Result<(u64, StreamStats), QueryError> {
    let mut printed = 0u64;
    let stream = receive_records(world, Tag::List, workers, |raw| {
        if limit > 0 && printed >= limit {
            return Ok(());
        }
        let record = FlowRecord::decode(raw)?;
        printer.print_record(&record).map_err(QueryError::Output)?;
        printed += 1;
        Ok(())
    })
    .await?;
    Ok((printed, stream))
}

async fn collect(
    world: &Arc<dyn Communicator>,
    tag: Tag,
    workers: usize,
    layout: Arc<TableLayout>,
) -> Result<(AggregationTable, StreamStats), QueryError> {
    let mut table = AggregationTable::new(layout);
    let stream = receive_records(world, tag, workers, |raw| Ok(table.write_raw(raw)?)).await?;
    Ok((table, stream))
}

fn print_rows(printer: &mut dyn RecordPrinter, rows: Vec<&FlowRecord>) -> Result<u64, QueryError> {
    let mut printed = 0;
    for row in rows {
        printer.print_record(row).map_err(QueryError::Output)?;
        printed += 1;
    }
    Ok(printed)
}
