use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::cluster::LocalFabric;
use crate::query::coordinator::{QueryReport, run_coordinator};
use crate::query::errors::{ErrorKind, QueryError};
use crate::query::query_spec::QuerySpec;
use crate::query::worker::{WorkerInput, WorkerReport, run_worker};
use crate::query::RuntimeContext;
use crate::shared::config::Settings;
use crate::shared::output::RecordPrinter;

const LOG_TARGET: &str = "frontend::local";

#[derive(Debug, Clone, Default)]
pub struct LocalReport {
    pub query: QueryReport,
    pub workers: Vec<WorkerReport>,
}

/// Deals input paths to `workers` ranks round-robin.
pub fn partition_inputs(paths: &[PathBuf], workers: usize) -> Vec<WorkerInput> {
    let mut inputs = vec![WorkerInput::default(); workers];
    if workers == 0 {
        return inputs;
    }
    for (i, path) in paths.iter().enumerate() {
        inputs[i % workers].roots.push(path.clone());
    }
    inputs
}

/// Runs a whole job inside this process: rank 0 plus one task per entry of
/// `inputs`, connected by two in-process fabrics.
pub async fn run_local(
    settings: Arc<Settings>,
    spec: &QuerySpec,
    inputs: Vec<WorkerInput>,
    printer: &mut dyn RecordPrinter,
) -> Result<LocalReport, QueryError> {
    let size = inputs.len() + 1;
    let mut contexts = LocalFabric::build(size)
        .into_iter()
        .zip(LocalFabric::build(size))
        .map(|(world, progress)| {
            RuntimeContext::new(Arc::new(world), Arc::new(progress), Arc::clone(&settings))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let coordinator = contexts.remove(0);
    info!(target: LOG_TARGET, workers = inputs.len(), "Starting local job");

    let mut handles = Vec::with_capacity(inputs.len());
    for (ctx, input) in contexts.into_iter().zip(inputs) {
        handles.push(tokio::spawn(async move { run_worker(&ctx, &input).await }));
    }

    let query = run_coordinator(&coordinator, spec, printer).await;

    let mut workers = Vec::with_capacity(handles.len());
    let mut worker_error = None;
    for (i, handle) in handles.into_iter().enumerate() {
        match handle.await? {
            Ok(report) => workers.push(report),
            Err(e) => {
                debug!(target: LOG_TARGET, rank = i + 1, error = %e, "Worker failed");
                worker_error = Some(root_cause(worker_error, e));
            }
        }
    }

    match (query, worker_error) {
        (Ok(query), None) => Ok(LocalReport { query, workers }),
        (Ok(_), Some(e)) => Err(e),
        (Err(e), None) => Err(e),
        (Err(e), Some(w)) => Err(root_cause(Some(e), w)),
    }
}

/// After an abort every rank fails; the first non-channel error is the one
/// that started it.
fn root_cause(current: Option<QueryError>, next: QueryError) -> QueryError {
    match current {
        Some(current) if current.kind() != ErrorKind::Channel => current,
        Some(current) if next.kind() == ErrorKind::Channel => current,
        _ => next,
    }
}
