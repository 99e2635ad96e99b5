use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::cluster::ChannelError;
use crate::cluster::tcp::{ConnectPolicy, TcpFabric};
use crate::query::coordinator::{QueryReport, run_coordinator};
use crate::query::errors::QueryError;
use crate::query::query_spec::QuerySpec;
use crate::query::worker::{WorkerInput, WorkerReport, run_worker};
use crate::query::RuntimeContext;
use crate::shared::config::Settings;
use crate::shared::output::RecordPrinter;

const LOG_TARGET: &str = "frontend::tcp";

/// Coordinator bound to its listen address, waiting for workers.
pub struct CoordinatorNode {
    listener: TcpListener,
}

impl CoordinatorNode {
    pub async fn bind(addr: &str) -> Result<Self, QueryError> {
        let listener = TcpListener::bind(addr).await.map_err(ChannelError::from)?;
        info!(target: LOG_TARGET, addr = %listener.local_addr().map_err(ChannelError::from)?, "Coordinator listening");
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, QueryError> {
        Ok(self.listener.local_addr().map_err(ChannelError::from)?)
    }

    /// Accepts `workers` ranks on both channels, then runs the query.
    pub async fn run(
        self,
        settings: Arc<Settings>,
        workers: usize,
        spec: &QuerySpec,
        printer: &mut dyn RecordPrinter,
    ) -> Result<QueryReport, QueryError> {
        let channels = TcpFabric::accept(&self.listener, workers + 1).await?;
        info!(target: LOG_TARGET, workers, "All workers connected");
        let ctx = RuntimeContext::new(
            Arc::new(channels.world),
            Arc::new(channels.progress),
            settings,
        )?;
        let report = run_coordinator(&ctx, spec, printer).await?;
        ctx.close().await;
        Ok(report)
    }
}

/// Connects worker `rank` of a `size`-rank job to the coordinator and
/// serves one query.
pub async fn run_worker_node(
    settings: Arc<Settings>,
    coordinator: &str,
    rank: usize,
    size: usize,
    input: &WorkerInput,
) -> Result<WorkerReport, QueryError> {
    let policy = ConnectPolicy {
        retries: settings.cluster.connect_retries,
        backoff: settings.cluster.connect_backoff(),
    };
    let channels = TcpFabric::connect(coordinator, rank, size, policy).await?;
    let ctx = RuntimeContext::new(
        Arc::new(channels.world),
        Arc::new(channels.progress),
        settings,
    )?;
    let report = run_worker(&ctx, input).await?;
    ctx.close().await;
    Ok(report)
}
