use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use flow_dist::command::{Cli, QueryArgs, Role};
use flow_dist::frontend::{CoordinatorNode, partition_inputs, run_local, run_worker_node};
use flow_dist::logging;
use flow_dist::query::{QueryError, WorkerInput};
use flow_dist::shared::config::{Settings, load_settings};
use flow_dist::shared::output::printer_for;
use tracing::info;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = match bootstrap(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("flowdist: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let (node, outcome) = run(cli.role, settings).await;
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("flowdist: {} error on {node}: {e}", e.kind().as_str());
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn bootstrap(cli: &Cli) -> anyhow::Result<Settings> {
    let settings = load_settings().context("loading configuration")?;
    logging::init(&settings.logging, cli.verbose).context("initializing logging")?;
    Ok(settings)
}

/// Applies per-query display overrides on top of the loaded settings.
fn with_overrides(mut settings: Settings, query: &QueryArgs) -> Arc<Settings> {
    if let Some(format) = query.output_format {
        settings.query.output_format = format;
    }
    if let Some(progress) = query.progress {
        settings.query.progress = progress;
    }
    Arc::new(settings)
}

async fn run(role: Role, settings: Settings) -> (String, Result<(), QueryError>) {
    match role {
        Role::Local {
            workers,
            query,
            inputs,
        } => {
            let outcome = async {
                if workers == 0 {
                    return Err(QueryError::Argument("at least one worker is required".to_string()));
                }
                let spec = query.to_spec()?;
                let settings = with_overrides(settings, &query);
                let mut printer = printer_for(settings.query.output_format, io::stdout());
                let report = run_local(
                    Arc::clone(&settings),
                    &spec,
                    partition_inputs(&inputs, workers),
                    printer.as_mut(),
                )
                .await?;
                info!(target: "flowdist", printed = report.query.records_printed, "Local job done");
                Ok::<(), QueryError>(())
            }
            .await;
            ("local job".to_string(), outcome)
        }
        Role::Coordinator {
            listen,
            workers,
            query,
        } => {
            let outcome = async {
                let spec = query.to_spec()?;
                let settings = with_overrides(settings, &query);
                let addr = listen.unwrap_or_else(|| settings.cluster.listen_addr.clone());
                let node = CoordinatorNode::bind(&addr).await?;
                let mut printer = printer_for(settings.query.output_format, io::stdout());
                node.run(Arc::clone(&settings), workers, &spec, printer.as_mut())
                    .await?;
                Ok::<(), QueryError>(())
            }
            .await;
            ("rank 0".to_string(), outcome)
        }
        Role::Worker {
            connect,
            rank,
            size,
            roots,
        } => {
            let input = WorkerInput::new(roots);
            let outcome = run_worker_node(Arc::new(settings), &connect, rank, size, &input)
                .await
                .map(|_| ());
            (format!("rank {rank}"), outcome)
        }
    }
}
