use std::io::Write;
use std::sync::Arc;

use bytes::Bytes;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cluster::communicator::{decode_u64, encode_words};
use crate::cluster::{ChannelError, Communicator, ROOT, Tag};
use crate::query::errors::QueryError;

const LOG_TARGET: &str = "query::progress";

/// Per-source file accounting kept by the coordinator's progress duty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressState {
    goals: Vec<u64>,
    done: Vec<u64>,
    goal_sum: u64,
    done_sum: u64,
}

impl ProgressState {
    /// `goals` is indexed by rank; the coordinator's own entry is zero.
    pub fn new(goals: Vec<u64>) -> Self {
        let goal_sum = goals.iter().sum();
        Self {
            done: vec![0; goals.len()],
            goals,
            goal_sum,
            done_sum: 0,
        }
    }

    pub fn record_done(&mut self, source: usize) -> Result<(), QueryError> {
        let (Some(done), Some(goal)) = (self.done.get_mut(source), self.goals.get(source)) else {
            return Err(ChannelError::Malformed(format!("progress from unknown rank {source}")).into());
        };
        if *done >= *goal {
            return Err(ChannelError::Malformed(format!(
                "rank {source} reported more than its {goal} files"
            ))
            .into());
        }
        *done += 1;
        self.done_sum += 1;
        Ok(())
    }

    pub fn goal_sum(&self) -> u64 {
        self.goal_sum
    }

    pub fn done_sum(&self) -> u64 {
        self.done_sum
    }

    pub fn goal(&self, source: usize) -> u64 {
        self.goals.get(source).copied().unwrap_or(0)
    }

    pub fn done(&self, source: usize) -> u64 {
        self.done.get(source).copied().unwrap_or(0)
    }

    pub fn percent(&self) -> f64 {
        if self.goal_sum == 0 {
            return 100.0;
        }
        self.done_sum as f64 * 100.0 / self.goal_sum as f64
    }

    pub fn is_complete(&self) -> bool {
        self.done_sum == self.goal_sum
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressDisplay {
    None,
    Log,
    Bar,
}

impl std::str::FromStr for ProgressDisplay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(ProgressDisplay::None),
            "log" => Ok(ProgressDisplay::Log),
            "bar" => Ok(ProgressDisplay::Bar),
            other => Err(format!("unknown progress display '{other}'")),
        }
    }
}

impl ProgressDisplay {
    pub fn renderer(self) -> Box<dyn ProgressRenderer> {
        match self {
            ProgressDisplay::None => Box::new(SilentRenderer),
            ProgressDisplay::Log => Box::new(LogRenderer::default()),
            ProgressDisplay::Bar => Box::new(BarRenderer::new(std::io::stderr())),
        }
    }
}

pub trait ProgressRenderer: Send {
    fn render(&mut self, state: &ProgressState);

    fn finish(&mut self, _state: &ProgressState) {}
}

pub struct SilentRenderer;

impl ProgressRenderer for SilentRenderer {
    fn render(&mut self, _state: &ProgressState) {}
}

/// Emits a log line each time the whole percentage changes.
#[derive(Default)]
pub struct LogRenderer {
    last_percent: Option<u64>,
}

impl ProgressRenderer for LogRenderer {
    fn render(&mut self, state: &ProgressState) {
        let percent = state.percent().floor() as u64;
        if self.last_percent == Some(percent) {
            return;
        }
        self.last_percent = Some(percent);
        info!(
            target: LOG_TARGET,
            done = state.done_sum(),
            goal = state.goal_sum(),
            "Progress {}%",
            percent
        );
    }
}

/// Redraws a single status line in place.
pub struct BarRenderer<W: Write + Send> {
    out: W,
    width: usize,
}

impl<W: Write + Send> BarRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out, width: 40 }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> ProgressRenderer for BarRenderer<W> {
    fn render(&mut self, state: &ProgressState) {
        let filled = ((state.percent() / 100.0) * self.width as f64).round() as usize;
        let bar: String = (0..self.width)
            .map(|i| if i < filled { '#' } else { '.' })
            .collect();
        let _ = write!(
            self.out,
            "\r[{bar}] {:5.1}% ({}/{} files)",
            state.percent(),
            state.done_sum(),
            state.goal_sum()
        );
        let _ = self.out.flush();
    }

    fn finish(&mut self, _state: &ProgressState) {
        let _ = writeln!(self.out);
    }
}

/// Coordinator progress duty. Runs on its own communicator: gathers every
/// worker's file goal, then counts one empty notification per finished file
/// until all goals are met. It has no timeout.
pub async fn run_progress_duty(
    comm: Arc<dyn Communicator>,
    mut renderer: Box<dyn ProgressRenderer>,
) -> Result<ProgressState, QueryError> {
    let parts = comm
        .gather(ROOT, encode_words(&[0]))
        .await?
        .ok_or_else(|| QueryError::Resource("progress duty must run on the root".to_string()))?;
    let goals = parts
        .iter()
        .map(|p| decode_u64(p))
        .collect::<Result<Vec<u64>, ChannelError>>()?;

    let mut state = ProgressState::new(goals);
    debug!(target: LOG_TARGET, goal = state.goal_sum(), "Progress duty started");
    renderer.render(&state);

    while !state.is_complete() {
        let note = comm.recv(Tag::Progress, None).await?;
        if !note.is_terminator() {
            return Err(ChannelError::Malformed(format!(
                "progress notification from rank {} carries {} bytes",
                note.source,
                note.payload.len()
            ))
            .into());
        }
        state.record_done(note.source)?;
        renderer.render(&state);
    }

    renderer.finish(&state);
    debug!(target: LOG_TARGET, done = state.done_sum(), "Progress duty finished");
    Ok(state)
}

/// Worker side of the progress channel. Scanning threads signal finished
/// files through a cheap handle; a task forwards them to the coordinator.
pub struct ProgressReporter {
    tx: mpsc::UnboundedSender<()>,
    task: JoinHandle<Result<u64, ChannelError>>,
}

#[derive(Clone)]
pub struct ProgressHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl ProgressHandle {
    pub fn file_done(&self) {
        // The forwarding task only stops once the channel failed; the job
        // is aborting then.
        let _ = self.tx.send(());
    }
}

impl ProgressReporter {
    pub async fn start(comm: Arc<dyn Communicator>, goal: u64) -> Result<Self, QueryError> {
        comm.gather(ROOT, encode_words(&[goal])).await?;

        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let task = tokio::spawn(async move {
            let mut sent = 0u64;
            while rx.recv().await.is_some() {
                comm.send(ROOT, Tag::Progress, Bytes::new()).await?;
                sent += 1;
            }
            Ok(sent)
        });
        Ok(Self { tx, task })
    }

    pub fn handle(&self) -> ProgressHandle {
        ProgressHandle {
            tx: self.tx.clone(),
        }
    }

    /// Waits until every queued notification was sent.
    pub async fn finish(self) -> Result<u64, QueryError> {
        drop(self.tx);
        Ok(self.task.await??)
    }
}
