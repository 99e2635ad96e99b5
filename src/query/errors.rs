use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::cluster::ChannelError;
use crate::engine::EngineError;
use crate::query::buffer::FrameError;

/// Error taxonomy shared by every node of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Argument,
    Resource,
    Engine,
    Path,
    Channel,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Argument => "argument",
            ErrorKind::Resource => "resource",
            ErrorKind::Engine => "engine",
            ErrorKind::Path => "path",
            ErrorKind::Channel => "channel",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::Argument => 2,
            ErrorKind::Resource => 3,
            ErrorKind::Engine => 4,
            ErrorKind::Path => 5,
            ErrorKind::Channel => 6,
        }
    }
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("{0}")]
    Argument(String),

    #[error("{0}")]
    Resource(String),

    #[error("Output error: {0}")]
    Output(#[source] io::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("{}: {source}", path.display())]
    Path {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::Argument(_) => ErrorKind::Argument,
            QueryError::Resource(_) | QueryError::Output(_) => ErrorKind::Resource,
            QueryError::Engine(_) => ErrorKind::Engine,
            QueryError::Path { .. } => ErrorKind::Path,
            QueryError::Channel(_) | QueryError::Frame(_) => ErrorKind::Channel,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }

    /// Path and engine errors only spoil the file being read; every other
    /// kind aborts the job.
    pub fn is_file_local(&self) -> bool {
        matches!(self.kind(), ErrorKind::Path | ErrorKind::Engine)
    }

    /// Maps a failure to open an input file onto the taxonomy.
    pub fn from_open(path: PathBuf, err: EngineError) -> Self {
        match err {
            EngineError::Io(source) => QueryError::Path { path, source },
            other => QueryError::Engine(other),
        }
    }

    pub fn log_error(&self, rank: usize) {
        let kind = self.kind().as_str();
        match self {
            QueryError::Path { .. } => {
                warn!(target: "query::errors", rank, kind, "{}", self);
            }
            QueryError::Engine(e) => {
                error!(target: "query::errors", rank, kind, "{}", self);
                debug!(target: "query::errors", rank, "Engine error details: {:?}", e);
            }
            _ => error!(target: "query::errors", rank, kind, "{}", self),
        }
    }
}

impl From<tokio::task::JoinError> for QueryError {
    fn from(err: tokio::task::JoinError) -> Self {
        QueryError::Resource(format!("task failed: {err}"))
    }
}
