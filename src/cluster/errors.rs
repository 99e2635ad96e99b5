use std::io;
use thiserror::Error;

use crate::cluster::message::Tag;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel closed")]
    Closed,

    #[error("Job aborted by rank {0}")]
    Aborted(usize),

    #[error("Rank {dest} is not reachable from rank {from}")]
    Unreachable { dest: usize, from: usize },

    #[error("Timed out waiting for {0} message")]
    Timeout(Tag),

    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
