pub mod communicator;
pub mod errors;
pub mod local;
pub mod mailbox;
pub mod message;
pub mod tcp;

pub use communicator::Communicator;
pub use errors::ChannelError;
pub use local::{LocalCommunicator, LocalFabric};
pub use message::{Envelope, Tag};

/// Rank of the coordinator on every communicator.
pub const ROOT: usize = 0;

#[cfg(test)]
mod mailbox_test;
