use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::cluster::communicator::Communicator;
use crate::cluster::errors::ChannelError;
use crate::cluster::mailbox::Mailbox;
use crate::cluster::message::{Envelope, Tag};

/// In-process fabric: every rank is a task in the same process and messages
/// move through shared mailboxes without copying the payload.
pub struct LocalFabric;

impl LocalFabric {
    pub fn build(size: usize) -> Vec<LocalCommunicator> {
        let mailboxes: Arc<Vec<Arc<Mailbox>>> =
            Arc::new((0..size).map(|_| Arc::new(Mailbox::new())).collect());
        (0..size)
            .map(|rank| LocalCommunicator {
                rank,
                mailboxes: Arc::clone(&mailboxes),
            })
            .collect()
    }
}

#[derive(Clone)]
pub struct LocalCommunicator {
    rank: usize,
    mailboxes: Arc<Vec<Arc<Mailbox>>>,
}

#[async_trait]
impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.mailboxes.len()
    }

    async fn send(&self, dest: usize, tag: Tag, payload: Bytes) -> Result<(), ChannelError> {
        let mailbox = self.mailboxes.get(dest).ok_or(ChannelError::Unreachable {
            dest,
            from: self.rank,
        })?;
        mailbox.deliver(Envelope {
            source: self.rank,
            tag,
            payload,
        })
    }

    async fn recv(&self, tag: Tag, source: Option<usize>) -> Result<Envelope, ChannelError> {
        self.mailboxes[self.rank].take(tag, source).await
    }

    async fn abort(&self) {
        debug!(target: "cluster::local", rank = self.rank, "Aborting local fabric");
        for mailbox in self.mailboxes.iter() {
            mailbox.abort(self.rank);
        }
    }
}
