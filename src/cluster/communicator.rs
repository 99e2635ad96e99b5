use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::cluster::errors::ChannelError;
use crate::cluster::message::{Envelope, Tag};

/// Rank-addressed, tag-demultiplexed message channel shared by a fixed set of
/// processes. Rank 0 is the coordinator. Point-to-point ordering between a
/// pair of ranks is preserved per tag.
#[async_trait]
pub trait Communicator: Send + Sync {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    async fn send(&self, dest: usize, tag: Tag, payload: Bytes) -> Result<(), ChannelError>;

    /// Receives the next message with `tag`, from `source` or from any rank.
    async fn recv(&self, tag: Tag, source: Option<usize>) -> Result<Envelope, ChannelError>;

    /// Tears the channel down for every rank. Pending and future receives
    /// fail with `ChannelError::Aborted`.
    async fn abort(&self);

    /// Announces a clean end of the job to every peer. Fabrics that can
    /// lose a peer treat a disconnect without it as an abort.
    async fn close(&self) {}

    async fn recv_timeout(
        &self,
        tag: Tag,
        source: Option<usize>,
        timeout: Option<Duration>,
    ) -> Result<Envelope, ChannelError> {
        match timeout {
            None => self.recv(tag, source).await,
            Some(limit) => tokio::time::timeout(limit, self.recv(tag, source))
                .await
                .map_err(|_| ChannelError::Timeout(tag))?,
        }
    }

    /// Star broadcast from `root`. The root passes `Some(payload)`, every
    /// other rank passes `None` and gets the root's payload back.
    async fn broadcast(&self, root: usize, payload: Option<Bytes>) -> Result<Bytes, ChannelError> {
        if self.rank() != root {
            return Ok(self.recv(Tag::Broadcast, Some(root)).await?.payload);
        }
        let payload = payload.ok_or_else(|| {
            ChannelError::Malformed("broadcast root supplied no payload".to_string())
        })?;
        for dest in (0..self.size()).filter(|&r| r != root) {
            self.send(dest, Tag::Broadcast, payload.clone()).await?;
        }
        Ok(payload)
    }

    /// Broadcast preceded by an 8-byte length message, so receivers can
    /// verify the payload they get.
    async fn broadcast_sized(
        &self,
        root: usize,
        payload: Option<Bytes>,
    ) -> Result<Bytes, ChannelError> {
        let len = payload
            .as_ref()
            .map(|p| Bytes::copy_from_slice(&(p.len() as u64).to_le_bytes()));
        let announced = decode_u64(&self.broadcast(root, len).await?)?;
        let data = self.broadcast(root, payload).await?;
        if data.len() as u64 != announced {
            return Err(ChannelError::Malformed(format!(
                "broadcast announced {} bytes but delivered {}",
                announced,
                data.len()
            )));
        }
        Ok(data)
    }

    /// Collects one payload from every rank at `root`, indexed by rank.
    async fn gather(&self, root: usize, payload: Bytes) -> Result<Option<Vec<Bytes>>, ChannelError> {
        if self.rank() != root {
            self.send(root, Tag::Gather, payload).await?;
            return Ok(None);
        }
        let mut out = vec![Bytes::new(); self.size()];
        out[root] = payload;
        for source in (0..self.size()).filter(|&r| r != root) {
            out[source] = self.recv(Tag::Gather, Some(source)).await?.payload;
        }
        Ok(Some(out))
    }

    /// Element-wise sum of equally sized counter vectors, result at `root`.
    async fn reduce_sum(&self, root: usize, values: &[u64]) -> Result<Option<Vec<u64>>, ChannelError> {
        let gathered = self.gather(root, encode_words(values)).await?;
        let Some(parts) = gathered else {
            return Ok(None);
        };
        let mut total = vec![0u64; values.len()];
        for part in parts {
            let words = decode_words(&part)?;
            if words.len() != total.len() {
                return Err(ChannelError::Malformed(format!(
                    "reduction expected {} values, got {}",
                    total.len(),
                    words.len()
                )));
            }
            for (acc, v) in total.iter_mut().zip(words) {
                *acc = acc.wrapping_add(v);
            }
        }
        Ok(Some(total))
    }
}

pub fn encode_words(values: &[u64]) -> Bytes {
    let mut buf = Vec::with_capacity(values.len() * 8);
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    Bytes::from(buf)
}

pub fn decode_words(bytes: &[u8]) -> Result<Vec<u64>, ChannelError> {
    if bytes.len() % 8 != 0 {
        return Err(ChannelError::Malformed(format!(
            "word payload of {} bytes is not a multiple of 8",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|c| {
            let mut word = [0u8; 8];
            word.copy_from_slice(c);
            u64::from_le_bytes(word)
        })
        .collect())
}

pub fn decode_u64(bytes: &[u8]) -> Result<u64, ChannelError> {
    match decode_words(bytes)?.as_slice() {
        [v] => Ok(*v),
        other => Err(ChannelError::Malformed(format!(
            "expected a single word, got {}",
            other.len()
        ))),
    }
}
