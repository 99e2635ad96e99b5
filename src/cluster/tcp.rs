use std::collections::HashMap;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cluster::communicator::Communicator;
use crate::cluster::errors::ChannelError;
use crate::cluster::mailbox::Mailbox;
use crate::cluster::message::{Envelope, Tag};

const LOG_TARGET: &str = "cluster::tcp";

const HELLO_MAGIC: u32 = 0x4644_4845;
const ABORT_FRAME: u8 = 0xFF;
const GOODBYE_FRAME: u8 = 0xFE;
const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// Which of the two per-job communicators a connection carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChannelKind {
    World = 0,
    Progress = 1,
}

impl ChannelKind {
    fn from_u8(raw: u8) -> Option<ChannelKind> {
        match raw {
            0 => Some(ChannelKind::World),
            1 => Some(ChannelKind::Progress),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConnectPolicy {
    pub retries: u32,
    pub backoff: Duration,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        Self {
            retries: 20,
            backoff: Duration::from_millis(250),
        }
    }
}

struct Peer {
    writer: Mutex<OwnedWriteHalf>,
}

/// Star-topology communicator over TCP. The coordinator holds one
/// connection per worker; workers hold a single connection to rank 0.
pub struct TcpCommunicator {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
    peers: HashMap<usize, Arc<Peer>>,
    readers: Vec<JoinHandle<()>>,
}

/// Both communicators of one job.
pub struct TcpChannels {
    pub world: TcpCommunicator,
    pub progress: TcpCommunicator,
}

pub struct TcpFabric;

impl TcpFabric {
    /// Coordinator side: waits for every worker to open its world and
    /// progress connections.
    pub async fn accept(listener: &TcpListener, size: usize) -> Result<TcpChannels, ChannelError> {
        let expected = size.saturating_sub(1);
        let mut world: HashMap<usize, TcpStream> = HashMap::new();
        let mut progress: HashMap<usize, TcpStream> = HashMap::new();

        while world.len() < expected || progress.len() < expected {
            let (mut stream, peer_addr) = listener.accept().await?;
            stream.set_nodelay(true)?;
            let (rank, kind) = read_hello(&mut stream, size).await?;
            let slot = match kind {
                ChannelKind::World => &mut world,
                ChannelKind::Progress => &mut progress,
            };
            if slot.insert(rank, stream).is_some() {
                return Err(ChannelError::Handshake(format!(
                    "rank {rank} connected twice on {kind:?} channel"
                )));
            }
            info!(target: LOG_TARGET, rank, channel = ?kind, %peer_addr, "Worker connected");
        }

        Ok(TcpChannels {
            world: TcpCommunicator::from_streams(0, size, world),
            progress: TcpCommunicator::from_streams(0, size, progress),
        })
    }

    /// Worker side: opens the world and progress connections to rank 0.
    pub async fn connect(
        addr: &str,
        rank: usize,
        size: usize,
        policy: ConnectPolicy,
    ) -> Result<TcpChannels, ChannelError> {
        if rank == 0 || rank >= size {
            return Err(ChannelError::Handshake(format!(
                "worker rank {rank} outside 1..{size}"
            )));
        }
        let mut channels = Vec::with_capacity(2);
        for kind in [ChannelKind::World, ChannelKind::Progress] {
            let mut stream = connect_with_retry(addr, policy).await?;
            stream.set_nodelay(true)?;
            write_hello(&mut stream, rank, size, kind).await?;
            channels.push(TcpCommunicator::from_streams(
                rank,
                size,
                HashMap::from([(0, stream)]),
            ));
        }
        debug!(target: LOG_TARGET, rank, %addr, "Connected to coordinator");

        let progress = channels.pop();
        let world = channels.pop();
        match (world, progress) {
            (Some(world), Some(progress)) => Ok(TcpChannels { world, progress }),
            _ => Err(ChannelError::Handshake("missing channel".to_string())),
        }
    }
}

impl TcpCommunicator {
    fn from_streams(rank: usize, size: usize, streams: HashMap<usize, TcpStream>) -> Self {
        let mailbox = Arc::new(Mailbox::new());
        let mut peers = HashMap::with_capacity(streams.len());
        let mut readers = Vec::with_capacity(streams.len());
        for (peer_rank, stream) in streams {
            let (read, write) = stream.into_split();
            readers.push(tokio::spawn(read_frames(
                peer_rank,
                read,
                Arc::clone(&mailbox),
            )));
            peers.insert(
                peer_rank,
                Arc::new(Peer {
                    writer: Mutex::new(write),
                }),
            );
        }
        Self {
            rank,
            size,
            mailbox,
            peers,
            readers,
        }
    }
}

impl Drop for TcpCommunicator {
    fn drop(&mut self) {
        for reader in &self.readers {
            reader.abort();
        }
    }
}

#[async_trait]
impl Communicator for TcpCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    async fn send(&self, dest: usize, tag: Tag, payload: Bytes) -> Result<(), ChannelError> {
        if dest == self.rank {
            return self.mailbox.deliver(Envelope {
                source: self.rank,
                tag,
                payload,
            });
        }
        let peer = self.peers.get(&dest).ok_or(ChannelError::Unreachable {
            dest,
            from: self.rank,
        })?;
        let mut writer = peer.writer.lock().await;
        write_frame(&mut *writer, tag as u8, &payload).await?;
        Ok(())
    }

    async fn recv(&self, tag: Tag, source: Option<usize>) -> Result<Envelope, ChannelError> {
        self.mailbox.take(tag, source).await
    }

    async fn abort(&self) {
        warn!(target: LOG_TARGET, rank = self.rank, "Aborting job channels");
        for peer in self.peers.values() {
            let mut writer = peer.writer.lock().await;
            let _ = writer.write_u8(ABORT_FRAME).await;
            let _ = writer.flush().await;
            let _ = writer.shutdown().await;
        }
        self.mailbox.abort(self.rank);
    }

    async fn close(&self) {
        debug!(target: LOG_TARGET, rank = self.rank, "Closing job channels");
        for peer in self.peers.values() {
            let mut writer = peer.writer.lock().await;
            let _ = writer.write_u8(GOODBYE_FRAME).await;
            let _ = writer.flush().await;
            let _ = writer.shutdown().await;
        }
    }
}

async fn connect_with_retry(addr: &str, policy: ConnectPolicy) -> Result<TcpStream, ChannelError> {
    let mut attempt = 0;
    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) if attempt < policy.retries => {
                attempt += 1;
                debug!(target: LOG_TARGET, %addr, attempt, error = %e, "Coordinator not reachable yet");
                tokio::time::sleep(policy.backoff).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

async fn write_hello<W: AsyncWrite + Unpin>(
    writer: &mut W,
    rank: usize,
    size: usize,
    kind: ChannelKind,
) -> Result<(), ChannelError> {
    writer.write_u32_le(HELLO_MAGIC).await?;
    writer.write_u32_le(rank as u32).await?;
    writer.write_u32_le(size as u32).await?;
    writer.write_u8(kind as u8).await?;
    writer.flush().await?;
    Ok(())
}

async fn read_hello<R: AsyncRead + Unpin>(
    reader: &mut R,
    size: usize,
) -> Result<(usize, ChannelKind), ChannelError> {
    if reader.read_u32_le().await? != HELLO_MAGIC {
        return Err(ChannelError::Handshake("bad hello magic".to_string()));
    }
    let rank = reader.read_u32_le().await? as usize;
    let peer_size = reader.read_u32_le().await? as usize;
    let raw_kind = reader.read_u8().await?;

    if peer_size != size {
        return Err(ChannelError::Handshake(format!(
            "rank {rank} expects {peer_size} ranks, coordinator runs {size}"
        )));
    }
    if rank == 0 || rank >= size {
        return Err(ChannelError::Handshake(format!(
            "rank {rank} outside 1..{size}"
        )));
    }
    let kind = ChannelKind::from_u8(raw_kind)
        .ok_or_else(|| ChannelError::Handshake(format!("unknown channel kind {raw_kind}")))?;
    Ok((rank, kind))
}

enum Frame {
    Message(Tag, Bytes),
    Abort,
    Goodbye,
}

async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    tag: u8,
    payload: &[u8],
) -> std::io::Result<()> {
    writer.write_u8(tag).await?;
    writer.write_u32_le(payload.len() as u32).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Frame>, ChannelError> {
    let raw_tag = match reader.read_u8().await {
        Ok(tag) => tag,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    match raw_tag {
        ABORT_FRAME => return Ok(Some(Frame::Abort)),
        GOODBYE_FRAME => return Ok(Some(Frame::Goodbye)),
        _ => {}
    }
    let tag = Tag::from_u8(raw_tag)
        .ok_or_else(|| ChannelError::Malformed(format!("unknown tag {raw_tag}")))?;
    let len = reader.read_u32_le().await?;
    if len > MAX_FRAME_LEN {
        return Err(ChannelError::Malformed(format!(
            "frame of {len} bytes exceeds limit"
        )));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(Some(Frame::Message(tag, Bytes::from(payload))))
}

/// A peer that hangs up without a goodbye frame crashed or was killed; the
/// job is aborted on its behalf.
async fn read_frames(source: usize, read: OwnedReadHalf, mailbox: Arc<Mailbox>) {
    let mut reader = BufReader::new(read);
    let mut said_goodbye = false;
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(Frame::Message(tag, payload))) => {
                if mailbox.deliver(Envelope { source, tag, payload }).is_err() {
                    break;
                }
            }
            Ok(Some(Frame::Abort)) => {
                warn!(target: LOG_TARGET, source, "Peer aborted the job");
                mailbox.abort(source);
                break;
            }
            Ok(Some(Frame::Goodbye)) => {
                said_goodbye = true;
            }
            Ok(None) if said_goodbye => {
                debug!(target: LOG_TARGET, source, "Peer closed connection");
                break;
            }
            Ok(None) => {
                error!(target: LOG_TARGET, source, "Peer disconnected without closing its channel");
                mailbox.abort(source);
                break;
            }
            Err(e) => {
                error!(target: LOG_TARGET, source, error = %e, "Connection failed");
                mailbox.abort(source);
                break;
            }
        }
    }
}
