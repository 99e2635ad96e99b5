use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Capacity of one record buffer and therefore the largest data message.
pub const RECORD_BUFFER_CAPACITY: usize = 1024 * 1024;

/// Every framed record starts with its length as a little-endian u32.
pub const FRAME_HEADER_LEN: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("Record of {len} bytes cannot fit into a {capacity}-byte buffer")]
    TooLarge { len: usize, capacity: usize },

    #[error("Empty record frame at offset {0}")]
    EmptyRecord(usize),

    #[error("Truncated frame header at offset {0}")]
    TruncatedHeader(usize),

    #[error("Frame at offset {offset} declares {len} bytes, only {remaining} remain")]
    TruncatedPayload {
        offset: usize,
        len: usize,
        remaining: usize,
    },
}

/// Fixed-capacity sequence of `[u32 len][record]` entries.
#[derive(Debug)]
pub struct RecordBuffer {
    data: BytesMut,
    capacity: usize,
    records: usize,
}

impl RecordBuffer {
    pub fn new() -> Self {
        Self::with_capacity(RECORD_BUFFER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            capacity,
            records: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn records(&self) -> usize {
        self.records
    }

    /// Appends one framed record. Returns `false` without touching the
    /// buffer when the entry does not fit in the remaining space; entries
    /// are never split.
    pub fn try_push(&mut self, record: &[u8]) -> Result<bool, FrameError> {
        let needed = FRAME_HEADER_LEN + record.len();
        if needed > self.capacity {
            return Err(FrameError::TooLarge {
                len: record.len(),
                capacity: self.capacity,
            });
        }
        if record.is_empty() {
            return Err(FrameError::EmptyRecord(self.data.len()));
        }
        if self.data.len() + needed > self.capacity {
            return Ok(false);
        }
        self.data.put_u32_le(record.len() as u32);
        self.data.extend_from_slice(record);
        self.records += 1;
        Ok(true)
    }

    /// Hands the filled bytes to a sender and leaves the buffer empty.
    pub fn take(&mut self) -> Bytes {
        self.records = 0;
        self.data.split().freeze()
    }

    /// Prepares the buffer for refilling once its last send completed. The
    /// original allocation is reused when the sent bytes are no longer shared.
    pub fn reclaim(&mut self) {
        self.data.clear();
        self.records = 0;
        self.data.reserve(self.capacity);
    }
}

impl Default for RecordBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    Stored,
    Full,
}

/// Two record buffers: one being filled, one owned by the send in flight.
#[derive(Debug)]
pub struct DoubleBuffer {
    active: RecordBuffer,
    inflight: RecordBuffer,
}

impl DoubleBuffer {
    pub fn new() -> Self {
        Self::with_capacity(RECORD_BUFFER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            active: RecordBuffer::with_capacity(capacity),
            inflight: RecordBuffer::with_capacity(capacity),
        }
    }

    pub fn fill(&mut self, record: &[u8]) -> Result<FillOutcome, FrameError> {
        if self.active.try_push(record)? {
            Ok(FillOutcome::Stored)
        } else {
            Ok(FillOutcome::Full)
        }
    }

    pub fn capacity(&self) -> usize {
        self.active.capacity()
    }

    pub fn has_pending(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn pending_records(&self) -> usize {
        self.active.records()
    }

    /// Swaps roles and returns the bytes to send. The caller must have
    /// completed the previous send, because the old inflight buffer becomes
    /// the new active one.
    pub fn take_for_send(&mut self) -> Bytes {
        std::mem::swap(&mut self.active, &mut self.inflight);
        self.active.reclaim();
        self.inflight.take()
    }
}

impl Default for DoubleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Walks the framed records of one received message.
pub struct FrameIter<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> FrameIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }
}

impl<'a> Iterator for FrameIter<'a> {
    type Item = Result<&'a [u8], FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.data.len() - self.offset;
        if remaining == 0 {
            return None;
        }
        let offset = self.offset;
        if remaining < FRAME_HEADER_LEN {
            self.offset = self.data.len();
            return Some(Err(FrameError::TruncatedHeader(offset)));
        }

        let mut len_bytes = [0u8; FRAME_HEADER_LEN];
        len_bytes.copy_from_slice(&self.data[offset..offset + FRAME_HEADER_LEN]);
        let len = u32::from_le_bytes(len_bytes) as usize;
        let start = offset + FRAME_HEADER_LEN;

        if len == 0 {
            self.offset = self.data.len();
            return Some(Err(FrameError::EmptyRecord(offset)));
        }
        if len > self.data.len() - start {
            self.offset = self.data.len();
            return Some(Err(FrameError::TruncatedPayload {
                offset,
                len,
                remaining: self.data.len() - start,
            }));
        }

        self.offset = start + len;
        Some(Ok(&self.data[start..start + len]))
    }
}
