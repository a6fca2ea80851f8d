//! Fixed size commit log record.
//!
//! Layout on disk, big-endian, no padding:
//!
//! ```text
//! log_id(8) + epoch(8) + msg_offset(8) + msg_size(4) + msg_cnt(8) = 36 bytes
//! ```
//!
//! The log file carries no header, so a slot index maps to a byte offset by
//! multiplying with [`CommitLogData::SIZE`].

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{AppError, AppResult};

/// Leader term under which an entry was committed.
pub type EpochType = i64;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommitLogData {
    pub log_id: i64,
    /// epoch for the topic leader
    pub epoch: EpochType,
    pub msg_offset: i64,
    /// size for batch messages
    pub msg_size: i32,
    /// the total message count for all from begin, not only this batch
    pub msg_cnt: i64,
}

impl CommitLogData {
    pub const SIZE: usize = std::mem::size_of::<i64>()
        + std::mem::size_of::<EpochType>()
        + std::mem::size_of::<i64>()
        + std::mem::size_of::<i32>()
        + std::mem::size_of::<i64>();

    pub fn new(
        log_id: i64,
        epoch: EpochType,
        msg_offset: i64,
        msg_size: i32,
        msg_cnt: i64,
    ) -> Self {
        Self {
            log_id,
            epoch,
            msg_offset,
            msg_size,
            msg_cnt,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(Self::SIZE);
        buf.put_i64(self.log_id);
        buf.put_i64(self.epoch);
        buf.put_i64(self.msg_offset);
        buf.put_i32(self.msg_size);
        buf.put_i64(self.msg_cnt);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decodes one record from the front of `buf`.
    pub fn decode(mut buf: &[u8]) -> AppResult<Self> {
        if buf.remaining() < Self::SIZE {
            return Err(AppError::CorruptRecord(format!(
                "need {} bytes, only {} available",
                Self::SIZE,
                buf.remaining()
            )));
        }
        Ok(Self {
            log_id: buf.get_i64(),
            epoch: buf.get_i64(),
            msg_offset: buf.get_i64(),
            msg_size: buf.get_i32(),
            msg_cnt: buf.get_i64(),
        })
    }

    /// Decodes a run of contiguous records, `buf.len()` must be a multiple of [`Self::SIZE`].
    pub fn decode_all(buf: &[u8]) -> AppResult<Vec<Self>> {
        if buf.len() % Self::SIZE != 0 {
            return Err(AppError::CorruptRecord(format!(
                "{} bytes is not a whole number of records",
                buf.len()
            )));
        }
        buf.chunks_exact(Self::SIZE).map(Self::decode).collect()
    }
}

/// Record size as a file offset quantity.
#[inline]
pub fn log_data_size() -> i64 {
    CommitLogData::SIZE as i64
}

pub fn get_prev_log_offset(cur: i64) -> i64 {
    cur - log_data_size()
}

pub fn get_next_log_offset(cur: i64) -> i64 {
    cur + log_data_size()
}
