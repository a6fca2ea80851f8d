//! Commit log management for a single topic partition.
//!
//! This module provides:
//! - The fixed size binary commit log record
//! - Partition namespaced log id allocation and recovery on open
//! - Buffered append with flush on demand
//! - Offset indexed reads, backward reconciliation scan and truncation
//! - A background task flushing logs on an interval

mod commit_log;
mod commit_log_data;
mod flusher;

// Re-exports
pub use commit_log::TopicCommitLogMgr;
pub use commit_log_data::{
    get_next_log_offset, get_prev_log_offset, log_data_size, CommitLogData, EpochType,
};
pub use flusher::CommitLogFlusher;

/// Default number of entries buffered in memory before they are written.
pub const DEFAULT_COMMIT_BUF_SIZE: usize = 1024;

/// Low bits of a log id holding the per partition sequence.
pub const MAX_INCR_ID_BIT: u32 = 50;

/// Partitions must stay below this so the namespaced id fits in an `i64`.
pub const MAX_PARTITION_NUM: i64 = 1 << (63 - MAX_INCR_ID_BIT);

/// Distance between the last recovered id and the next allocated one after a restart.
pub const RECOVERY_ID_GAP: i64 = 100;

pub const COMMIT_LOG_FILE_SUFFIX: &str = ".commit.log";

const SEQUENCE_MASK: i64 = (1 << MAX_INCR_ID_BIT) - 1;

/// Combines a partition and a per partition sequence into a log id.
pub fn make_log_id(partition: i32, sequence: i64) -> i64 {
    ((partition as i64) << MAX_INCR_ID_BIT) + sequence
}

pub fn partition_of(log_id: i64) -> i32 {
    (log_id >> MAX_INCR_ID_BIT) as i32
}

pub fn sequence_of(log_id: i64) -> i64 {
    log_id & SEQUENCE_MASK
}
