//! Durable per-partition commit log for a replicated message broker.
//!
//! Each [`TopicCommitLogMgr`] owns one append-only file of fixed size
//! [`CommitLogData`] records describing committed message batches. The
//! replication layer appends to it on the leader and on replicas, reads it for
//! catch-up and truncates it when a replica diverged from a new leader.

pub mod log;
pub mod message;
pub mod service;

pub use log::{CommitLogData, CommitLogFlusher, EpochType, TopicCommitLogMgr};
pub use message::TopicPartition;
pub use service::{
    setup_local_tracing, setup_tracing, AppConfig, AppError, AppResult, CommitLogConfig, Shutdown,
};
