// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Commit log manager for one topic partition.
//!
//! The log file is a dense array of [`CommitLogData`] slots opened in append
//! mode. Appends are buffered in memory up to a configured capacity, every
//! read flushes the buffer first so readers always see a whole-file view.
//!
//! Locking:
//! - `n_log_id` and `p_log_id` are plain atomics, read and written without the lock
//! - the buffer, the file handle and the fatal state sit behind one mutex, all
//!   blocking file I/O happens while holding it
mod commit_log_load;
mod commit_log_read;
mod commit_log_write;

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use bytes::BytesMut;
use parking_lot::Mutex;
use tracing::Dispatch;

use crate::log::{log_data_size, CommitLogData};
use crate::message::TopicPartition;
use crate::{AppError, AppResult};

/// Commit log of a single topic partition.
///
/// Shared between the replication paths as `Arc<TopicCommitLogMgr>`.
#[derive(Debug)]
pub struct TopicCommitLogMgr {
    topic_partition: TopicPartition,
    path: PathBuf,
    /// Buffer capacity in entries, 0 writes every append straight to the file
    buffer_capacity: usize,
    /// Next log id handed out by `next_id`
    n_log_id: AtomicI64,
    /// Id of the last committed entry, flushed or still buffered
    p_log_id: AtomicI64,
    inner: Mutex<CommitLogFile>,
    /// Diagnostics sink, `Dispatch::none()` unless one is injected
    logger: Dispatch,
}

/// State guarded by the manager's lock.
#[derive(Debug)]
struct CommitLogFile {
    /// `None` once the log is closed
    appender: Option<File>,
    committed_logs: Vec<CommitLogData>,
    /// Set when a flush failed half way, the file and the buffer no longer agree
    fatal: Option<String>,
}

impl CommitLogFile {
    fn new(appender: File, buffer_capacity: usize) -> Self {
        Self {
            appender: Some(appender),
            committed_logs: Vec::with_capacity(buffer_capacity),
            fatal: None,
        }
    }

    fn appender(&self) -> AppResult<&File> {
        if let Some(reason) = &self.fatal {
            return Err(AppError::Fatal(reason.clone()));
        }
        self.appender
            .as_ref()
            .ok_or_else(|| AppError::IllegalStateError("commit log is closed".to_string()))
    }

    fn file_size(&self) -> AppResult<i64> {
        Ok(self.appender()?.metadata()?.len() as i64)
    }

    fn read_log(&self, offset: i64) -> AppResult<CommitLogData> {
        let mut buf = [0u8; CommitLogData::SIZE];
        read_exact_at(self.appender()?, &mut buf, offset as u64)?;
        CommitLogData::decode(&buf)
    }

    /// Reads `count` contiguous slots starting at `offset`, oldest first.
    fn read_logs(&self, offset: i64, count: usize) -> AppResult<Vec<CommitLogData>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut buf = vec![0u8; count * CommitLogData::SIZE];
        read_exact_at(self.appender()?, &mut buf, offset as u64)?;
        CommitLogData::decode_all(&buf)
    }
}

impl TopicCommitLogMgr {
    pub fn topic_partition(&self) -> &TopicPartition {
        &self.topic_partition
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    /// Allocates the next log id. Only the leader allocates ids.
    pub fn next_id(&self) -> i64 {
        self.n_log_id.fetch_add(1, Ordering::AcqRel)
    }

    /// Makes `id` the next value returned by [`Self::next_id`].
    pub fn reset(&self, id: i64) {
        let prev = self.n_log_id.swap(id, Ordering::AcqRel);
        self.with_logger(|| {
            tracing::debug!(
                "commit log {} next id reset from {} to {}",
                self.topic_partition,
                prev,
                id
            )
        });
    }

    pub fn get_last_commit_log_id(&self) -> i64 {
        self.p_log_id.load(Ordering::Acquire)
    }

    pub fn is_committed(&self, id: i64) -> bool {
        self.p_log_id.load(Ordering::Acquire) == id
    }

    /// Bytes currently on file, buffered entries not included.
    pub fn file_size(&self) -> AppResult<i64> {
        self.inner.lock().file_size()
    }

    /// Number of entries waiting in the buffer.
    pub fn pending_count(&self) -> usize {
        self.inner.lock().committed_logs.len()
    }

    fn with_logger<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.logger, f)
    }
}

impl Drop for TopicCommitLogMgr {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if inner.appender.is_none() || inner.fatal.is_some() || inner.committed_logs.is_empty() {
            return;
        }
        let logger = &self.logger;
        let tp = &self.topic_partition;
        let result = inner
            .appender()
            .and_then(|file| write_logs(file, &inner.committed_logs).map_err(AppError::from));
        match result {
            Ok(()) => inner.committed_logs.clear(),
            Err(e) => tracing::dispatcher::with_default(logger, || {
                tracing::error!("commit log {} dropped with unflushed entries: {}", tp, e)
            }),
        }
    }
}

/// Offsets handed to the log must address the start of a slot.
fn check_offset_aligned(offset: i64) -> AppResult<()> {
    if offset < 0 || offset % log_data_size() != 0 {
        return Err(AppError::OffsetInvalid(offset));
    }
    Ok(())
}

/// Encodes `logs` into one buffer and appends it to the file.
fn write_logs(file: &File, logs: &[CommitLogData]) -> io::Result<()> {
    let mut buf = BytesMut::with_capacity(logs.len() * CommitLogData::SIZE);
    for log in logs {
        log.encode(&mut buf);
    }
    let mut writer = file;
    writer.write_all(&buf)
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ))
            }
            Ok(n) => {
                buf = &mut std::mem::take(&mut buf)[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
