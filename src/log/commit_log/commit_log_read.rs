//! Offset indexed reads, reconciliation scan and truncation.
//!
//! Every operation here except [`TopicCommitLogMgr::get_commit_logs_reverse`]
//! flushes the buffer first and then works on the file alone.

use std::sync::atomic::Ordering;

use tracing::{info, warn};

use super::{check_offset_aligned, CommitLogFile, TopicCommitLogMgr};
use crate::log::{log_data_size, CommitLogData};
use crate::{AppError, AppResult};

impl TopicCommitLogMgr {
    /// Reads the entry stored at byte `offset`.
    ///
    /// Returns `Ok(None)` when `offset` is exactly the end of the log.
    ///
    /// # Errors
    ///
    /// * `OffsetOutOfBound` if `offset` is past the end of the log
    /// * `OffsetInvalid` if `offset` is negative or not at a slot boundary
    pub fn get_commit_log_from_offset(&self, offset: i64) -> AppResult<Option<CommitLogData>> {
        let mut inner = self.inner.lock();
        self.get_commit_log_from_offset_no_lock(&mut inner, offset)
    }

    fn get_commit_log_from_offset_no_lock(
        &self,
        inner: &mut CommitLogFile,
        offset: i64,
    ) -> AppResult<Option<CommitLogData>> {
        self.flush_commit_logs_no_lock(inner)?;
        let fsize = inner.file_size()?;
        if offset == fsize {
            return Ok(None);
        }
        if offset > fsize {
            return Err(AppError::OffsetOutOfBound {
                offset,
                file_size: fsize,
            });
        }
        check_offset_aligned(offset)?;
        inner.read_log(offset).map(Some)
    }

    /// Reads up to `count` entries starting at byte `start_offset`.
    ///
    /// The result is shorter than `count` near the end of the log and empty when
    /// `start_offset` is the end of the log.
    pub fn get_commit_logs(
        &self,
        start_offset: i64,
        count: usize,
    ) -> AppResult<Vec<CommitLogData>> {
        let mut inner = self.inner.lock();
        self.flush_commit_logs_no_lock(&mut inner)?;
        let fsize = inner.file_size()?;
        if start_offset < 0 {
            return Err(AppError::OffsetInvalid(start_offset));
        }
        if start_offset == fsize {
            return Ok(Vec::new());
        }
        if start_offset > fsize - log_data_size() {
            return Err(AppError::OffsetOutOfBound {
                offset: start_offset,
                file_size: fsize,
            });
        }
        check_offset_aligned(start_offset)?;

        let remaining = ((fsize - start_offset) / log_data_size()) as usize;
        inner.read_logs(start_offset, count.min(remaining))
    }

    /// Reads up to `count` entries walking backward from logical index `start_index`,
    /// where index 0 is the newest entry. Results are newest first.
    ///
    /// Buffered entries are served first, then the file is read backward from its
    /// end. The buffer is not flushed.
    pub fn get_commit_logs_reverse(
        &self,
        start_index: usize,
        count: usize,
    ) -> AppResult<Vec<CommitLogData>> {
        let inner = self.inner.lock();
        let file_slots = inner.file_size()? / log_data_size();
        let buffered = inner.committed_logs.len();
        let total = buffered.saturating_add(usize::try_from(file_slots).unwrap_or(usize::MAX));
        let count = count.min(total.saturating_sub(start_index));
        let mut ret = Vec::with_capacity(count);
        if count == 0 {
            return Ok(ret);
        }

        for i in start_index..buffered {
            ret.push(inner.committed_logs[buffered - i - 1]);
            if ret.len() >= count {
                return Ok(ret);
            }
        }

        // the buffered entries come right after the end of file
        let file_skip = i64::try_from(start_index.saturating_sub(buffered)).unwrap_or(i64::MAX);
        let end_slot = file_slots.saturating_sub(file_skip);
        if end_slot <= 0 {
            return Ok(ret);
        }
        let need = i64::try_from(count - ret.len()).unwrap_or(i64::MAX);
        let start_slot = end_slot.saturating_sub(need).max(0);
        let mut logs =
            inner.read_logs(start_slot * log_data_size(), (end_slot - start_slot) as usize)?;
        logs.reverse();
        ret.extend(logs);
        Ok(ret)
    }

    /// Finds the byte offset of the entry whose id equals the high-water mark.
    ///
    /// Walks backward from the last slot. An empty log reports offset 0.
    ///
    /// # Errors
    ///
    /// `LogIdNotFound` if the walk passes below the high-water mark or the start of
    /// the file without a match, the in-memory state and the file disagree.
    pub fn get_last_log_offset(&self) -> AppResult<i64> {
        let mut inner = self.inner.lock();
        self.flush_commit_logs_no_lock(&mut inner)?;
        let fsize = inner.file_size()?;
        if fsize == 0 {
            return Ok(0);
        }

        let last_log_id = self.p_log_id.load(Ordering::Acquire);
        let mut offset = (fsize / log_data_size() - 1) * log_data_size();
        while offset >= 0 {
            let log = inner.read_log(offset)?;
            if log.log_id == last_log_id {
                return Ok(offset);
            } else if log.log_id < last_log_id {
                break;
            }
            offset -= log_data_size();
        }

        self.with_logger(|| {
            warn!(
                "commit log:{} last log_id:{} not found on file of {} bytes",
                self.topic_partition, last_log_id, fsize
            )
        });
        Err(AppError::LogIdNotFound(last_log_id))
    }

    /// Cuts the log at byte `offset` and rolls the high-water mark back to the entry
    /// now at the end of the file.
    ///
    /// Returns that entry, or `None` when the log was truncated to empty.
    pub fn truncate_to_offset(&self, offset: i64) -> AppResult<Option<CommitLogData>> {
        let mut inner = self.inner.lock();
        self.flush_commit_logs_no_lock(&mut inner)?;
        let fsize = inner.file_size()?;
        check_offset_aligned(offset)?;
        if offset > fsize {
            return Err(AppError::OffsetOutOfBound {
                offset,
                file_size: fsize,
            });
        }

        inner.appender()?.set_len(offset as u64)?;
        self.with_logger(|| {
            info!(
                "commit log:{} truncated from {} to {}",
                self.topic_partition, fsize, offset
            )
        });

        if offset == 0 {
            self.p_log_id.store(0, Ordering::Release);
            return Ok(None);
        }
        let log = inner.read_log(offset - log_data_size())?;
        self.p_log_id.store(log.log_id, Ordering::Release);
        Ok(Some(log))
    }
}
