//! Append, flush and close of the commit log.

use std::sync::atomic::Ordering;

use tracing::{error, info, trace};

use super::{write_logs, CommitLogFile, TopicCommitLogMgr};
use crate::log::CommitLogData;
use crate::{AppError, AppResult};

impl TopicCommitLogMgr {
    /// Appends one entry to the log.
    ///
    /// `slave` marks an entry replicated from the leader, the local id counter then
    /// follows the leader's sequence instead of allocating on its own.
    ///
    /// The entry is written directly when buffering is disabled, otherwise it is
    /// buffered and the buffer is flushed first if it is full. The high-water mark
    /// moves to the entry's id once the entry is at least buffered.
    ///
    /// # Errors
    ///
    /// * `WrongLogId` if the id is not greater than the current high-water mark,
    ///   nothing is changed in that case
    /// * `Fatal` if flushing the full buffer failed
    pub fn append_commit_log(&self, log: &CommitLogData, slave: bool) -> AppResult<()> {
        self.check_log_id(log.log_id)?;

        let mut inner = self.inner.lock();
        // another appender may have moved the mark while we waited for the lock
        self.check_log_id(log.log_id)?;

        if self.buffer_capacity == 0 {
            self.write_direct_no_lock(&mut inner, log)?;
        } else {
            if inner.committed_logs.len() >= self.buffer_capacity {
                self.flush_commit_logs_no_lock(&mut inner)?;
            } else {
                inner.appender()?;
            }
            inner.committed_logs.push(*log);
        }

        if slave {
            self.n_log_id.store(log.log_id + 1, Ordering::Release);
        }
        self.p_log_id.store(log.log_id, Ordering::Release);
        self.with_logger(|| {
            trace!(
                "commit log:{} append log_id:{} slave:{}",
                self.topic_partition,
                log.log_id,
                slave
            )
        });
        Ok(())
    }

    /// Writes every buffered entry to the file.
    pub fn flush_commit_logs(&self) -> AppResult<()> {
        let mut inner = self.inner.lock();
        self.flush_commit_logs_no_lock(&mut inner)
    }

    /// Flushes and then syncs file data to stable storage, the log stays open.
    pub fn sync(&self) -> AppResult<()> {
        let mut inner = self.inner.lock();
        self.flush_commit_logs_no_lock(&mut inner)?;
        inner.appender()?.sync_data()?;
        Ok(())
    }

    /// Flushes, syncs and releases the file. Closing twice is a no-op.
    pub fn close(&self) -> AppResult<()> {
        let mut inner = self.inner.lock();
        if inner.appender.is_none() {
            return Ok(());
        }
        self.flush_commit_logs_no_lock(&mut inner)?;
        if let Some(appender) = inner.appender.take() {
            appender.sync_all()?;
        }
        self.with_logger(|| {
            info!(
                "commit log:{} closed at log_id:{}",
                self.topic_partition,
                self.get_last_commit_log_id()
            )
        });
        Ok(())
    }

    fn check_log_id(&self, log_id: i64) -> AppResult<()> {
        let committed = self.p_log_id.load(Ordering::Acquire);
        if log_id <= committed {
            return Err(AppError::WrongLogId { log_id, committed });
        }
        Ok(())
    }

    /// Unbuffered write. A failed write is rolled back to the previous file length
    /// so the file never ends in a partial record. If the rollback fails too the
    /// log is marked fatal.
    fn write_direct_no_lock(
        &self,
        inner: &mut CommitLogFile,
        log: &CommitLogData,
    ) -> AppResult<()> {
        let appender = inner.appender()?;
        let before = appender.metadata()?.len();
        let Err(e) = write_logs(appender, std::slice::from_ref(log)) else {
            return Ok(());
        };
        self.with_logger(|| {
            error!(
                "commit log:{} write log_id:{} error: {}",
                self.topic_partition, log.log_id, e
            )
        });
        if let Err(rollback) = appender.set_len(before) {
            let reason = format!(
                "roll back commit log {} to {} bytes failed: {}, write error: {}",
                self.topic_partition, before, rollback, e
            );
            self.with_logger(|| error!("{}", reason));
            inner.fatal = Some(reason.clone());
            return Err(AppError::Fatal(reason));
        }
        Err(e.into())
    }

    /// Writes the buffered entries in order and clears the buffer.
    ///
    /// A write error leaves the file and the buffer in an unknown relation, the log
    /// is marked fatal and keeps the buffer so no entry is reported durable.
    pub(super) fn flush_commit_logs_no_lock(&self, inner: &mut CommitLogFile) -> AppResult<()> {
        let appender = inner.appender()?;
        if inner.committed_logs.is_empty() {
            return Ok(());
        }

        if let Err(e) = write_logs(appender, &inner.committed_logs) {
            let reason = format!(
                "flush {} entries of commit log {} failed: {}",
                inner.committed_logs.len(),
                self.topic_partition,
                e
            );
            self.with_logger(|| error!("{}", reason));
            inner.fatal = Some(reason.clone());
            return Err(AppError::Fatal(reason));
        }
        self.with_logger(|| {
            trace!(
                "commit log:{} flushed {} entries",
                self.topic_partition,
                inner.committed_logs.len()
            )
        });
        inner.committed_logs.clear();
        Ok(())
    }
}
