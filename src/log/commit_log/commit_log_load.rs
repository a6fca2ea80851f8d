use std::fs::OpenOptions;
use std::sync::atomic::AtomicI64;

use parking_lot::Mutex;
use tracing::{info, warn, Dispatch};

use super::{CommitLogFile, TopicCommitLogMgr};
use crate::log::{log_data_size, make_log_id, MAX_PARTITION_NUM, RECOVERY_ID_GAP};
use crate::message::TopicPartition;
use crate::{AppError, AppResult, CommitLogConfig};

impl TopicCommitLogMgr {
    /// Opens or creates the commit log of `topic_partition` under `config.base_dir`.
    ///
    /// Diagnostics are discarded, use [`Self::open_with_logger`] to receive them.
    pub fn open(topic_partition: TopicPartition, config: &CommitLogConfig) -> AppResult<Self> {
        Self::open_with_logger(topic_partition, config, Dispatch::none())
    }

    /// Opens or creates the commit log and recovers the id counters from its tail.
    ///
    /// # Arguments
    ///
    /// * `topic_partition` - partition owning the log, also picks the id namespace
    /// * `config` - base directory and buffer capacity
    /// * `logger` - where the log's own diagnostics go
    ///
    /// # Errors
    ///
    /// * `PartitionExceeded` if the partition does not fit in the id namespace
    /// * I/O errors while creating, opening or reading the file
    pub fn open_with_logger(
        topic_partition: TopicPartition,
        config: &CommitLogConfig,
        logger: Dispatch,
    ) -> AppResult<Self> {
        let partition = topic_partition.partition;
        if partition < 0 || partition as i64 >= MAX_PARTITION_NUM {
            return Err(AppError::PartitionExceeded(partition));
        }

        std::fs::create_dir_all(&config.base_dir).map_err(|e| {
            AppError::DetailedIoError(format!(
                "create commit log dir: {} error: {}",
                config.base_dir, e
            ))
        })?;
        let path = topic_partition.commit_log_path(&config.base_dir);

        // append mode keeps every write at the end of file, random reads don't move it
        let appender = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .map_err(|e| {
                AppError::DetailedIoError(format!(
                    "open commit log file: {} error: {}",
                    path.display(),
                    e
                ))
            })?;
        let file = CommitLogFile::new(appender, config.commit_buffer_size);

        let (p_log_id, n_log_id) = tracing::dispatcher::with_default(&logger, || {
            Self::recover_log_ids(&topic_partition, &file)
        })?;

        let mgr = TopicCommitLogMgr {
            topic_partition,
            path,
            buffer_capacity: config.commit_buffer_size,
            n_log_id: AtomicI64::new(n_log_id),
            p_log_id: AtomicI64::new(p_log_id),
            inner: Mutex::new(file),
            logger,
        };
        mgr.with_logger(|| {
            info!(
                "load commit log:{} path:{} last_log_id:{} next_log_id:{} buffer:{}",
                mgr.topic_partition,
                mgr.path.display(),
                p_log_id,
                n_log_id,
                mgr.buffer_capacity
            )
        });
        Ok(mgr)
    }

    /// Returns `(p_log_id, n_log_id)` from the last whole record on file.
    fn recover_log_ids(
        topic_partition: &TopicPartition,
        file: &CommitLogFile,
    ) -> AppResult<(i64, i64)> {
        let mut fsize = file.file_size()?;
        let torn = fsize % log_data_size();
        if torn != 0 {
            // a crash in the middle of a write leaves a partial slot behind
            warn!(
                "commit log:{} has {} trailing bytes of a partial record, truncate to {}",
                topic_partition,
                torn,
                fsize - torn
            );
            fsize -= torn;
            file.appender()?.set_len(fsize as u64)?;
        }

        if fsize == 0 {
            return Ok((0, make_log_id(topic_partition.partition, 1)));
        }
        let last = file.read_log(fsize - log_data_size())?;
        Ok((last.log_id, last.log_id + RECOVERY_ID_GAP))
    }
}
