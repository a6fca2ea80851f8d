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

//! Background flush task for commit logs.
//!
//! Buffered entries only reach the file when the buffer fills up or a reader
//! forces a flush. The flusher bounds how long an entry can stay in memory by
//! flushing every registered log on an interval, and closes all of them once
//! the shutdown signal arrives.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{error, info, trace};

use crate::log::TopicCommitLogMgr;
use crate::message::TopicPartition;
use crate::{AppError, AppResult, Shutdown};

#[derive(Debug, Default)]
pub struct CommitLogFlusher {
    logs: RwLock<Vec<Arc<TopicCommitLogMgr>>>,
}

impl CommitLogFlusher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, log: Arc<TopicCommitLogMgr>) {
        info!(
            "commit log flusher register topic-partition:{}",
            log.topic_partition()
        );
        self.logs.write().push(log);
    }

    /// Removes the log of `topic_partition`, typically when its partition is unloaded.
    pub fn unregister(&self, topic_partition: &TopicPartition) -> Option<Arc<TopicCommitLogMgr>> {
        let mut logs = self.logs.write();
        let pos = logs
            .iter()
            .position(|log| log.topic_partition() == topic_partition)?;
        info!(
            "commit log flusher unregister topic-partition:{}",
            topic_partition
        );
        Some(logs.remove(pos))
    }

    pub fn len(&self) -> usize {
        self.logs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.read().is_empty()
    }

    /// Flushes every registered log on each tick until shutdown, then closes them.
    ///
    /// A log that fails to flush is dropped from the registry, the others are
    /// still served.
    ///
    /// # Errors
    ///
    /// Returns the first close error once every log has been closed.
    pub async fn flush_task(
        &self,
        mut interval: Interval,
        mut shutdown: Shutdown,
    ) -> AppResult<()> {
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                // 第一次 tick 会马上结束
                _ = interval.tick() => { trace!("commit log flush tick"); }
                _ = shutdown.recv() => { trace!("commit log flusher receiving shutdown signal"); }
            }
            if shutdown.is_shutdown() {
                let failed = self.run_blocking(|log| log.close(), "close").await?;
                return match failed.into_iter().next() {
                    Some((_, e)) => Err(e),
                    None => Ok(()),
                };
            }
            let failed = self
                .run_blocking(|log| log.flush_commit_logs(), "flush")
                .await?;
            // closed or fatal, neither can be flushed again
            for (topic_partition, _) in failed {
                self.unregister(&topic_partition);
            }
        }
    }

    /// Runs `op` on a snapshot of the registered logs off the async worker threads
    /// and returns the logs it failed on.
    async fn run_blocking(
        &self,
        op: fn(&TopicCommitLogMgr) -> AppResult<()>,
        op_name: &'static str,
    ) -> AppResult<Vec<(TopicPartition, AppError)>> {
        let logs = self.logs.read().clone();
        tokio::task::spawn_blocking(move || {
            let mut failed = Vec::new();
            for log in logs.iter() {
                if let Err(e) = op(log) {
                    error!(
                        "commit log {} of topic-partition:{} error: {}",
                        op_name,
                        log.topic_partition(),
                        e
                    );
                    failed.push((log.topic_partition().clone(), e));
                }
            }
            if op_name == "close" {
                info!(
                    "commit log flusher closed {} logs, {} failed",
                    logs.len(),
                    failed.len()
                );
            }
            failed
        })
        .await
        .map_err(|e| AppError::IllegalStateError(format!("commit log {} task: {}", op_name, e)))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;
    use tokio::sync::broadcast;

    use super::*;
    use crate::log::CommitLogData;
    use crate::CommitLogConfig;

    fn open_log(dir: &TempDir, partition: i32) -> Arc<TopicCommitLogMgr> {
        let config = CommitLogConfig {
            base_dir: dir.path().to_string_lossy().to_string(),
            commit_buffer_size: 16,
            flush_interval_ms: 10,
        };
        Arc::new(
            TopicCommitLogMgr::open(TopicPartition::new("flusher", partition), &config).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_flush_on_tick() {
        let dir = TempDir::new().unwrap();
        let log = open_log(&dir, 0);
        let flusher = Arc::new(CommitLogFlusher::new());
        flusher.register(log.clone());
        assert_eq!(flusher.len(), 1);

        for id in 1..=3 {
            log.append_commit_log(&CommitLogData::new(id, 1, id * 10, 10, id), false)
                .unwrap();
        }
        assert_eq!(log.pending_count(), 3);

        let (notify, _) = broadcast::channel(1);
        let shutdown = Shutdown::subscribe(&notify);
        let task = {
            let flusher = flusher.clone();
            tokio::spawn(async move {
                flusher
                    .flush_task(tokio::time::interval(Duration::from_millis(10)), shutdown)
                    .await
            })
        };

        let mut flushed = false;
        for _ in 0..100 {
            if log.pending_count() == 0 {
                flushed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(flushed);
        assert_eq!(log.file_size().unwrap(), 3 * CommitLogData::SIZE as i64);

        notify.send(()).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_close_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let first = open_log(&dir, 0);
        let second = open_log(&dir, 1);
        let flusher = CommitLogFlusher::new();
        flusher.register(first.clone());
        flusher.register(second.clone());

        second
            .append_commit_log(&CommitLogData::new(second.next_id(), 1, 0, 10, 1), false)
            .unwrap();

        let (notify, _) = broadcast::channel(1);
        let shutdown = Shutdown::subscribe(&notify);
        notify.send(()).unwrap();
        flusher
            .flush_task(tokio::time::interval(Duration::from_secs(3600)), shutdown)
            .await
            .unwrap();

        // closed logs refuse further work
        assert!(matches!(
            first.flush_commit_logs(),
            Err(AppError::IllegalStateError(_))
        ));
        let path = second.path().to_path_buf();
        assert_eq!(
            std::fs::metadata(path).unwrap().len(),
            CommitLogData::SIZE as u64
        );
    }

    #[tokio::test]
    async fn test_closed_log_does_not_stop_others() {
        let dir = TempDir::new().unwrap();
        let unloaded = open_log(&dir, 0);
        let live = open_log(&dir, 1);
        let flusher = Arc::new(CommitLogFlusher::new());
        flusher.register(unloaded.clone());
        flusher.register(live.clone());

        unloaded.close().unwrap();
        live.append_commit_log(&CommitLogData::new(live.next_id(), 1, 0, 10, 1), false)
            .unwrap();

        let (notify, _) = broadcast::channel(1);
        let shutdown = Shutdown::subscribe(&notify);
        let task = {
            let flusher = flusher.clone();
            tokio::spawn(async move {
                flusher
                    .flush_task(tokio::time::interval(Duration::from_millis(10)), shutdown)
                    .await
            })
        };

        let mut flushed = false;
        for _ in 0..100 {
            if live.pending_count() == 0 && flusher.len() == 1 {
                flushed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(flushed);
        assert!(!task.is_finished());

        // keeps flushing on later ticks
        live.append_commit_log(&CommitLogData::new(live.next_id(), 1, 10, 10, 2), false)
            .unwrap();
        let mut flushed_again = false;
        for _ in 0..100 {
            if live.pending_count() == 0 {
                flushed_again = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(flushed_again);
        assert_eq!(live.file_size().unwrap(), 2 * CommitLogData::SIZE as i64);

        notify.send(()).unwrap();
        task.await.unwrap().unwrap();
    }

    #[test]
    fn test_unregister() {
        let dir = TempDir::new().unwrap();
        let flusher = CommitLogFlusher::new();
        flusher.register(open_log(&dir, 0));
        flusher.register(open_log(&dir, 1));

        let removed = flusher.unregister(&TopicPartition::new("flusher", 0)).unwrap();
        assert_eq!(removed.topic_partition(), &TopicPartition::new("flusher", 0));
        assert_eq!(flusher.len(), 1);
        assert!(flusher.unregister(&TopicPartition::new("flusher", 0)).is_none());
        assert!(flusher.unregister(&TopicPartition::new("other", 1)).is_none());
    }
}
