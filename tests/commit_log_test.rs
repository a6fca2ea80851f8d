use std::io::Write;

use rstest::{fixture, rstest};
use stonemq_commitlog::log::{get_next_log_offset, get_prev_log_offset, make_log_id};
use stonemq_commitlog::{
    AppConfig, AppError, AppResult, CommitLogConfig, CommitLogData, TopicCommitLogMgr,
    TopicPartition,
};
use tempfile::TempDir;

#[fixture]
fn temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

fn config_in(dir: &TempDir, name: &str, commit_buffer_size: usize) -> CommitLogConfig {
    CommitLogConfig {
        base_dir: dir.path().join(name).to_string_lossy().to_string(),
        commit_buffer_size,
        flush_interval_ms: 100,
    }
}

/// Replica catch-up: copy every entry the leader has past `from_offset`.
fn catch_up(
    leader: &TopicCommitLogMgr,
    replica: &TopicCommitLogMgr,
    mut from_offset: i64,
) -> AppResult<usize> {
    let mut copied = 0;
    loop {
        let logs = leader.get_commit_logs(from_offset, 2)?;
        if logs.is_empty() {
            return Ok(copied);
        }
        for log in logs.iter() {
            replica.append_commit_log(log, true)?;
            from_offset = get_next_log_offset(from_offset);
            copied += 1;
        }
    }
}

#[rstest]
fn test_leader_replica_divergence(temp_dir: TempDir) -> AppResult<()> {
    let tp = TopicPartition::new("orders", 2);
    let leader = TopicCommitLogMgr::open(tp.clone(), &config_in(&temp_dir, "leader", 3))?;
    let replica = TopicCommitLogMgr::open(tp.clone(), &config_in(&temp_dir, "replica", 0))?;

    let mut msg_cnt = 0;
    for i in 0..5 {
        msg_cnt += 10;
        let log = CommitLogData::new(leader.next_id(), 1, i * 1000, 1000, msg_cnt);
        leader.append_commit_log(&log, false)?;
    }
    assert_eq!(catch_up(&leader, &replica, 0)?, 5);
    assert_eq!(
        replica.get_last_commit_log_id(),
        leader.get_last_commit_log_id()
    );
    assert_eq!(replica.get_last_log_offset()?, leader.get_last_log_offset()?);

    // the replica wrote two entries of epoch 1 the new leader never saw
    let stale_start = replica.file_size()?;
    for _ in 0..2 {
        let id = replica.get_last_commit_log_id() + 1;
        replica.append_commit_log(&CommitLogData::new(id, 1, 0, 1, msg_cnt + 1), true)?;
    }

    // new leader epoch 2 continues from the agreed entry
    let agreed = replica.truncate_to_offset(stale_start)?.unwrap();
    assert_eq!(agreed.log_id, leader.get_last_commit_log_id());
    assert_eq!(
        replica.get_commit_log_from_offset(get_prev_log_offset(stale_start))?,
        Some(agreed)
    );

    leader.reset(agreed.log_id + 1);
    let log = CommitLogData::new(leader.next_id(), 2, 5000, 1000, msg_cnt + 10);
    leader.append_commit_log(&log, false)?;
    let copied = catch_up(&leader, &replica, stale_start)?;
    assert_eq!(copied, 1);

    assert_eq!(leader.get_commit_logs(0, 100)?, replica.get_commit_logs(0, 100)?);
    assert_eq!(replica.get_last_commit_log_id(), make_log_id(2, 6));

    leader.close()?;
    replica.close()?;
    Ok(())
}

#[rstest]
fn test_open_from_config_file(temp_dir: TempDir) -> AppResult<()> {
    let base_dir = temp_dir.path().join("data");
    let conf_path = temp_dir.path().join("commitlog.toml");
    let mut conf = std::fs::File::create(&conf_path)?;
    writeln!(
        conf,
        "[commit_log]\nbase_dir = \"{}\"\ncommit_buffer_size = 2",
        base_dir.display()
    )?;
    drop(conf);

    let config = AppConfig::set_up_config(&conf_path)?;
    let tp = TopicPartition::new("payments", 7);
    let log = TopicCommitLogMgr::open(tp.clone(), &config.commit_log)?;
    assert_eq!(log.buffer_capacity(), 2);
    assert_eq!(log.path(), base_dir.join("payments-7.commit.log"));

    let first = log.next_id();
    assert_eq!(first, make_log_id(7, 1));
    for id in first..first + 3 {
        log.append_commit_log(&CommitLogData::new(id, 3, 0, 64, id - first + 1), false)?;
    }
    log.close()?;

    let reopened = TopicCommitLogMgr::open(tp, &config.commit_log)?;
    assert_eq!(reopened.get_last_commit_log_id(), first + 2);
    assert_eq!(reopened.next_id(), first + 2 + 100);
    assert!(matches!(
        reopened.append_commit_log(&CommitLogData::new(first, 3, 0, 64, 1), false),
        Err(AppError::WrongLogId { .. })
    ));
    Ok(())
}
