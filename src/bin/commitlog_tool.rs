use std::path::PathBuf;

use clap::{Parser, Subcommand};
use stonemq_commitlog::log::{log_data_size, partition_of, sequence_of};
use stonemq_commitlog::{
    setup_local_tracing, setup_tracing, AppConfig, AppResult, CommitLogData, TopicCommitLogMgr,
    TopicPartition,
};
use tracing::warn;

#[derive(Parser)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// log level (v: info, vv: debug, vvv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// also write logs to hourly rolling files in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a commit log file without opening it for writing
    Dump {
        #[arg(short, long)]
        file: PathBuf,
        /// byte offset of the first record
        #[arg(short, long, default_value_t = 0)]
        start: i64,
        /// number of records, all by default
        #[arg(short, long)]
        count: Option<usize>,
    },
    /// Open a partition's commit log through the manager and report its state
    Inspect {
        /// path to config file
        #[arg(short, long)]
        conf: PathBuf,
        #[arg(short, long)]
        topic: String,
        #[arg(short, long)]
        partition: i32,
        /// also print the newest N entries
        #[arg(long, default_value_t = 0)]
        tail: usize,
    },
}

fn main() -> AppResult<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let _guard = match &cli.log_dir {
        Some(dir) => Some(setup_tracing(dir, level)?),
        None => {
            setup_local_tracing(level)?;
            None
        }
    };

    match &cli.command {
        Commands::Dump { file, start, count } => dump(file, *start, *count),
        Commands::Inspect {
            conf,
            topic,
            partition,
            tail,
        } => inspect(conf, TopicPartition::new(topic.as_str(), *partition), *tail),
    }
}

fn print_record(offset: i64, log: &CommitLogData) {
    println!(
        "offset: {} log_id: {} (partition {} seq {}) epoch: {} msg_offset: {} msg_size: {} msg_cnt: {}",
        offset,
        log.log_id,
        partition_of(log.log_id),
        sequence_of(log.log_id),
        log.epoch,
        log.msg_offset,
        log.msg_size,
        log.msg_cnt
    );
}

fn dump(file: &PathBuf, start: i64, count: Option<usize>) -> AppResult<()> {
    let content = std::fs::read(file)?;
    let trailing = content.len() % CommitLogData::SIZE;
    if trailing != 0 {
        warn!(
            "{} ends with {} bytes of a partial record",
            file.display(),
            trailing
        );
    }
    if start < 0 || start % log_data_size() != 0 {
        return Err(stonemq_commitlog::AppError::OffsetInvalid(start));
    }

    let whole = &content[..content.len() - trailing];
    let records = whole
        .chunks_exact(CommitLogData::SIZE)
        .enumerate()
        .skip(start as usize / CommitLogData::SIZE)
        .take(count.unwrap_or(usize::MAX));
    let mut printed = 0;
    for (slot, chunk) in records {
        let log = CommitLogData::decode(chunk)?;
        print_record(slot as i64 * log_data_size(), &log);
        printed += 1;
    }
    println!("---\n{} records printed, {} on file", printed, whole.len() / CommitLogData::SIZE);
    Ok(())
}

fn inspect(conf: &PathBuf, topic_partition: TopicPartition, tail: usize) -> AppResult<()> {
    let config = AppConfig::set_up_config(conf)?;
    let logger = tracing::dispatcher::get_default(|dispatch| dispatch.clone());
    let log = TopicCommitLogMgr::open_with_logger(topic_partition, &config.commit_log, logger)?;

    println!("path: {}", log.path().display());
    println!("last log id: {}", log.get_last_commit_log_id());
    println!("last log offset: {}", log.get_last_log_offset()?);
    println!("records: {}", log.file_size()? / log_data_size());
    println!("next log id after restart: {}", log.next_id());

    if tail > 0 {
        for log_data in log.get_commit_logs_reverse(0, tail)? {
            println!(
                "log_id: {} epoch: {} msg_offset: {} msg_size: {} msg_cnt: {}",
                log_data.log_id,
                log_data.epoch,
                log_data.msg_offset,
                log_data.msg_size,
                log_data.msg_cnt
            );
        }
    }
    log.close()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inspect() {
        let cli = Cli::try_parse_from([
            "commitlog-tool",
            "inspect",
            "--conf",
            "conf.toml",
            "--topic",
            "user-events",
            "--partition",
            "3",
            "--tail",
            "5",
        ])
        .unwrap();
        match cli.command {
            Commands::Inspect {
                conf,
                topic,
                partition,
                tail,
            } => {
                assert_eq!(conf, PathBuf::from("conf.toml"));
                assert_eq!(
                    TopicPartition::new(topic, partition).to_string(),
                    "user-events-3"
                );
                assert_eq!(tail, 5);
            }
            Commands::Dump { .. } => panic!("expected inspect"),
        }

        assert!(Cli::try_parse_from(["commitlog-tool", "inspect", "-c", "conf.toml", "-t", "a"])
            .is_err());
    }
}
