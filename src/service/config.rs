use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{AppError, AppResult};
use crate::log::DEFAULT_COMMIT_BUF_SIZE;

/// Represents the configuration for the partition commit logs.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CommitLogConfig {
    /// The base directory holding one commit log file per topic partition.
    pub base_dir: String,
    /// How many entries are buffered in memory before being written, 0 writes every append.
    pub commit_buffer_size: usize,
    /// The interval at which the background flusher writes buffered entries.
    pub flush_interval_ms: u64,
}

impl Default for CommitLogConfig {
    fn default() -> Self {
        Self {
            base_dir: "data/commit_log".to_string(),
            commit_buffer_size: DEFAULT_COMMIT_BUF_SIZE,
            flush_interval_ms: 1000,
        }
    }
}

impl CommitLogConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub commit_log: CommitLogConfig,
}

impl AppConfig {
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> AppResult<AppConfig> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or(AppError::InvalidValue(format!(
                "config file path: {}",
                path.as_ref().to_string_lossy()
            )))?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(path_str))
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;
        if app_config.commit_log.flush_interval_ms == 0 {
            return Err(AppError::InvalidValue(
                "commit_log.flush_interval_ms must be positive".to_string(),
            ));
        }

        Ok(app_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_load_config_file() -> AppResult<()> {
        let mut file = Builder::new().suffix(".toml").tempfile()?;
        writeln!(
            file,
            "[commit_log]\nbase_dir = \"/tmp/commit\"\ncommit_buffer_size = 16\nflush_interval_ms = 250"
        )?;

        let config = AppConfig::set_up_config(file.path())?;
        assert_eq!(config.commit_log.base_dir, "/tmp/commit");
        assert_eq!(config.commit_log.commit_buffer_size, 16);
        assert_eq!(
            config.commit_log.flush_interval(),
            Duration::from_millis(250)
        );
        Ok(())
    }

    #[test]
    fn test_missing_keys_use_defaults() -> AppResult<()> {
        let mut file = Builder::new().suffix(".toml").tempfile()?;
        writeln!(file, "[commit_log]\nbase_dir = \"logs\"")?;

        let config = AppConfig::set_up_config(file.path())?;
        assert_eq!(config.commit_log.base_dir, "logs");
        assert_eq!(
            config.commit_log.commit_buffer_size,
            DEFAULT_COMMIT_BUF_SIZE
        );
        assert_eq!(config.commit_log.flush_interval_ms, 1000);
        Ok(())
    }

    #[test]
    fn test_zero_flush_interval_rejected() -> AppResult<()> {
        let mut file = Builder::new().suffix(".toml").tempfile()?;
        writeln!(file, "[commit_log]\nflush_interval_ms = 0")?;

        let result = AppConfig::set_up_config(file.path());
        assert!(matches!(result, Err(AppError::InvalidValue(_))));
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        let result = AppConfig::set_up_config("/nonexistent/stonemq/commitlog.toml");
        assert!(matches!(result, Err(AppError::ConfigFileError(_))));
    }
}
