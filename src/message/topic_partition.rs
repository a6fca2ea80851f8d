use std::borrow::Cow;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use crate::log::COMMIT_LOG_FILE_SUFFIX;
use crate::{AppError, AppResult};

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl Display for TopicPartition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }

    pub fn id(&self) -> String {
        format!("{}-{}", self.topic, self.partition)
    }

    /// Parses `<topic>-<partition>`, the topic itself may contain dashes.
    pub fn from_string(str_name: Cow<str>) -> AppResult<Self> {
        let (topic, partition) = str_name.rsplit_once('-').ok_or_else(|| {
            AppError::InvalidValue(format!("topic partition name: {}", str_name))
        })?;
        if topic.is_empty() {
            return Err(AppError::InvalidValue(format!(
                "topic partition name: {}",
                str_name
            )));
        }

        let partition = partition
            .parse()
            .map_err(|_| AppError::InvalidValue(format!("topic partition id: {}", partition)))?;

        Ok(Self::new(topic, partition))
    }

    /// File name of this partition's commit log, e.g. `orders-3.commit.log`.
    pub fn commit_log_file_name(&self) -> String {
        format!("{}{}", self.id(), COMMIT_LOG_FILE_SUFFIX)
    }

    pub fn commit_log_path(&self, base_dir: impl AsRef<Path>) -> PathBuf {
        base_dir.as_ref().join(self.commit_log_file_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_log_path() {
        let tp = TopicPartition::new("orders", 3);
        assert_eq!(tp.id(), "orders-3");
        assert_eq!(tp.commit_log_file_name(), "orders-3.commit.log");
        assert_eq!(
            tp.commit_log_path("/data/commit"),
            PathBuf::from("/data/commit/orders-3.commit.log")
        );
    }

    #[test]
    fn test_from_string() {
        let tp = TopicPartition::from_string(Cow::Borrowed("user-events-12")).unwrap();
        assert_eq!(tp, TopicPartition::new("user-events", 12));

        assert!(TopicPartition::from_string(Cow::Borrowed("no_partition")).is_err());
        assert!(TopicPartition::from_string(Cow::Borrowed("topic-x")).is_err());
        assert!(TopicPartition::from_string(Cow::Borrowed("-1")).is_err());
    }
}
