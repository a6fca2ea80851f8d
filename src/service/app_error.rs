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

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// general errors
    #[error("illegal state: {0}")]
    IllegalStateError(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("I/O error: {0}")]
    DetailedIoError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("config file error: {0}")]
    ConfigFileError(#[from] config::ConfigError),

    /// commit log errors
    #[error("commit log id is wrong: {log_id} is not greater than committed {committed}")]
    WrongLogId { log_id: i64, committed: i64 },

    #[error("commit log id is not found: {0}")]
    LogIdNotFound(i64),

    #[error("commit log offset is out of bound: {offset} (file size {file_size})")]
    OffsetOutOfBound { offset: i64, file_size: i64 },

    #[error("commit log offset is invalid: {0}")]
    OffsetInvalid(i64),

    #[error("commit log partition id is exceeded: {0}")]
    PartitionExceeded(i32),

    #[error("corrupt commit log record: {0}")]
    CorruptRecord(String),

    /// the buffered entries could not be written, the log must not be used any more
    #[error("fatal commit log failure: {0}")]
    Fatal(String),
}
