//! 同步错误定义

use asset_directory::DirectoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("State store error: {0}")]
    Store(String),

    #[error("Invalid limit: {0} (must be at least 1)")]
    InvalidLimit(usize),
}
