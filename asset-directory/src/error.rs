//! 目录错误定义

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Directory unavailable")]
    Unavailable,
}
