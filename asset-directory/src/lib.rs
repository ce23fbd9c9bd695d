//! Asset Directory - 资源目录访问层
//!
//! 对同步核心而言，关系存储是一个不透明的“资源/用户目录”：
//! - 按 owner 列出当前资源
//! - 按 id 顺序分页列出资源
//!
//! 真正的 SQL 实现在外部，这里只定义契约和一个内存实现。

pub mod error;
pub mod memory;
pub mod types;

pub use error::DirectoryError;
pub use memory::MemoryDirectory;
pub use types::*;

use async_trait::async_trait;

/// 资源目录
///
/// 所有方法只读；调用方不会持有返回值之外的任何引用。
#[async_trait]
pub trait AssetDirectory: Send + Sync {
    /// 列出某个用户当前拥有的全部资源
    async fn assets_for_owner(&self, owner_id: &str) -> Result<Vec<AssetRecord>, DirectoryError>;

    /// 按 id 升序分页列出某个用户的资源
    ///
    /// 最多返回 `query.limit` 条。
    async fn page_for_owner(
        &self,
        owner_id: &str,
        query: &PageQuery,
    ) -> Result<Vec<AssetRecord>, DirectoryError>;
}
