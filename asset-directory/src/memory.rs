//! 内存目录
//!
//! 用于测试和单进程演示；生产环境由外部存储层实现 [`AssetDirectory`]。

use crate::{AssetDirectory, AssetRecord, DirectoryError, PageQuery};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// 以 id 排序的内存资源表
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    records: Arc<RwLock<BTreeMap<String, AssetRecord>>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入或覆盖一条记录
    pub async fn upsert(&self, record: AssetRecord) {
        debug!("[MemoryDirectory] Upsert {} (owner {})", record.id, record.owner_id);
        self.records.write().await.insert(record.id.clone(), record);
    }

    /// 删除一条记录
    pub async fn remove(&self, id: &str) -> Option<AssetRecord> {
        self.records.write().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl AssetDirectory for MemoryDirectory {
    async fn assets_for_owner(&self, owner_id: &str) -> Result<Vec<AssetRecord>, DirectoryError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn page_for_owner(
        &self,
        owner_id: &str,
        query: &PageQuery,
    ) -> Result<Vec<AssetRecord>, DirectoryError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| r.owner_id == owner_id && query.admits(r))
            .take(query.limit)
            .cloned()
            .collect())
    }
}
