//! 同步状态存储
//!
//! 保存每个用户的同步游标和确认集合。当前只有内存实现，
//! 进程重启即丢失；需要持久化时换一个实现即可，调用契约不变。

use crate::error::SyncError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// 同步状态存储
#[async_trait]
pub trait SyncStateStore: Send + Sync {
    /// 读取用户最近一次同步的时间
    async fn cursor(&self, user_id: &str) -> Result<Option<DateTime<Utc>>, SyncError>;

    /// 记录用户最近一次同步的时间
    async fn set_cursor(&self, user_id: &str, at: DateTime<Utc>) -> Result<(), SyncError>;

    /// 读取用户已确认的资源 ID（升序）
    async fn acknowledgments(&self, user_id: &str) -> Result<Vec<String>, SyncError>;

    /// 幂等插入确认
    async fn add_acknowledgments(&self, user_id: &str, resource_ids: &[String]) -> Result<(), SyncError>;

    /// 幂等删除确认
    async fn remove_acknowledgments(&self, user_id: &str, resource_ids: &[String]) -> Result<(), SyncError>;
}

/// 内存状态存储
#[derive(Clone, Default)]
pub struct MemoryStateStore {
    cursors: Arc<RwLock<HashMap<String, DateTime<Utc>>>>,
    acks: Arc<RwLock<HashMap<String, BTreeSet<String>>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SyncStateStore for MemoryStateStore {
    async fn cursor(&self, user_id: &str) -> Result<Option<DateTime<Utc>>, SyncError> {
        Ok(self.cursors.read().await.get(user_id).copied())
    }

    async fn set_cursor(&self, user_id: &str, at: DateTime<Utc>) -> Result<(), SyncError> {
        self.cursors.write().await.insert(user_id.to_string(), at);
        Ok(())
    }

    async fn acknowledgments(&self, user_id: &str) -> Result<Vec<String>, SyncError> {
        Ok(self
            .acks
            .read()
            .await
            .get(user_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn add_acknowledgments(&self, user_id: &str, resource_ids: &[String]) -> Result<(), SyncError> {
        if resource_ids.is_empty() {
            return Ok(());
        }
        let mut acks = self.acks.write().await;
        acks.entry(user_id.to_string())
            .or_default()
            .extend(resource_ids.iter().cloned());
        Ok(())
    }

    async fn remove_acknowledgments(&self, user_id: &str, resource_ids: &[String]) -> Result<(), SyncError> {
        let mut acks = self.acks.write().await;
        if let Some(set) = acks.get_mut(user_id) {
            for id in resource_ids {
                set.remove(id);
            }
            if set.is_empty() {
                acks.remove(user_id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn test_cursor_roundtrip() {
        let store = MemoryStateStore::new();
        assert!(store.cursor("alice").await.unwrap().is_none());

        let now = Utc::now();
        store.set_cursor("alice", now).await.unwrap();
        assert_eq!(store.cursor("alice").await.unwrap(), Some(now));
        assert!(store.cursor("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_acknowledgments_are_idempotent() {
        let store = MemoryStateStore::new();
        store.add_acknowledgments("alice", &ids(&["b", "a"])).await.unwrap();
        store.add_acknowledgments("alice", &ids(&["a"])).await.unwrap();

        assert_eq!(store.acknowledgments("alice").await.unwrap(), ids(&["a", "b"]));

        store.remove_acknowledgments("alice", &ids(&["a", "missing"])).await.unwrap();
        assert_eq!(store.acknowledgments("alice").await.unwrap(), ids(&["b"]));

        store.remove_acknowledgments("alice", &ids(&["b"])).await.unwrap();
        assert!(store.acknowledgments("alice").await.unwrap().is_empty());
    }
}
