//! 同步对账
//!
//! 计算客户端追上服务端所需的数据（增量或全量分页），并维护确认集合。
//! 目录是唯一事实来源；实时事件流只是其上的延迟优化。

use crate::error::SyncError;
use crate::store::SyncStateStore;
use crate::types::{DeltaSyncResult, FullSyncRequest, FullSyncResult};
use asset_directory::{AssetDirectory, PageQuery};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 对账配置
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// 游标超过此时长即视为过期，必须全量同步
    pub stale_after: Duration,
    /// 增量超过此条数时改为要求全量同步
    pub max_delta_items: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::days(7),
            max_delta_items: 10_000,
        }
    }
}

/// 同步对账器
#[derive(Clone)]
pub struct Reconciler {
    directory: Arc<dyn AssetDirectory>,
    store: Arc<dyn SyncStateStore>,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(
        directory: Arc<dyn AssetDirectory>,
        store: Arc<dyn SyncStateStore>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            directory,
            store,
            config,
        }
    }

    /// 增量同步
    ///
    /// 任何不确定的情况（无游标、游标过期、查询失败、增量过大）都返回
    /// `needs_full_sync = true`，而不是错误。
    ///
    /// 下界取 `updated_after` 与游标中较晚者，且每次成功的增量都会推进游标。
    /// 因此响应若在推进游标后丢失，用同一个 `updated_after` 重试拿不回这批
    /// 变更；客户端在这种情况下应改用全量同步。
    pub async fn delta_sync(&self, user_id: &str, updated_after: DateTime<Utc>) -> DeltaSyncResult {
        // 查询前取时间，查询期间发生的修改留给下一次增量
        let now = Utc::now();

        let cursor = match self.store.cursor(user_id).await {
            Ok(Some(cursor)) => cursor,
            Ok(None) => {
                debug!("[Reconciler] No sync cursor for {}, full sync required", user_id);
                return DeltaSyncResult::full_sync_required();
            }
            Err(e) => {
                warn!("[Reconciler] Failed to read cursor for {}: {}", user_id, e);
                return DeltaSyncResult::full_sync_required();
            }
        };

        if now - cursor > self.config.stale_after {
            info!(
                "[Reconciler] Cursor for {} is stale ({}), full sync required",
                user_id,
                cursor.to_rfc3339()
            );
            return DeltaSyncResult::full_sync_required();
        }

        let assets = match self.directory.assets_for_owner(user_id).await {
            Ok(assets) => assets,
            Err(e) => {
                warn!("[Reconciler] Directory query failed for {}: {}", user_id, e);
                return DeltaSyncResult::full_sync_required();
            }
        };

        // 游标之前的变更已经交付过
        let lower_bound = updated_after.max(cursor);
        let mut upserted: Vec<_> = assets
            .into_iter()
            .filter(|asset| asset.updated_at > lower_bound)
            .collect();

        if upserted.len() > self.config.max_delta_items {
            info!(
                "[Reconciler] Delta for {} has {} items (limit {}), full sync required",
                user_id,
                upserted.len(),
                self.config.max_delta_items
            );
            return DeltaSyncResult::full_sync_required();
        }

        upserted.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then_with(|| a.id.cmp(&b.id)));

        self.advance_cursor(user_id, now).await;
        debug!("[Reconciler] Delta for {}: {} upserted", user_id, upserted.len());

        DeltaSyncResult {
            needs_full_sync: false,
            upserted,
            deleted: Vec::new(),
        }
    }

    /// 全量同步（一页）
    ///
    /// 多取一条用于判断是否还有下一页。
    pub async fn full_sync(&self, user_id: &str, request: &FullSyncRequest) -> Result<FullSyncResult, SyncError> {
        if request.limit == 0 {
            return Err(SyncError::InvalidLimit(request.limit));
        }

        let now = Utc::now();
        let query = PageQuery {
            limit: request.limit.saturating_add(1),
            updated_until: request.updated_until,
            after_id: request.last_id.clone(),
        };

        let mut items = self.directory.page_for_owner(user_id, &query).await?;
        let has_more = items.len() > request.limit;
        items.truncate(request.limit);
        let last_updated = items.last().map(|item| item.updated_at);

        self.advance_cursor(user_id, now).await;
        debug!(
            "[Reconciler] Full sync page for {}: {} items, has_more={}",
            user_id,
            items.len(),
            has_more
        );

        Ok(FullSyncResult {
            items,
            has_more,
            last_updated,
        })
    }

    /// 记录客户端确认
    pub async fn acknowledge(&self, user_id: &str, resource_ids: &[String]) -> Result<(), SyncError> {
        self.store.add_acknowledgments(user_id, resource_ids).await
    }

    /// 删除客户端确认
    pub async fn delete_acknowledgment(&self, user_id: &str, resource_ids: &[String]) -> Result<(), SyncError> {
        self.store.remove_acknowledgments(user_id, resource_ids).await
    }

    /// 已确认的资源 ID
    pub async fn acknowledgments(&self, user_id: &str) -> Result<Vec<String>, SyncError> {
        self.store.acknowledgments(user_id).await
    }

    async fn advance_cursor(&self, user_id: &str, at: DateTime<Utc>) {
        // 写失败只会让下一次增量多返回一些数据
        if let Err(e) = self.store.set_cursor(user_id, at).await {
            warn!("[Reconciler] Failed to advance cursor for {}: {}", user_id, e);
        }
    }
}
