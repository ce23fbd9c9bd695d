//! 同步服务实现
//!
//! 外层 RPC 在完成鉴权后，以调用者的 user id 调用这里的接口。

use crate::broadcaster::{Broadcaster, Subscription};
use crate::error::SyncError;
use crate::reconciler::Reconciler;
use crate::types::{DeltaSyncResult, FullSyncRequest, FullSyncResult, SyncEvent};
use chrono::{DateTime, Utc};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, info};

/// 同步服务
#[derive(Clone)]
pub struct SyncService {
    /// 事件广播器
    broadcaster: Broadcaster,
    /// 对账器
    reconciler: Reconciler,
}

impl SyncService {
    /// 创建服务
    pub fn new(broadcaster: Broadcaster, reconciler: Reconciler) -> Self {
        Self {
            broadcaster,
            reconciler,
        }
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    // ==================== 确认 ====================

    /// 已确认的资源 ID
    pub async fn get_sync_ack(&self, user_id: &str) -> Result<Vec<String>, SyncError> {
        self.reconciler.acknowledgments(user_id).await
    }

    /// 记录确认
    pub async fn send_sync_ack(&self, user_id: &str, resource_ids: &[String]) -> Result<(), SyncError> {
        self.reconciler.acknowledge(user_id, resource_ids).await
    }

    /// 删除确认
    pub async fn delete_sync_ack(&self, user_id: &str, resource_ids: &[String]) -> Result<(), SyncError> {
        self.reconciler.delete_acknowledgment(user_id, resource_ids).await
    }

    // ==================== 对账 ====================

    /// 增量同步，失败时降级为要求全量同步
    pub async fn get_delta_sync(&self, user_id: &str, updated_after: DateTime<Utc>) -> DeltaSyncResult {
        self.reconciler.delta_sync(user_id, updated_after).await
    }

    /// 全量同步（一页）
    pub async fn get_full_sync_for_user(
        &self,
        user_id: &str,
        request: &FullSyncRequest,
    ) -> Result<FullSyncResult, SyncError> {
        self.reconciler.full_sync(user_id, request).await
    }

    // ==================== 实时事件 ====================

    /// 打开用户的事件流
    ///
    /// 流不会自行结束；丢弃它即退订。
    pub fn get_sync_stream(&self, user_id: &str) -> SyncStream {
        info!("[SyncService] Opening sync stream for {}", user_id);
        SyncStream {
            subscription: self.broadcaster.subscribe(user_id),
            broadcaster: self.broadcaster.clone(),
        }
    }

    /// 发布领域变更给事件所属用户，返回送达的订阅数
    pub fn notify(&self, event: &SyncEvent) -> usize {
        let delivered = self.broadcaster.publish(&event.owner_user_id, event);
        debug!(
            "[SyncService] {} {} delivered to {} subscribers",
            event.event_name(),
            event.resource_id,
            delivered
        );
        delivered
    }
}

/// 用户事件流
///
/// 惰性、无界、不可重启。Drop 时同步退订。
pub struct SyncStream {
    subscription: Subscription,
    broadcaster: Broadcaster,
}

impl SyncStream {
    pub fn user_id(&self) -> &str {
        self.subscription.user_id()
    }
}

impl Stream for SyncStream {
    type Item = SyncEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.subscription.receiver_mut().poll_recv(cx)
    }
}

impl Drop for SyncStream {
    fn drop(&mut self) {
        let user_id = self.subscription.user_id().to_string();
        self.broadcaster.unsubscribe(&user_id, self.subscription.id());
        debug!("[SyncService] Sync stream for {} closed", user_id);
    }
}
