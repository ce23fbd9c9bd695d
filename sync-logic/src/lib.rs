//! 同步业务逻辑层
//!
//! 整合资源目录、事件广播和同步状态，实现：
//! - 按用户的事件扇出（best-effort，不阻塞生产者）
//! - 增量 / 全量同步计算
//! - 客户端确认集合

mod broadcaster;
mod error;
mod reconciler;
mod service;
mod store;
mod types;

pub use broadcaster::{Broadcaster, BroadcasterConfig, Subscription, SubscriptionId};
pub use error::SyncError;
pub use reconciler::{Reconciler, ReconcilerConfig};
pub use service::{SyncService, SyncStream};
pub use store::{MemoryStateStore, SyncStateStore};
pub use types::{
    DeltaSyncResult, FullSyncRequest, FullSyncResult, ResourceType, SyncAction, SyncEvent,
};
