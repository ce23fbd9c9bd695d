//! 同步事件与结果类型

use asset_directory::AssetRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// 资源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Asset,
    Album,
    Partner,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Asset => "asset",
            ResourceType::Album => "album",
            ResourceType::Partner => "partner",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 变更动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Upsert,
    Delete,
}

impl SyncAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncAction::Upsert => "upsert",
            SyncAction::Delete => "delete",
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 领域变更事件
///
/// 在系统其他地方发生变更时构造，之后不可变。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEvent {
    pub resource_type: ResourceType,
    pub action: SyncAction,
    pub owner_user_id: String,
    pub resource_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl SyncEvent {
    /// 构造 upsert 事件，时间戳取当前时间
    pub fn upsert(
        resource_type: ResourceType,
        owner_user_id: impl Into<String>,
        resource_id: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        Self {
            resource_type,
            action: SyncAction::Upsert,
            owner_user_id: owner_user_id.into(),
            resource_id: resource_id.into(),
            timestamp: Utc::now(),
            data,
        }
    }

    /// 构造 delete 事件，时间戳取当前时间
    pub fn delete(
        resource_type: ResourceType,
        owner_user_id: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            resource_type,
            action: SyncAction::Delete,
            owner_user_id: owner_user_id.into(),
            resource_id: resource_id.into(),
            timestamp: Utc::now(),
            data: None,
        }
    }

    /// 推送给 Socket.IO 客户端时使用的事件名，如 `on_asset_upsert`
    pub fn event_name(&self) -> String {
        format!("on_{}_{}", self.resource_type, self.action)
    }
}

/// 增量同步结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaSyncResult {
    pub needs_full_sync: bool,
    pub upserted: Vec<AssetRecord>,
    /// 没有墓碑数据源，始终为空
    pub deleted: Vec<String>,
}

impl DeltaSyncResult {
    /// 要求客户端回退到全量同步
    pub fn full_sync_required() -> Self {
        Self {
            needs_full_sync: true,
            ..Default::default()
        }
    }
}

/// 全量同步请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullSyncRequest {
    pub limit: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_until: Option<DateTime<Utc>>,
    /// 上一页最后一条记录的 id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_id: Option<String>,
}

impl FullSyncRequest {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            updated_until: None,
            last_id: None,
        }
    }
}

/// 全量同步结果（一页）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullSyncResult {
    pub items: Vec<AssetRecord>,
    pub has_more: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_name() {
        let event = SyncEvent::upsert(ResourceType::Asset, "user-1", "asset-1", None);
        assert_eq!(event.event_name(), "on_asset_upsert");

        let event = SyncEvent::delete(ResourceType::Album, "user-1", "album-1");
        assert_eq!(event.event_name(), "on_album_delete");
    }

    #[test]
    fn test_event_wire_shape() {
        let event = SyncEvent::upsert(
            ResourceType::Partner,
            "user-1",
            "user-2",
            Some(json!({ "inTimeline": true })),
        );
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["resourceType"], "partner");
        assert_eq!(value["action"], "upsert");
        assert_eq!(value["ownerUserId"], "user-1");
        assert_eq!(value["resourceId"], "user-2");
        assert_eq!(value["data"]["inTimeline"], true);
    }

    #[test]
    fn test_delete_event_omits_data() {
        let event = SyncEvent::delete(ResourceType::Asset, "user-1", "asset-1");
        let value = serde_json::to_value(&event).unwrap();
        assert!(value.get("data").is_none());
    }
}
