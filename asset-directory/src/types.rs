//! 领域类型定义
//!
//! 目录返回的资源记录，以及分页查询参数。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 资源记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
    pub id: String,
    pub owner_id: String,
    /// 最后修改时间
    pub updated_at: DateTime<Utc>,
    /// 响应对象的其余字段，原样透传
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl AssetRecord {
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>, updated_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            updated_at,
            data: Value::Null,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// 分页查询
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageQuery {
    /// 本页最多返回的条数
    pub limit: usize,
    /// 只返回 `updated_at <= updated_until` 的记录
    pub updated_until: Option<DateTime<Utc>>,
    /// 只返回 `id > after_id` 的记录（续页游标）
    pub after_id: Option<String>,
}

impl PageQuery {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    /// 记录是否落在本次查询的窗口内（不考虑 limit）
    pub fn admits(&self, record: &AssetRecord) -> bool {
        if let Some(until) = self.updated_until {
            if record.updated_at > until {
                return false;
            }
        }
        match &self.after_id {
            Some(after) => record.id.as_str() > after.as_str(),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_page_query_window() {
        let now = Utc::now();
        let record = AssetRecord::new("b", "user-1", now);

        assert!(PageQuery::new(10).admits(&record));

        let until_before = PageQuery {
            updated_until: Some(now - Duration::seconds(1)),
            ..PageQuery::new(10)
        };
        assert!(!until_before.admits(&record));

        let after_b = PageQuery {
            after_id: Some("b".to_string()),
            ..PageQuery::new(10)
        };
        assert!(!after_b.admits(&record));

        let after_a = PageQuery {
            after_id: Some("a".to_string()),
            ..PageQuery::new(10)
        };
        assert!(after_a.admits(&record));
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = AssetRecord::new("asset-1", "user-1", Utc::now())
            .with_data(serde_json::json!({ "isFavorite": true }));
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["ownerId"], "user-1");
        assert!(json.get("updatedAt").is_some());
        assert_eq!(json["data"]["isFavorite"], true);
    }
}
