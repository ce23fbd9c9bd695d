//! Socket 事件定义
//!
//! 握手与应用层回复的负载结构

use serde::{Deserialize, Serialize};

/// 带 ack id 的事件统一回复的内容
pub const ACK_REPLY: &str = "acknowledged";

/// Engine.IO 握手负载（`open` 帧）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeData {
    pub sid: String,
    pub upgrades: Vec<String>,
    /// 毫秒
    pub ping_interval: u64,
    /// 毫秒
    pub ping_timeout: u64,
}

/// Socket.IO 命名空间连接回复
///
/// 这里的 sid 每次连接命名空间时新生成，与传输层 sid 无关。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectAckData {
    pub sid: String,
}
