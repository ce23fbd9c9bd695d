//! 会话
//!
//! 每连接一个，握手时创建，收到 pong 时刷新，连接关闭时销毁。

use crate::config::ServerConfig;
use crate::events::HandshakeData;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

/// 连接状态
///
/// 只能按 `Connecting → Open → Closing → Closed` 逐级前进。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    pub fn next(self) -> Option<ConnectionState> {
        match self {
            ConnectionState::Connecting => Some(ConnectionState::Open),
            ConnectionState::Open => Some(ConnectionState::Closing),
            ConnectionState::Closing => Some(ConnectionState::Closed),
            ConnectionState::Closed => None,
        }
    }

    pub fn can_advance_to(self, target: ConnectionState) -> bool {
        self.next() == Some(target)
    }
}

/// 传输层会话
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    ping_interval: Duration,
    ping_timeout: Duration,
    last_ping_at: DateTime<Utc>,
}

impl Session {
    /// 新建会话，分配新的 sid
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            ping_interval: config.ping_interval,
            ping_timeout: config.ping_timeout,
            last_ping_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn ping_interval(&self) -> Duration {
        self.ping_interval
    }

    pub fn ping_timeout(&self) -> Duration {
        self.ping_timeout
    }

    pub fn last_ping_at(&self) -> DateTime<Utc> {
        self.last_ping_at
    }

    /// 收到 pong
    pub fn touch(&mut self) {
        self.last_ping_at = Utc::now();
    }

    /// 超过 `ping_interval + ping_timeout` 没有收到 pong
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let Ok(grace) = chrono::Duration::from_std(self.ping_interval + self.ping_timeout) else {
            return false;
        };
        now - self.last_ping_at > grace
    }

    /// 握手负载
    pub fn handshake(&self) -> HandshakeData {
        HandshakeData {
            sid: self.id.clone(),
            upgrades: Vec::new(),
            ping_interval: self.ping_interval.as_millis() as u64,
            ping_timeout: self.ping_timeout.as_millis() as u64,
        }
    }
}
