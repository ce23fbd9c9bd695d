//! 服务端配置

use std::time::Duration;

/// Socket 服务端配置
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Engine.IO 心跳间隔
    pub ping_interval: Duration,
    /// 等待 pong 的超时
    pub ping_timeout: Duration,
    /// 写通道空闲时发送 WebSocket ping 的间隔（与心跳无关）
    pub keepalive_interval: Duration,
    /// 每连接出站队列容量
    pub outbound_capacity: usize,
    /// 接受 WebSocket 升级的路径前缀
    pub path: String,
}

fn env_millis(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
}

impl Default for ServerConfig {
    fn default() -> Self {
        // 从环境变量读取覆盖值
        Self {
            ping_interval: env_millis("PICTOR_PING_INTERVAL_MS").unwrap_or(Duration::from_secs(25)),
            ping_timeout: env_millis("PICTOR_PING_TIMEOUT_MS").unwrap_or(Duration::from_secs(20)),
            keepalive_interval: env_millis("PICTOR_KEEPALIVE_INTERVAL_MS")
                .unwrap_or(Duration::from_secs(30)),
            outbound_capacity: 64,
            path: std::env::var("PICTOR_SOCKET_PATH").unwrap_or_else(|_| "/socket.io".to_string()),
        }
    }
}
