//! Socket 错误定义

use thiserror::Error;

/// 帧 / 包解析错误
///
/// 只会导致单帧被丢弃，连接保持打开。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unknown frame type: {0:?}")]
    UnknownFrameType(char),

    #[error("Empty packet")]
    EmptyPacket,

    #[error("Unknown packet type: {0:?}")]
    UnknownPacketType(char),

    #[error("Invalid ack id: {0}")]
    InvalidAckId(String),
}

#[derive(Error, Debug)]
pub enum SocketError {
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Duplicate session: {0}")]
    DuplicateSession(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Outbound queue full for session {0}")]
    QueueFull(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
