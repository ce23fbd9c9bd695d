//! Engine.IO 帧
//!
//! 线格式：`<类型字符><可选 UTF-8 负载>`。这一层只做分帧，
//! 不解析负载，也不知道命名空间。

use crate::error::ProtocolError;

/// 帧类型（编码固定，必须与 Engine.IO 一致）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    Open,
    Close,
    Ping,
    Pong,
    Message,
    Upgrade,
    Noop,
}

impl FrameType {
    pub fn as_char(self) -> char {
        match self {
            FrameType::Open => '0',
            FrameType::Close => '1',
            FrameType::Ping => '2',
            FrameType::Pong => '3',
            FrameType::Message => '4',
            FrameType::Upgrade => '5',
            FrameType::Noop => '6',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(FrameType::Open),
            '1' => Some(FrameType::Close),
            '2' => Some(FrameType::Ping),
            '3' => Some(FrameType::Pong),
            '4' => Some(FrameType::Message),
            '5' => Some(FrameType::Upgrade),
            '6' => Some(FrameType::Noop),
            _ => None,
        }
    }
}

/// Engine.IO 帧
///
/// 空负载与无负载等价，解码时统一为 `None`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub payload: Option<String>,
}

impl Frame {
    pub fn new(frame_type: FrameType, payload: Option<String>) -> Self {
        Self { frame_type, payload }
    }

    /// 握手帧
    pub fn open(handshake: String) -> Self {
        Self::new(FrameType::Open, Some(handshake))
    }

    pub fn close() -> Self {
        Self::new(FrameType::Close, None)
    }

    pub fn ping() -> Self {
        Self::new(FrameType::Ping, None)
    }

    pub fn pong(payload: Option<String>) -> Self {
        Self::new(FrameType::Pong, payload)
    }

    /// 承载 Socket.IO 包的消息帧
    pub fn message(payload: String) -> Self {
        Self::new(FrameType::Message, Some(payload))
    }

    /// 编码为文本帧
    pub fn encode(&self) -> String {
        let payload = self.payload.as_deref().unwrap_or("");
        let mut out = String::with_capacity(1 + payload.len());
        out.push(self.frame_type.as_char());
        out.push_str(payload);
        out
    }

    /// 解码文本帧
    ///
    /// 空输入返回 `Ok(None)`（没有帧，不是错误）。
    pub fn decode(input: &str) -> Result<Option<Frame>, ProtocolError> {
        let mut chars = input.chars();
        let Some(first) = chars.next() else {
            return Ok(None);
        };

        let frame_type = FrameType::from_char(first).ok_or(ProtocolError::UnknownFrameType(first))?;
        let rest = chars.as_str();
        let payload = if rest.is_empty() {
            None
        } else {
            Some(rest.to_string())
        };

        Ok(Some(Frame { frame_type, payload }))
    }
}
