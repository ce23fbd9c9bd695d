//! Socket.IO 包
//!
//! 承载在 Engine.IO 消息帧内部。线格式：
//! `<类型数字>[<命名空间>,][<ack id>][<JSON 负载>]`

use crate::error::ProtocolError;
use serde_json::Value;
use std::fmt::Write;

/// 默认命名空间，编码时省略
pub const DEFAULT_NAMESPACE: &str = "/";

/// 包类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Connect,
    Disconnect,
    Event,
    Ack,
    ConnectError,
    BinaryEvent,
    BinaryAck,
}

impl PacketType {
    pub fn as_char(self) -> char {
        match self {
            PacketType::Connect => '0',
            PacketType::Disconnect => '1',
            PacketType::Event => '2',
            PacketType::Ack => '3',
            PacketType::ConnectError => '4',
            PacketType::BinaryEvent => '5',
            PacketType::BinaryAck => '6',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(PacketType::Connect),
            '1' => Some(PacketType::Disconnect),
            '2' => Some(PacketType::Event),
            '3' => Some(PacketType::Ack),
            '4' => Some(PacketType::ConnectError),
            '5' => Some(PacketType::BinaryEvent),
            '6' => Some(PacketType::BinaryAck),
            _ => None,
        }
    }
}

/// Socket.IO 包
///
/// 负载应为数组或对象；顶层裸数字会与 ack id 混淆，无法往返。
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub packet_type: PacketType,
    pub namespace: String,
    pub ack_id: Option<u64>,
    pub data: Option<Value>,
}

impl Packet {
    pub fn new(packet_type: PacketType, namespace: &str) -> Self {
        Self {
            packet_type,
            namespace: namespace.to_string(),
            ack_id: None,
            data: None,
        }
    }

    pub fn connect(namespace: &str, data: Option<Value>) -> Self {
        Self {
            data,
            ..Self::new(PacketType::Connect, namespace)
        }
    }

    pub fn disconnect(namespace: &str) -> Self {
        Self::new(PacketType::Disconnect, namespace)
    }

    /// 事件包，负载为 `[event, data]`
    pub fn event(namespace: &str, event: &str, data: Value) -> Self {
        Self {
            data: Some(Value::Array(vec![Value::String(event.to_string()), data])),
            ..Self::new(PacketType::Event, namespace)
        }
    }

    pub fn ack(namespace: &str, ack_id: u64, data: Value) -> Self {
        Self {
            ack_id: Some(ack_id),
            data: Some(data),
            ..Self::new(PacketType::Ack, namespace)
        }
    }

    pub fn with_ack_id(mut self, ack_id: u64) -> Self {
        self.ack_id = Some(ack_id);
        self
    }

    /// 事件名（事件包负载数组的首个字符串）
    pub fn event_name(&self) -> Option<&str> {
        match &self.data {
            Some(Value::Array(items)) => items.first().and_then(Value::as_str),
            _ => None,
        }
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push(self.packet_type.as_char());

        if !self.namespace.is_empty() && self.namespace != DEFAULT_NAMESPACE {
            out.push_str(&self.namespace);
            out.push(',');
        }

        if let Some(id) = self.ack_id {
            // 写入 String 不会失败
            let _ = write!(out, "{id}");
        }

        if let Some(data) = &self.data {
            out.push_str(&data.to_string());
        }

        out
    }

    /// 解码
    ///
    /// 负载按 JSON 尽力解析；解析失败只丢负载，类型 / 命名空间 / ack id 仍然有效。
    pub fn decode(input: &str) -> Result<Packet, ProtocolError> {
        let mut chars = input.chars();
        let first = chars.next().ok_or(ProtocolError::EmptyPacket)?;
        let packet_type = PacketType::from_char(first).ok_or(ProtocolError::UnknownPacketType(first))?;
        let mut rest = chars.as_str();

        let mut namespace = DEFAULT_NAMESPACE;
        if rest.starts_with('/') {
            match rest.find(',') {
                Some(comma) => {
                    namespace = &rest[..comma];
                    rest = &rest[comma + 1..];
                }
                None => {
                    namespace = rest;
                    rest = "";
                }
            }
        }

        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let ack_id = if digits > 0 {
            let raw = &rest[..digits];
            rest = &rest[digits..];
            Some(
                raw.parse::<u64>()
                    .map_err(|_| ProtocolError::InvalidAckId(raw.to_string()))?,
            )
        } else {
            None
        };

        let data = if rest.is_empty() {
            None
        } else {
            serde_json::from_str(rest).ok()
        };

        Ok(Packet {
            packet_type,
            namespace: namespace.to_string(),
            ack_id,
            data,
        })
    }
}
