//! Socket.IO 服务端模块
//!
//! 直接构建在 WebSocket 连接之上的 Engine.IO / Socket.IO 协议栈：
//! - frame: Engine.IO 帧编解码
//! - packet: Socket.IO 包编解码
//! - hub: 连接注册中心与会话生命周期
//! - client: 每连接的读 / 写 / 心跳任务
//! - listener: TCP 接入与 WebSocket 升级

mod client;
mod config;
mod error;
mod events;
mod frame;
mod hub;
mod listener;
mod packet;
mod session;

pub use config::ServerConfig;
pub use error::{ProtocolError, SocketError};
pub use events::{ConnectAckData, HandshakeData, ACK_REPLY};
pub use frame::{Frame, FrameType};
pub use hub::Hub;
pub use listener::{IdentityResolver, Listener};
pub use packet::{Packet, PacketType, DEFAULT_NAMESPACE};
pub use session::{ConnectionState, Session};
