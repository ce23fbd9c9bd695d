//! 客户端任务
//!
//! 每个连接三个独立任务：
//! - read: 读入站帧，解码并分发
//! - write: 排空出站队列和事件订阅，空闲时发 WebSocket ping
//! - heartbeat: 按 ping_interval 入队 Engine.IO ping
//!
//! 三者共享一个 done 信号，任一任务退出都会关闭它，其余任务随之退出。
//! 由服务端发起的关闭会在限定时间内先发出已入队的帧和 `disconnect` 包。

use crate::error::SocketError;
use crate::events::{ConnectAckData, ACK_REPLY};
use crate::frame::{Frame, FrameType};
use crate::packet::{Packet, PacketType, DEFAULT_NAMESPACE};
use crate::session::Session;
use chrono::Utc;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sync_logic::{Subscription, SyncEvent};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 关闭时发送告别帧和关闭连接各自的时限
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// 入站帧的处理结果
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Dispatch {
    /// 入队一帧回复
    Reply(Frame),
    /// 对端要求关闭
    Close,
    /// 无需动作
    Ignore,
}

/// 启动任务所需的全部状态
pub(crate) struct Client {
    pub session: Arc<RwLock<Session>>,
    pub outbound_tx: mpsc::Sender<Frame>,
    pub outbound_rx: mpsc::Receiver<Frame>,
    pub subscription: Option<Subscription>,
    pub done: CancellationToken,
    pub keepalive_interval: Duration,
}

impl Client {
    /// 拆分连接并启动三个任务
    pub(crate) fn spawn<S>(self, ws: WebSocketStream<S>, sid: &str) -> [JoinHandle<()>; 3]
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = ws.split();
        let peer_closed = Arc::new(AtomicBool::new(false));

        let read = tokio::spawn(read_pump(
            sid.to_string(),
            stream,
            self.session.clone(),
            self.outbound_tx.clone(),
            peer_closed.clone(),
            self.done.clone(),
        ));

        let write = tokio::spawn(write_pump(
            sid.to_string(),
            sink,
            self.outbound_rx,
            self.subscription,
            self.keepalive_interval,
            peer_closed,
            self.done.clone(),
        ));

        let heartbeat = tokio::spawn(heartbeat_pump(
            sid.to_string(),
            self.session,
            self.outbound_tx,
            self.done,
        ));

        [read, write, heartbeat]
    }
}

/// 非阻塞入队；队列满时丢弃最新帧
pub(crate) fn enqueue(outbound: &mpsc::Sender<Frame>, frame: Frame, sid: &str) -> Result<(), SocketError> {
    match outbound.try_send(frame) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(frame)) => {
            warn!(
                "[Client] {} outbound queue full, dropping {:?} frame",
                sid, frame.frame_type
            );
            Err(SocketError::QueueFull(sid.to_string()))
        }
        Err(TrySendError::Closed(_)) => Err(SocketError::SessionNotFound(sid.to_string())),
    }
}

// ==================== 读任务 ====================

async fn read_pump<S>(
    sid: String,
    mut stream: SplitStream<WebSocketStream<S>>,
    session: Arc<RwLock<Session>>,
    outbound: mpsc::Sender<Frame>,
    peer_closed: Arc<AtomicBool>,
    done: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let message = tokio::select! {
            _ = done.cancelled() => break,
            message = stream.next() => message,
        };

        match message {
            Some(Ok(Message::Text(text))) => match dispatch_text(&text, &session, &sid).await {
                Dispatch::Reply(frame) => {
                    let _ = enqueue(&outbound, frame, &sid);
                }
                Dispatch::Close => {
                    info!("[Client] {} requested close", sid);
                    peer_closed.store(true, Ordering::SeqCst);
                    break;
                }
                Dispatch::Ignore => {}
            },
            Some(Ok(Message::Binary(data))) => {
                warn!("[Client] {} sent {} binary bytes, dropping", sid, data.len());
            }
            Some(Ok(Message::Close(_))) | None => {
                info!("[Client] {} connection closed by peer", sid);
                peer_closed.store(true, Ordering::SeqCst);
                break;
            }
            // WebSocket 控制帧由 tungstenite 处理
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!("[Client] {} read error: {}", sid, e);
                peer_closed.store(true, Ordering::SeqCst);
                break;
            }
        }
    }

    done.cancel();
    debug!("[Client] {} read task exited", sid);
}

/// 解码一条文本帧并决定回复
pub(crate) async fn dispatch_text(text: &str, session: &RwLock<Session>, sid: &str) -> Dispatch {
    let frame = match Frame::decode(text) {
        Ok(Some(frame)) => frame,
        Ok(None) => {
            debug!("[Client] {} sent an empty frame", sid);
            return Dispatch::Ignore;
        }
        Err(e) => {
            warn!("[Client] {} dropped malformed frame: {}", sid, e);
            return Dispatch::Ignore;
        }
    };

    match frame.frame_type {
        FrameType::Pong => {
            session.write().await.touch();
            Dispatch::Ignore
        }
        FrameType::Ping => Dispatch::Reply(Frame::pong(frame.payload)),
        FrameType::Close => Dispatch::Close,
        FrameType::Message => match frame.payload {
            Some(payload) => match Packet::decode(&payload) {
                Ok(packet) => dispatch_packet(packet, sid),
                Err(e) => {
                    warn!("[Client] {} dropped malformed packet: {}", sid, e);
                    Dispatch::Ignore
                }
            },
            None => {
                warn!("[Client] {} sent a message frame without payload", sid);
                Dispatch::Ignore
            }
        },
        FrameType::Open | FrameType::Upgrade | FrameType::Noop => {
            debug!("[Client] {} sent {:?} frame, ignoring", sid, frame.frame_type);
            Dispatch::Ignore
        }
    }
}

fn dispatch_packet(packet: Packet, sid: &str) -> Dispatch {
    match packet.packet_type {
        PacketType::Connect => {
            // 应用层 sid 与传输层 sid 相互独立
            let ack = ConnectAckData {
                sid: Uuid::new_v4().simple().to_string(),
            };
            let data = serde_json::to_value(&ack).unwrap_or(Value::Null);
            debug!("[Client] {} connected to namespace {}", sid, packet.namespace);
            Dispatch::Reply(Frame::message(Packet::connect(&packet.namespace, Some(data)).encode()))
        }
        PacketType::Disconnect => {
            debug!("[Client] {} disconnected from namespace {}", sid, packet.namespace);
            Dispatch::Close
        }
        PacketType::Event => {
            debug!(
                "[Client] {} event {:?} on {}",
                sid,
                packet.event_name(),
                packet.namespace
            );
            match packet.ack_id {
                Some(id) => {
                    let reply = Packet::ack(
                        &packet.namespace,
                        id,
                        Value::Array(vec![Value::String(ACK_REPLY.to_string())]),
                    );
                    Dispatch::Reply(Frame::message(reply.encode()))
                }
                None => Dispatch::Ignore,
            }
        }
        PacketType::Ack => {
            debug!("[Client] {} ack {:?}", sid, packet.ack_id);
            Dispatch::Ignore
        }
        PacketType::ConnectError | PacketType::BinaryEvent | PacketType::BinaryAck => {
            warn!(
                "[Client] {} sent unsupported {:?} packet, dropping",
                sid, packet.packet_type
            );
            Dispatch::Ignore
        }
    }
}

// ==================== 写任务 ====================

async fn write_pump<S>(
    sid: String,
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut outbound: mpsc::Receiver<Frame>,
    mut subscription: Option<Subscription>,
    keepalive_interval: Duration,
    peer_closed: Arc<AtomicBool>,
    done: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut keepalive = interval_at(Instant::now() + keepalive_interval, keepalive_interval);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut writable = true;

    loop {
        let message = tokio::select! {
            biased;
            _ = done.cancelled() => break,
            frame = outbound.recv() => match frame {
                Some(frame) => Message::Text(frame.encode()),
                None => break,
            },
            event = next_event(&mut subscription), if subscription.is_some() => match event {
                Some(event) => match sync_event_frame(&event) {
                    Ok(frame) => Message::Text(frame.encode()),
                    Err(e) => {
                        warn!("[Client] {} failed to encode {}: {}", sid, event.event_name(), e);
                        continue;
                    }
                },
                None => {
                    debug!("[Client] {} subscription closed", sid);
                    subscription = None;
                    continue;
                }
            },
            _ = keepalive.tick() => Message::Ping(Vec::new()),
        };

        // 对端不读时 send 会一直挂起，必须同时等待 done
        let result = tokio::select! {
            _ = done.cancelled() => break,
            result = sink.send(message) => result,
        };

        if let Err(e) = result {
            warn!("[Client] {} write error: {}", sid, e);
            writable = false;
            break;
        }
        keepalive.reset();
    }

    done.cancel();

    if writable && !peer_closed.load(Ordering::SeqCst) {
        match timeout(CLOSE_GRACE, send_farewell(&mut sink, &mut outbound)).await {
            Ok(Ok(())) => debug!("[Client] {} sent disconnect", sid),
            Ok(Err(e)) => debug!("[Client] {} failed to send disconnect: {}", sid, e),
            Err(_) => debug!("[Client] {} disconnect not delivered in {:?}", sid, CLOSE_GRACE),
        }
    }
    let _ = timeout(CLOSE_GRACE, sink.close()).await;
    debug!("[Client] {} write task exited", sid);
}

/// 发出已入队的帧，然后是默认命名空间的 `disconnect` 包
async fn send_farewell<S>(
    sink: &mut SplitSink<WebSocketStream<S>, Message>,
    outbound: &mut mpsc::Receiver<Frame>,
) -> Result<(), WsError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Ok(frame) = outbound.try_recv() {
        sink.feed(Message::Text(frame.encode())).await?;
    }
    let disconnect = Frame::message(Packet::disconnect(DEFAULT_NAMESPACE).encode());
    sink.send(Message::Text(disconnect.encode())).await
}

async fn next_event(subscription: &mut Option<Subscription>) -> Option<SyncEvent> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending::<Option<SyncEvent>>().await,
    }
}

/// 同步事件编码为 Socket.IO 事件帧
pub(crate) fn sync_event_frame(event: &SyncEvent) -> Result<Frame, SocketError> {
    let data = serde_json::to_value(event).map_err(|e| SocketError::SerializationError(e.to_string()))?;
    let packet = Packet::event(DEFAULT_NAMESPACE, &event.event_name(), data);
    Ok(Frame::message(packet.encode()))
}

// ==================== 心跳任务 ====================

async fn heartbeat_pump(
    sid: String,
    session: Arc<RwLock<Session>>,
    outbound: mpsc::Sender<Frame>,
    done: CancellationToken,
) {
    let interval = session.read().await.ping_interval();
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = done.cancelled() => break,
            _ = ticker.tick() => {
                if session.read().await.is_expired(Utc::now()) {
                    warn!("[Client] {} heartbeat timed out", sid);
                    break;
                }
                match outbound.try_send(Frame::ping()) {
                    Ok(()) => debug!("[Client] {} ping", sid),
                    Err(TrySendError::Full(_)) => {
                        warn!("[Client] {} outbound queue full, skipping heartbeat", sid);
                    }
                    Err(TrySendError::Closed(_)) => break,
                }
            }
        }
    }

    done.cancel();
    debug!("[Client] {} heartbeat task exited", sid);
}
