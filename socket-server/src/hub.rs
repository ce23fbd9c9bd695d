//! 连接注册中心
//!
//! 唯一负责“当前有哪些客户端在线”。只持有客户端的投递句柄和取消信号，
//! 不拥有连接本身；连接何时结束由客户端自己的任务决定。

use crate::client::{enqueue, Client};
use crate::config::ServerConfig;
use crate::error::SocketError;
use crate::frame::Frame;
use crate::packet::{Packet, DEFAULT_NAMESPACE};
use crate::session::{ConnectionState, Session};
use futures::SinkExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use sync_logic::{Broadcaster, SubscriptionId};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 注册表中的客户端句柄
struct ClientHandle {
    user_id: Option<String>,
    subscription: Option<SubscriptionId>,
    /// 弱引用，不延长出站队列的生命周期
    outbound: mpsc::WeakSender<Frame>,
    done: CancellationToken,
    state: watch::Receiver<ConnectionState>,
}

struct HubInner {
    config: ServerConfig,
    broadcaster: Broadcaster,
    clients: RwLock<HashMap<String, ClientHandle>>,
}

/// 连接注册中心
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

impl Hub {
    /// 创建注册中心
    pub fn new(config: ServerConfig, broadcaster: Broadcaster) -> Self {
        Self {
            inner: Arc::new(HubInner {
                config,
                broadcaster,
                clients: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.inner.broadcaster
    }

    // ==================== 生命周期 ====================

    /// 接管一个已完成 WebSocket 升级的连接
    ///
    /// 发送 `open` 握手，成功后登记并启动客户端任务，返回传输层 sid。
    /// 握手失败的连接不会进入 Open，也不会被登记。
    pub async fn accept<S>(&self, mut ws: WebSocketStream<S>, user_id: Option<String>) -> Result<String, SocketError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let session = Session::new(&self.inner.config);
        let sid = session.id().to_string();

        let handshake = serde_json::to_string(&session.handshake())
            .map_err(|e| SocketError::SerializationError(e.to_string()))?;

        if let Err(e) = ws.send(Message::Text(Frame::open(handshake).encode())).await {
            warn!("[Hub] Handshake failed for {}: {}", sid, e);
            let _ = ws.close(None).await;
            return Err(SocketError::HandshakeFailed(e.to_string()));
        }
        advance(&state_tx, ConnectionState::Open);

        let (outbound_tx, outbound_rx) = mpsc::channel(self.inner.config.outbound_capacity.max(1));
        let done = CancellationToken::new();
        let subscription = user_id
            .as_deref()
            .map(|user| self.inner.broadcaster.subscribe(user));

        let handle = ClientHandle {
            user_id: user_id.clone(),
            subscription: subscription.as_ref().map(|s| s.id()),
            outbound: outbound_tx.downgrade(),
            done: done.clone(),
            state: state_rx,
        };

        if let Err(e) = self.register(&sid, handle).await {
            if let (Some(user), Some(sub)) = (user_id.as_deref(), subscription.as_ref()) {
                self.inner.broadcaster.unsubscribe(user, sub.id());
            }
            let _ = ws.close(None).await;
            return Err(e);
        }

        info!(
            "[Hub] Client {} open (user: {})",
            sid,
            user_id.as_deref().unwrap_or("anonymous")
        );

        let client = Client {
            session: Arc::new(RwLock::new(session)),
            outbound_tx,
            outbound_rx,
            subscription,
            done: done.clone(),
            keepalive_interval: self.inner.config.keepalive_interval,
        };
        let tasks = client.spawn(ws, &sid);

        let hub = self.clone();
        let client_sid = sid.clone();
        tokio::spawn(async move {
            done.cancelled().await;
            advance(&state_tx, ConnectionState::Closing);
            debug!("[Hub] Client {} closing", client_sid);

            for task in tasks {
                if let Err(e) = task.await {
                    warn!("[Hub] Client {} task failed: {}", client_sid, e);
                }
            }

            hub.unregister(&client_sid).await;
            advance(&state_tx, ConnectionState::Closed);
            info!("[Hub] Client {} closed", client_sid);
        });

        Ok(sid)
    }

    /// 登记客户端；sid 在在线客户端中必须唯一
    async fn register(&self, sid: &str, handle: ClientHandle) -> Result<(), SocketError> {
        let mut clients = self.inner.clients.write().await;
        if clients.contains_key(sid) {
            return Err(SocketError::DuplicateSession(sid.to_string()));
        }
        clients.insert(sid.to_string(), handle);
        Ok(())
    }

    /// 注销客户端，并同步移除其事件订阅
    async fn unregister(&self, sid: &str) -> bool {
        let handle = self.inner.clients.write().await.remove(sid);

        match handle {
            Some(handle) => {
                if let (Some(user), Some(sub)) = (handle.user_id.as_deref(), handle.subscription) {
                    self.inner.broadcaster.unsubscribe(user, sub);
                }
                true
            }
            None => false,
        }
    }

    // ==================== 查询 ====================

    /// 在线客户端数
    pub async fn connected_count(&self) -> usize {
        self.inner.clients.read().await.len()
    }

    pub async fn is_connected(&self, sid: &str) -> bool {
        self.inner.clients.read().await.contains_key(sid)
    }

    /// 在线客户端的 sid（升序）
    pub async fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.inner.clients.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// 客户端当前状态；已注销的客户端返回 `None`
    pub async fn state(&self, sid: &str) -> Option<ConnectionState> {
        self.inner
            .clients
            .read()
            .await
            .get(sid)
            .map(|handle| *handle.state.borrow())
    }

    /// 等待客户端进入 Closed
    pub async fn wait_closed(&self, sid: &str) {
        let mut state = match self.inner.clients.read().await.get(sid) {
            Some(handle) => handle.state.clone(),
            None => return,
        };
        let _ = state.wait_for(|s| *s == ConnectionState::Closed).await;
    }

    // ==================== 推送与关闭 ====================

    /// 向单个客户端推送事件（非阻塞）
    pub async fn emit(&self, sid: &str, event: &str, data: Value) -> Result<(), SocketError> {
        let outbound = {
            let clients = self.inner.clients.read().await;
            clients
                .get(sid)
                .and_then(|handle| handle.outbound.upgrade())
                .ok_or_else(|| SocketError::SessionNotFound(sid.to_string()))?
        };

        let packet = Packet::event(DEFAULT_NAMESPACE, event, data);
        enqueue(&outbound, Frame::message(packet.encode()), sid)
    }

    /// 关闭单个客户端
    pub async fn disconnect(&self, sid: &str) -> bool {
        match self.inner.clients.read().await.get(sid) {
            Some(handle) => {
                handle.done.cancel();
                true
            }
            None => false,
        }
    }

    /// 关闭全部客户端
    pub async fn shutdown(&self) {
        let clients = self.inner.clients.read().await;
        info!("[Hub] Shutting down {} clients", clients.len());
        for handle in clients.values() {
            handle.done.cancel();
        }
    }
}

fn advance(state: &watch::Sender<ConnectionState>, next: ConnectionState) {
    state.send_if_modified(|current| {
        if current.can_advance_to(next) {
            *current = next;
            true
        } else {
            false
        }
    });
}
