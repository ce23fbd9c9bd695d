//! TCP 接入
//!
//! 完成 WebSocket 升级后把连接交给 [`Hub`]。调用者身份由外层通过
//! [`IdentityResolver`] 从升级请求中解析。

use crate::error::SocketError;
use crate::hub::Hub;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, info, warn};

/// 从升级请求中解析调用者 user id
pub type IdentityResolver = Arc<dyn Fn(&Request) -> Option<String> + Send + Sync>;

/// WebSocket 接入器
#[derive(Clone)]
pub struct Listener {
    hub: Hub,
    resolver: IdentityResolver,
}

impl Listener {
    pub fn new(hub: Hub, resolver: IdentityResolver) -> Self {
        Self { hub, resolver }
    }

    /// 匿名接入（不订阅任何用户的事件）
    pub fn anonymous(hub: Hub) -> Self {
        Self::new(hub, Arc::new(|_: &Request| -> Option<String> { None }))
    }

    /// 接受连接直到收到 shutdown 信号，随后关闭所有客户端
    pub async fn serve(&self, listener: TcpListener, mut shutdown: watch::Receiver<bool>) -> Result<(), SocketError> {
        info!("[Listener] Accepting connections on {}", listener.local_addr()?);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("[Listener] Shutdown signal received");
                        break;
                    }
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let this = self.clone();
                        tokio::spawn(async move {
                            this.handle_connection(stream, addr).await;
                        });
                    }
                    Err(e) => warn!("[Listener] Accept failed: {}", e),
                },
            }
        }

        self.hub.shutdown().await;
        Ok(())
    }

    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let path = self.hub.config().path.clone();
        let resolver = self.resolver.clone();
        let mut user_id = None;

        let upgrade = tokio_tungstenite::accept_hdr_async(
            stream,
            |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
                if !path_matches(req.uri().path(), &path) {
                    let mut rejection = ErrorResponse::new(Some("Not Found".to_string()));
                    *rejection.status_mut() = StatusCode::NOT_FOUND;
                    return Err(rejection);
                }
                user_id = resolver(req);
                Ok(response)
            },
        )
        .await;

        let ws = match upgrade {
            Ok(ws) => ws,
            Err(e) => {
                debug!("[Listener] Upgrade failed for {}: {}", addr, e);
                return;
            }
        };

        match self.hub.accept(ws, user_id).await {
            Ok(sid) => debug!("[Listener] {} accepted as {}", addr, sid),
            Err(e) => warn!("[Listener] {} rejected: {}", addr, e),
        }
    }
}

/// 请求路径等于配置路径，或位于其下一级
fn path_matches(request: &str, base: &str) -> bool {
    let base = base.trim_end_matches('/');
    match request.strip_prefix(base) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
