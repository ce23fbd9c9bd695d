//! Pictor CLI - 同步服务命令行入口

use anyhow::Result;
use asset_directory::MemoryDirectory;
use clap::Parser;
use socket_server::{Hub, IdentityResolver, Listener, ServerConfig};
use std::sync::Arc;
use std::time::Duration;
use sync_logic::{Broadcaster, BroadcasterConfig, MemoryStateStore, Reconciler, ReconcilerConfig, SyncService};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::handshake::server::Request;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use url::form_urlencoded;

/// Pictor sync server CLI
#[derive(Parser, Debug)]
#[command(name = "pictor-sync")]
#[command(version, about = "Real-time asset sync server (Socket.IO over WebSocket)")]
struct Args {
    /// Listen address
    #[arg(short, long, default_value = "0.0.0.0:3001")]
    bind: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Engine.IO ping interval in milliseconds
    #[arg(long)]
    ping_interval_ms: Option<u64>,

    /// Engine.IO ping timeout in milliseconds
    #[arg(long)]
    ping_timeout_ms: Option<u64>,

    /// Per-subscriber event queue capacity
    #[arg(long, default_value = "100")]
    queue_capacity: usize,
}

/// 开发用身份解析：`x-user-id` 请求头，其次 `userId` 查询参数
fn development_identity() -> IdentityResolver {
    Arc::new(|req: &Request| {
        if let Some(user) = req.headers().get("x-user-id").and_then(|v| v.to_str().ok()) {
            return Some(user.to_string());
        }
        req.uri().query().and_then(query_user_id)
    })
}

/// 从查询串中取出已解码的 `userId`
fn query_user_id(query: &str) -> Option<String> {
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "userId")
        .map(|(_, value)| value.into_owned())
        .filter(|user| !user.is_empty())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Pictor sync server...");

    let mut config = ServerConfig::default();
    if let Some(ms) = args.ping_interval_ms {
        config.ping_interval = Duration::from_millis(ms);
    }
    if let Some(ms) = args.ping_timeout_ms {
        config.ping_timeout = Duration::from_millis(ms);
    }
    info!(
        "Heartbeat: interval {:?}, timeout {:?}, path {}",
        config.ping_interval, config.ping_timeout, config.path
    );

    // 组装服务
    let directory = Arc::new(MemoryDirectory::new());
    let store = Arc::new(MemoryStateStore::new());
    let reconciler = Reconciler::new(directory, store, ReconcilerConfig::default());
    let broadcaster = Broadcaster::new(BroadcasterConfig {
        queue_capacity: args.queue_capacity,
    });
    let service = SyncService::new(broadcaster.clone(), reconciler);

    let hub = Hub::new(config, broadcaster);
    let listener = Listener::new(hub.clone(), development_identity());
    let tcp = TcpListener::bind(&args.bind).await?;

    // 创建 shutdown 信号
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server = tokio::spawn(async move { listener.serve(tcp, shutdown_rx).await });

    // 等待 Ctrl+C
    info!("Server running on {}. Press Ctrl+C to stop.", args.bind);
    signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down...");

    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(Duration::from_secs(5), server).await {
        Ok(Ok(Err(e))) => warn!("Listener stopped with error: {}", e),
        Ok(Err(e)) => warn!("Listener task failed: {}", e),
        Err(_) => warn!("Listener did not stop within 5s"),
        Ok(Ok(Ok(()))) => {}
    }

    // 等待客户端关闭
    for sid in hub.session_ids().await {
        let _ = tokio::time::timeout(Duration::from_secs(2), hub.wait_closed(&sid)).await;
    }

    info!(
        "Server stopped ({} events dropped)",
        service.broadcaster().dropped_count()
    );
    Ok(())
}
