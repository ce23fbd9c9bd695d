//! 事件广播
//!
//! 按用户维护订阅队列。发布方对每个队列做非阻塞投递：
//! 队列满时直接丢弃并记录，绝不等待慢消费者（at-most-once）。

use crate::types::SyncEvent;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tracing::{debug, warn};

/// 广播配置
#[derive(Debug, Clone)]
pub struct BroadcasterConfig {
    /// 每个订阅队列的容量
    pub queue_capacity: usize,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self { queue_capacity: 100 }
    }
}

/// 订阅句柄 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// 注册表中的投递句柄
struct Subscriber {
    id: SubscriptionId,
    tx: mpsc::Sender<SyncEvent>,
}

/// 订阅（接收端）
///
/// 不负责退订；退订由持有者显式调用 [`Broadcaster::unsubscribe`]。
pub struct Subscription {
    id: SubscriptionId,
    user_id: String,
    rx: mpsc::Receiver<SyncEvent>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// 接收下一个事件；队列关闭且已排空时返回 `None`
    pub async fn recv(&mut self) -> Option<SyncEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Result<SyncEvent, TryRecvError> {
        self.rx.try_recv()
    }

    pub(crate) fn receiver_mut(&mut self) -> &mut mpsc::Receiver<SyncEvent> {
        &mut self.rx
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .finish()
    }
}

struct BroadcasterInner {
    config: BroadcasterConfig,
    subscribers: Mutex<HashMap<String, Vec<Subscriber>>>,
    next_id: AtomicU64,
    dropped: AtomicU64,
}

/// 按用户的事件广播器
///
/// 可廉价 clone，内部共享同一张注册表。
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<BroadcasterInner>,
}

impl Broadcaster {
    pub fn new(config: BroadcasterConfig) -> Self {
        Self {
            inner: Arc::new(BroadcasterInner {
                config,
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// 锁只在 map 变更或快照期间持有
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Subscriber>>> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 为用户分配一个有界队列并登记
    pub fn subscribe(&self, user_id: &str) -> Subscription {
        let capacity = self.inner.config.queue_capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));

        self.lock()
            .entry(user_id.to_string())
            .or_default()
            .push(Subscriber { id, tx });

        debug!("[Broadcaster] {} subscribed as {}", user_id, id);

        Subscription {
            id,
            user_id: user_id.to_string(),
            rx,
        }
    }

    /// 移除订阅并关闭其队列
    ///
    /// 用户的最后一个订阅被移除时删除整个条目。返回是否找到该订阅。
    pub fn unsubscribe(&self, user_id: &str, id: SubscriptionId) -> bool {
        let removed = {
            let mut subscribers = self.lock();
            let Some(list) = subscribers.get_mut(user_id) else {
                return false;
            };

            let before = list.len();
            // 丢弃 Sender 即关闭队列
            list.retain(|s| s.id != id);
            let removed = list.len() != before;

            if list.is_empty() {
                subscribers.remove(user_id);
            }
            removed
        };

        if removed {
            debug!("[Broadcaster] {} unsubscribed {}", user_id, id);
        }
        removed
    }

    /// 向用户的全部订阅做非阻塞投递，返回成功投递的队列数
    ///
    /// 没有订阅者时为空操作。
    pub fn publish(&self, user_id: &str, event: &SyncEvent) -> usize {
        // 快照后立即释放锁，投递在锁外进行
        let targets: Vec<(SubscriptionId, mpsc::Sender<SyncEvent>)> = {
            let subscribers = self.lock();
            match subscribers.get(user_id) {
                Some(list) => list.iter().map(|s| (s.id, s.tx.clone())).collect(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        for (id, tx) in targets {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "[Broadcaster] Queue full for {} ({}), dropping {} {}",
                        user_id,
                        id,
                        event.event_name(),
                        event.resource_id
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("[Broadcaster] Queue {} for {} already closed", id, user_id);
                }
            }
        }

        delivered
    }

    /// 用户当前的订阅数
    pub fn subscriber_count(&self, user_id: &str) -> usize {
        self.lock().get(user_id).map_or(0, Vec::len)
    }

    /// 有订阅的用户数
    pub fn user_count(&self) -> usize {
        self.lock().len()
    }

    /// 因队列满而丢弃的事件总数
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(BroadcasterConfig::default())
    }
}
