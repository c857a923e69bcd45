//! Method channel
//!
//! 宿主与桥接层之间唯一的消息通道，双向传递 JSON 信封：
//!
//! - 宿主 → 桥接：`invoke { id, method, arguments }`
//! - 桥接 → 宿主：`reply { id, response }`、`event { name, payload, timestamp }`
//!
//! 每个 invoke 在独立任务中执行，reply 携带相同的 id；reply 之间、reply 与
//! event 之间都没有顺序保证。宿主侧的 [`MethodChannelClient`] 维护按 id 索引的
//! 待决请求表，把 reply 交还给对应的调用方。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ChatBridgeError, Result};
use crate::events::{BridgeEvent, EventFilter};
use crate::gateway::{BridgeGateway, MethodCall, MethodResponse};

/// 通道上的消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Envelope {
    Invoke {
        id: u64,
        method: String,
        #[serde(default)]
        arguments: Value,
    },
    Reply {
        id: u64,
        response: MethodResponse,
    },
    Event {
        name: String,
        payload: Value,
        timestamp: i64,
    },
}

impl Envelope {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

impl From<BridgeEvent> for Envelope {
    fn from(event: BridgeEvent) -> Self {
        Envelope::Event {
            name: event.name,
            payload: event.payload,
            timestamp: event.timestamp,
        }
    }
}

/// 宿主持有的通道两端
pub struct MethodChannelEndpoint {
    /// 发往桥接层
    pub sender: mpsc::UnboundedSender<Envelope>,
    /// 来自桥接层
    pub receiver: mpsc::UnboundedReceiver<Envelope>,
    /// 取消后桥接层停止服务
    pub shutdown: CancellationToken,
}

/// 桥接层一侧：把 invoke 交给网关，把会话事件转成 event 信封
pub struct MethodChannel;

impl MethodChannel {
    /// 启动通道服务任务，返回宿主侧端点
    ///
    /// 会话配置中的事件过滤器（任意一个匹配即转发）作用于 event 信封，
    /// 没有配置过滤器时转发全部事件。
    pub fn open(gateway: BridgeGateway) -> MethodChannelEndpoint {
        let (host_tx, mut inbound) = mpsc::unbounded_channel::<Envelope>();
        let (outbound, host_rx) = mpsc::unbounded_channel::<Envelope>();
        let shutdown = CancellationToken::new();

        let filters: Vec<EventFilter> = gateway.session().config().event_config.filters.clone();
        let mut events = gateway.session().subscribe();
        let token = shutdown.clone();

        tokio::spawn(async move {
            info!("Method channel opened");
            let mut events_open = true;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    envelope = inbound.recv() => {
                        match envelope {
                            Some(Envelope::Invoke { id, method, arguments }) => {
                                let gateway = gateway.clone();
                                let outbound = outbound.clone();
                                tokio::spawn(async move {
                                    let response = gateway.handle(MethodCall::new(method, arguments)).await;
                                    if outbound.send(Envelope::Reply { id, response }).is_err() {
                                        debug!("Host went away before reply {}", id);
                                    }
                                });
                            }
                            Some(other) => warn!("Ignoring unexpected inbound envelope: {:?}", other),
                            None => break,
                        }
                    }
                    event = events.recv(), if events_open => {
                        match event {
                            Ok(event) => {
                                if filters.is_empty() || filters.iter().any(|f| f.matches(&event)) {
                                    if outbound.send(event.into()).is_err() {
                                        break;
                                    }
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                warn!("Method channel lagged, {} events skipped", skipped);
                            }
                            Err(broadcast::error::RecvError::Closed) => events_open = false,
                        }
                    }
                }
            }
            info!("Method channel closed");
        });

        MethodChannelEndpoint {
            sender: host_tx,
            receiver: host_rx,
            shutdown,
        }
    }
}

#[derive(Default)]
struct PendingTable {
    closed: bool,
    waiters: HashMap<u64, oneshot::Sender<MethodResponse>>,
}

/// 宿主侧客户端
pub struct MethodChannelClient {
    sender: mpsc::UnboundedSender<Envelope>,
    pending: Arc<Mutex<PendingTable>>,
    next_id: AtomicU64,
    events: broadcast::Sender<BridgeEvent>,
    shutdown: CancellationToken,
}

impl MethodChannelClient {
    pub fn new(endpoint: MethodChannelEndpoint, event_capacity: usize) -> Self {
        let MethodChannelEndpoint {
            sender,
            mut receiver,
            shutdown,
        } = endpoint;
        let pending = Arc::new(Mutex::new(PendingTable::default()));
        let (events, _) = broadcast::channel(event_capacity.max(1));

        let table = pending.clone();
        let fanout = events.clone();
        tokio::spawn(async move {
            while let Some(envelope) = receiver.recv().await {
                match envelope {
                    Envelope::Reply { id, response } => {
                        let waiter = table.lock().waiters.remove(&id);
                        match waiter {
                            Some(waiter) => {
                                if waiter.send(response).is_err() {
                                    debug!("Caller of request {} gave up", id);
                                }
                            }
                            None => warn!("Reply for unknown request {}", id),
                        }
                    }
                    Envelope::Event {
                        name,
                        payload,
                        timestamp,
                    } => {
                        let _ = fanout.send(BridgeEvent {
                            name,
                            payload,
                            timestamp,
                        });
                    }
                    Envelope::Invoke { method, .. } => {
                        warn!("Bridge sent an invoke ({}), ignored", method)
                    }
                }
            }
            let mut table = table.lock();
            table.closed = true;
            table.waiters.clear();
            debug!("Method channel reader stopped");
        });

        Self {
            sender,
            pending,
            next_id: AtomicU64::new(1),
            events,
            shutdown,
        }
    }

    /// 打开通道并连接
    pub fn connect(gateway: BridgeGateway) -> Self {
        let capacity = gateway.session().config().event_config.buffer_size;
        Self::new(MethodChannel::open(gateway), capacity)
    }

    /// 发起调用并等待对应 id 的 reply
    pub async fn invoke(&self, method: &str, arguments: Value) -> Result<MethodResponse> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        {
            let mut table = self.pending.lock();
            if table.closed {
                return Err(ChatBridgeError::ChannelClosed);
            }
            table.waiters.insert(id, tx);
        }

        let envelope = Envelope::Invoke {
            id,
            method: method.to_string(),
            arguments,
        };
        if self.sender.send(envelope).is_err() {
            self.pending.lock().waiters.remove(&id);
            return Err(ChatBridgeError::ChannelClosed);
        }

        rx.await.map_err(|_| ChatBridgeError::ChannelClosed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().waiters.len()
    }

    /// 关闭通道，所有等待中的调用返回 `ChannelClosed`
    pub fn close(&self) {
        {
            let mut table = self.pending.lock();
            table.closed = true;
            table.waiters.clear();
        }
        self.shutdown.cancel();
    }
}

impl Drop for MethodChannelClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
