//! 事件系统模块 - 向宿主投递的事件
//!
//! 功能包括：
//! - 出站事件（名称 + JSON payload）
//! - 广播订阅与过滤订阅
//! - 按事件名注册的监听器（"*" 表示全部）
//! - 事件统计

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// 宿主侧约定的事件名
pub mod event_names {
    pub const CLIENT_SYNCHRONIZATION: &str = "onClientSynchronization";
    pub const CLIENT_INITIALIZATION_ERROR: &str = "onClientInitializationError";
    pub const CHANNEL_ADDED: &str = "onChannelAdded";
    pub const CHANNEL_UPDATED: &str = "onChannelUpdated";
    pub const CHANNEL_DELETED: &str = "onChannelDeleted";
    pub const CHANNEL_MESSAGE_ADDED: &str = "channelOnMessageAdded";
}

/// 出站事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeEvent {
    pub name: String,
    pub payload: serde_json::Value,
    /// UNIX 秒
    pub timestamp: i64,
}

impl BridgeEvent {
    pub fn new<N: Into<String>>(name: N, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            payload,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// 事件关联的频道 ID（频道快照的 sid、消息的 channelSid 或 channelId）
    pub fn channel_id(&self) -> Option<&str> {
        ["channelSid", "channelId"]
            .iter()
            .find_map(|key| self.payload.get(*key).and_then(|v| v.as_str()))
            .or_else(|| {
                if self.name == event_names::CHANNEL_ADDED {
                    self.payload.get("sid").and_then(|v| v.as_str())
                } else {
                    None
                }
            })
    }
}

/// 事件过滤器
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    /// 事件名过滤
    pub event_names: Option<Vec<String>>,
    /// 频道 ID 过滤
    pub channel_ids: Option<Vec<String>>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_names(mut self, names: Vec<String>) -> Self {
        self.event_names = Some(names);
        self
    }

    pub fn with_channel_ids(mut self, channel_ids: Vec<String>) -> Self {
        self.channel_ids = Some(channel_ids);
        self
    }

    pub fn matches(&self, event: &BridgeEvent) -> bool {
        if let Some(ref names) = self.event_names {
            if !names.iter().any(|n| n == &event.name) {
                return false;
            }
        }

        if let Some(ref channel_ids) = self.channel_ids {
            match event.channel_id() {
                Some(channel_id) => {
                    if !channel_ids.iter().any(|c| c == channel_id) {
                        return false;
                    }
                }
                // 事件没有频道ID但过滤器要求有
                None => return false,
            }
        }

        true
    }
}

/// 事件监听器类型
pub type EventListener = Box<dyn Fn(&BridgeEvent) + Send + Sync>;

/// 事件统计信息
#[derive(Debug, Clone, Default)]
pub struct EventStats {
    pub total_events: u64,
    pub events_by_name: HashMap<String, u64>,
    pub listener_count: usize,
    pub last_event_time: Option<i64>,
}

/// 事件管理器
pub struct EventManager {
    sender: broadcast::Sender<BridgeEvent>,
    listeners: Arc<tokio::sync::RwLock<HashMap<String, Vec<EventListener>>>>,
    stats: Arc<tokio::sync::RwLock<EventStats>>,
}

impl EventManager {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));

        Self {
            sender,
            listeners: Arc::new(tokio::sync::RwLock::new(HashMap::new())),
            stats: Arc::new(tokio::sync::RwLock::new(EventStats::default())),
        }
    }

    /// 发布事件
    pub async fn emit(&self, event: BridgeEvent) {
        debug!("Emitting event: {}", event.name);

        {
            let mut stats = self.stats.write().await;
            stats.total_events += 1;
            *stats.events_by_name.entry(event.name.clone()).or_insert(0) += 1;
            stats.last_event_time = Some(event.timestamp);
        }

        // 无订阅者时 send 会失败，属正常场景（宿主还没挂监听），仅打 debug
        if let Err(e) = self.sender.send(event.clone()) {
            debug!("Failed to broadcast event (no active receivers): {}", e);
        }

        let listeners = self.listeners.read().await;
        if let Some(named) = listeners.get(&event.name) {
            for listener in named {
                listener(&event);
            }
        }
        if let Some(general) = listeners.get("*") {
            for listener in general {
                listener(&event);
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.sender.subscribe()
    }

    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredEventReceiver {
        FilteredEventReceiver::new(self.sender.subscribe(), filter)
    }

    /// 添加监听器，`event_name` 为 "*" 时接收全部事件
    pub async fn add_listener<F>(&self, event_name: &str, listener: F)
    where
        F: Fn(&BridgeEvent) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.write().await;
        listeners
            .entry(event_name.to_string())
            .or_default()
            .push(Box::new(listener));

        let mut stats = self.stats.write().await;
        stats.listener_count = listeners.values().map(|v| v.len()).sum();

        info!("Added listener for event: {}", event_name);
    }

    pub async fn clear_listeners(&self) {
        let mut listeners = self.listeners.write().await;
        listeners.clear();

        let mut stats = self.stats.write().await;
        stats.listener_count = 0;

        info!("Cleared all event listeners");
    }

    pub async fn get_stats(&self) -> EventStats {
        self.stats.read().await.clone()
    }

    /// 活跃订阅者数量
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// 过滤事件接收器
pub struct FilteredEventReceiver {
    receiver: broadcast::Receiver<BridgeEvent>,
    filter: EventFilter,
}

impl FilteredEventReceiver {
    pub fn new(receiver: broadcast::Receiver<BridgeEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// 接收下一个匹配的事件
    pub async fn recv(&mut self) -> Result<BridgeEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// 非阻塞接收
    pub fn try_recv(&mut self) -> Result<BridgeEvent, broadcast::error::TryRecvError> {
        loop {
            let event = self.receiver.try_recv()?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}
