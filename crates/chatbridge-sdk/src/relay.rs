//! 事件中继
//!
//! 把 SDK 推送的回调投影为宿主事件。每个回调最多产生一个事件，不缓冲、不合并。
//! 哪些回调会被转发由显式的分发表决定（[`SdkCallbackKind`] → 投影函数），
//! 默认表见 [`EventRelay::new`]；其余回调只打 debug 日志，宿主可以用
//! [`EventRelay::register`] 追加投影。
//!
//! 频道相关回调在发出事件之前先更新频道缓存。缓存写入和事件发出都在同一把
//! 校验过会话代数的写锁内完成，属于旧会话的回调在这里被丢弃。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::json;
use tracing::{debug, warn};

use crate::backend::{ChannelHandle, SdkCallback, SdkCallbackKind};
use crate::cache::{CachedChannel, ChannelCache, GenerationGuard};
use crate::config::DEFAULT_COMMAND_TIMEOUT_SECS;
use crate::events::{event_names, BridgeEvent, EventManager};
use crate::model::ChannelSnapshot;

/// 投影函数的输入
pub struct RelayContext<'a> {
    pub callback: &'a SdkCallback,
    /// 频道类回调在缓存更新后的快照（ChannelAdded / ChannelUpdated）
    pub snapshot: Option<&'a ChannelSnapshot>,
    /// 回调关联的频道是否在缓存中
    pub channel_cached: bool,
}

/// 返回 None 表示这次回调不产生事件
pub type ProjectFn = dyn Fn(&RelayContext<'_>) -> Option<serde_json::Value> + Send + Sync;

#[derive(Clone)]
struct Projection {
    event_name: String,
    project: Arc<ProjectFn>,
}

pub struct EventRelay {
    cache: Arc<ChannelCache>,
    events: Arc<EventManager>,
    table: RwLock<HashMap<SdkCallbackKind, Projection>>,
    /// 拉取频道成员的超时
    capture_timeout: Duration,
}

impl EventRelay {
    /// 使用默认分发表创建
    ///
    /// | 回调 | 事件 |
    /// |---|---|
    /// | ClientSynchronization | onClientSynchronization |
    /// | ClientInitFailed | onClientInitializationError |
    /// | ChannelAdded | onChannelAdded |
    /// | ChannelUpdated | onChannelUpdated |
    /// | ChannelDeleted | onChannelDeleted |
    /// | MessageAdded（已缓存频道） | channelOnMessageAdded |
    pub fn new(cache: Arc<ChannelCache>, events: Arc<EventManager>) -> Self {
        let relay = Self {
            cache,
            events,
            table: RwLock::new(HashMap::new()),
            capture_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
        };
        relay.register(
            SdkCallbackKind::ClientSynchronization,
            event_names::CLIENT_SYNCHRONIZATION,
            project_sync_status,
        );
        relay.register(
            SdkCallbackKind::ClientInitFailed,
            event_names::CLIENT_INITIALIZATION_ERROR,
            project_init_error,
        );
        relay.register(
            SdkCallbackKind::ChannelAdded,
            event_names::CHANNEL_ADDED,
            project_channel_added,
        );
        relay.register(
            SdkCallbackKind::ChannelUpdated,
            event_names::CHANNEL_UPDATED,
            project_channel_updated,
        );
        relay.register(
            SdkCallbackKind::ChannelDeleted,
            event_names::CHANNEL_DELETED,
            project_channel_deleted,
        );
        relay.register(
            SdkCallbackKind::MessageAdded,
            event_names::CHANNEL_MESSAGE_ADDED,
            project_message_added,
        );
        relay
    }

    pub fn with_capture_timeout(mut self, limit: Duration) -> Self {
        self.capture_timeout = limit;
        self
    }

    /// 注册（或替换）一个回调种类的投影
    pub fn register<F>(&self, kind: SdkCallbackKind, event_name: &str, project: F)
    where
        F: Fn(&RelayContext<'_>) -> Option<serde_json::Value> + Send + Sync + 'static,
    {
        debug!("Relay {:?} -> {}", kind, event_name);
        self.table.write().insert(
            kind,
            Projection {
                event_name: event_name.to_string(),
                project: Arc::new(project),
            },
        );
    }

    pub fn unregister(&self, kind: SdkCallbackKind) -> bool {
        self.table.write().remove(&kind).is_some()
    }

    pub fn is_relayed(&self, kind: SdkCallbackKind) -> bool {
        self.table.read().contains_key(&kind)
    }

    /// 当前会转发的回调种类与事件名
    pub fn relayed(&self) -> Vec<(SdkCallbackKind, String)> {
        self.table
            .read()
            .iter()
            .map(|(kind, p)| (*kind, p.event_name.clone()))
            .collect()
    }

    pub fn events(&self) -> &Arc<EventManager> {
        &self.events
    }

    /// 按缓存当前的会话代数处理一条回调
    pub async fn dispatch(&self, callback: SdkCallback) -> Option<BridgeEvent> {
        let generation = self.cache.generation().await;
        self.dispatch_in(generation, callback).await
    }

    /// 处理属于第 `generation` 代会话的一条回调：先更新缓存，再按分发表投影并发出事件
    ///
    /// 返回实际发出的事件（代数已过期、没有投影或投影返回 None 时为 None）。
    pub async fn dispatch_in(&self, generation: u64, callback: SdkCallback) -> Option<BridgeEvent> {
        let captured = match &callback {
            SdkCallback::ChannelAdded(handle) | SdkCallback::ChannelUpdated { channel: handle, .. } => {
                Some(self.capture(handle.clone()).await)
            }
            _ => None,
        };

        let Some(mut cache) = self.cache.lock_generation(generation).await else {
            debug!("Dropping {:?} from stale generation {}", callback, generation);
            return None;
        };

        let snapshot = apply_cache_effects(&mut cache, &callback, captured);
        let channel_cached = match &callback {
            SdkCallback::MessageAdded(m)
            | SdkCallback::MessageUpdated(m)
            | SdkCallback::MessageDeleted(m) => cache.contains(&m.channel_sid),
            _ => snapshot.is_some(),
        };

        let projection = self.table.read().get(&callback.kind()).cloned();
        let projection = match projection {
            Some(p) => p,
            None => {
                debug!("No relay for {:?}, ignored", callback);
                return None;
            }
        };

        let ctx = RelayContext {
            callback: &callback,
            snapshot: snapshot.as_ref(),
            channel_cached,
        };
        let payload = match (projection.project)(&ctx) {
            Some(payload) => payload,
            None => {
                debug!("Relay for {:?} produced no event", callback);
                return None;
            }
        };

        let event = BridgeEvent::new(projection.event_name, payload);
        self.events.emit(event.clone()).await;
        drop(cache);
        Some(event)
    }

    /// 拉取成员超时的频道沿用缓存里的成员列表
    async fn capture(&self, handle: Arc<dyn ChannelHandle>) -> CachedChannel {
        match CachedChannel::capture(handle.clone(), self.capture_timeout).await {
            Ok(entry) => entry,
            Err(e) => {
                let sid = handle.sid();
                warn!("Loading members of channel {} failed: {}, keeping cached members", sid, e);
                let members = self
                    .cache
                    .snapshot(&sid)
                    .await
                    .map(|s| s.members)
                    .unwrap_or_default();
                CachedChannel::new(handle, members)
            }
        }
    }
}

fn apply_cache_effects(
    cache: &mut GenerationGuard<'_>,
    callback: &SdkCallback,
    captured: Option<CachedChannel>,
) -> Option<ChannelSnapshot> {
    match callback {
        SdkCallback::ChannelAdded(_) | SdkCallback::ChannelUpdated { .. } => {
            let entry = captured?;
            let snapshot = entry.snapshot.clone();
            cache.upsert(entry);
            Some(snapshot)
        }
        SdkCallback::ChannelDeleted(handle) => {
            let sid = handle.sid();
            if cache.remove(&sid).is_none() {
                warn!("Deleted channel {} was not cached", sid);
            }
            None
        }
        _ => None,
    }
}

fn project_sync_status(ctx: &RelayContext<'_>) -> Option<serde_json::Value> {
    match ctx.callback {
        SdkCallback::ClientSynchronization(status) => {
            Some(json!({ "status": status, "value": status.value() }))
        }
        _ => None,
    }
}

fn project_init_error(ctx: &RelayContext<'_>) -> Option<serde_json::Value> {
    match ctx.callback {
        SdkCallback::ClientInitFailed(error) => Some(json!({
            "errorMessage": error.message,
            "errorCode": error.code.to_string(),
        })),
        _ => None,
    }
}

fn project_channel_added(ctx: &RelayContext<'_>) -> Option<serde_json::Value> {
    ctx.snapshot.and_then(|s| serde_json::to_value(s).ok())
}

fn project_channel_updated(ctx: &RelayContext<'_>) -> Option<serde_json::Value> {
    match ctx.callback {
        SdkCallback::ChannelUpdated { channel, reason } => Some(json!({
            "channelId": channel.sid(),
            "updateReason": reason,
        })),
        _ => None,
    }
}

fn project_channel_deleted(ctx: &RelayContext<'_>) -> Option<serde_json::Value> {
    match ctx.callback {
        SdkCallback::ChannelDeleted(channel) => Some(json!({ "channelId": channel.sid() })),
        _ => None,
    }
}

/// 只转发已缓存（已订阅）频道的新消息
fn project_message_added(ctx: &RelayContext<'_>) -> Option<serde_json::Value> {
    match ctx.callback {
        SdkCallback::MessageAdded(message) if ctx.channel_cached => {
            serde_json::to_value(message).ok()
        }
        _ => None,
    }
}
