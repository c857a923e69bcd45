//! 频道缓存
//!
//! 频道 ID → (SDK 句柄, 快照) 的唯一拥有者。命令路径（listChannels）和事件路径
//! （channelAdded/Updated/Deleted）都只能通过这里的方法读写，每次修改在同一把
//! 写锁内完成，整条记录整体替换，不会出现两个快照字段交错的情况。
//!
//! 缓存记录自己属于哪一代会话。所有写操作都带上调用方看到的代数，在写锁内
//! 比较，代数不一致的写入直接丢弃，旧会话的回调不会污染新会话的缓存。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, RwLockWriteGuard};
use tracing::{debug, warn};

use crate::backend::ChannelHandle;
use crate::error::{ChatBridgeError, Result};
use crate::model::ChannelSnapshot;

/// 缓存条目
#[derive(Clone)]
pub struct CachedChannel {
    pub handle: Arc<dyn ChannelHandle>,
    pub snapshot: ChannelSnapshot,
}

impl CachedChannel {
    pub fn new(handle: Arc<dyn ChannelHandle>, members: Vec<String>) -> Self {
        let snapshot = ChannelSnapshot {
            sid: handle.sid(),
            friendly_name: handle.friendly_name(),
            unique_name: handle.unique_name(),
            members,
        };
        Self { handle, snapshot }
    }

    /// 读取句柄当前的状态生成快照
    ///
    /// 成员列表拉取失败时按空列表处理，频道本身仍然可用；
    /// 超过 `limit` 没有返回则报 `Timeout`。
    pub async fn capture(handle: Arc<dyn ChannelHandle>, limit: Duration) -> Result<Self> {
        let members = match tokio::time::timeout(limit, handle.members()).await {
            Ok(Ok(members)) => members,
            Ok(Err(e)) => {
                warn!("Failed to load members of channel {}: {}", handle.sid(), e);
                Vec::new()
            }
            Err(_) => return Err(ChatBridgeError::timeout(limit.as_secs())),
        };
        Ok(Self::new(handle, members))
    }
}

impl std::fmt::Debug for CachedChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedChannel")
            .field("snapshot", &self.snapshot)
            .finish()
    }
}

#[derive(Default)]
struct CacheState {
    generation: u64,
    channels: HashMap<String, CachedChannel>,
}

#[derive(Default)]
pub struct ChannelCache {
    state: RwLock<CacheState>,
}

/// 持有写锁、且代数已校验的缓存视图
pub struct GenerationGuard<'a> {
    state: RwLockWriteGuard<'a, CacheState>,
}

impl GenerationGuard<'_> {
    pub fn generation(&self) -> u64 {
        self.state.generation
    }

    /// 清空并整体重建（listChannels 的语义）
    pub fn replace_all(&mut self, entries: Vec<CachedChannel>) {
        self.state.channels.clear();
        for entry in entries {
            self.state.channels.insert(entry.snapshot.sid.clone(), entry);
        }
        debug!("Channel cache rebuilt, size: {}", self.state.channels.len());
    }

    /// 插入或整体替换一条
    pub fn upsert(&mut self, entry: CachedChannel) {
        debug!("Channel cache upsert: {}", entry.snapshot.sid);
        self.state.channels.insert(entry.snapshot.sid.clone(), entry);
    }

    pub fn remove(&mut self, sid: &str) -> Option<ChannelSnapshot> {
        let removed = self.state.channels.remove(sid).map(|entry| entry.snapshot);
        debug!("Channel cache remove: {} (present: {})", sid, removed.is_some());
        removed
    }

    pub fn snapshot(&self, sid: &str) -> Option<ChannelSnapshot> {
        self.state.channels.get(sid).map(|entry| entry.snapshot.clone())
    }

    pub fn contains(&self, sid: &str) -> bool {
        self.state.channels.contains_key(sid)
    }
}

impl ChannelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 缓存当前所属的会话代数
    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }

    /// 清空并切换到新的会话代数
    pub async fn reset(&self, generation: u64) {
        let mut state = self.state.write().await;
        state.channels.clear();
        state.generation = generation;
        debug!("Channel cache reset for generation {}", generation);
    }

    /// 获取写锁；代数已经变化时返回 None
    pub async fn lock_generation(&self, generation: u64) -> Option<GenerationGuard<'_>> {
        let state = self.state.write().await;
        if state.generation != generation {
            debug!(
                "Channel cache is at generation {}, rejecting writer from {}",
                state.generation, generation
            );
            return None;
        }
        Some(GenerationGuard { state })
    }

    /// 代数一致时整体重建，返回是否写入
    pub async fn replace_all_if(&self, generation: u64, entries: Vec<CachedChannel>) -> bool {
        match self.lock_generation(generation).await {
            Some(mut guard) => {
                guard.replace_all(entries);
                true
            }
            None => false,
        }
    }

    /// 代数一致时插入或替换，返回是否写入
    pub async fn upsert_if(&self, generation: u64, entry: CachedChannel) -> bool {
        match self.lock_generation(generation).await {
            Some(mut guard) => {
                guard.upsert(entry);
                true
            }
            None => false,
        }
    }

    pub async fn handle(&self, sid: &str) -> Option<Arc<dyn ChannelHandle>> {
        self.state
            .read()
            .await
            .channels
            .get(sid)
            .map(|entry| entry.handle.clone())
    }

    pub async fn snapshot(&self, sid: &str) -> Option<ChannelSnapshot> {
        self.state
            .read()
            .await
            .channels
            .get(sid)
            .map(|entry| entry.snapshot.clone())
    }

    /// 所有快照，按 sid 排序
    pub async fn snapshots(&self) -> Vec<ChannelSnapshot> {
        let state = self.state.read().await;
        let mut snapshots: Vec<ChannelSnapshot> =
            state.channels.values().map(|entry| entry.snapshot.clone()).collect();
        snapshots.sort_by(|a, b| a.sid.cmp(&b.sid));
        snapshots
    }

    pub async fn contains(&self, sid: &str) -> bool {
        self.state.read().await.channels.contains_key(sid)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.channels.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.channels.is_empty()
    }
}
