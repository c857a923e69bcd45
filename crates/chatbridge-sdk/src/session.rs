//! 会话管理
//!
//! 每个桥接实例最多一个会话。状态机：
//!
//! ```text
//! Uninitialized ──initialize──▶ Initializing ──ok──▶ Ready
//!        ▲                           │                  │
//!        │                           └──err/timeout──▶ Failed
//!        └──────────────shutdown────────────────────────┘
//! ```
//!
//! 重新 `initialize` 会替换旧客户端：会话代数 +1，旧的事件泵被取消，频道缓存清空。
//! 非 Ready 状态下所有频道/消息命令都返回 `NotReady`。

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::{
    callback_channel, CallbackReceiver, ChannelHandle, ChatBackend, ChatClient, SdkCallback,
    SdkResult,
};
use crate::cache::{CachedChannel, ChannelCache};
use crate::config::BridgeConfig;
use crate::error::{ChatBridgeError, Result, SdkError};
use crate::events::{BridgeEvent, EventFilter, EventManager, FilteredEventReceiver};
use crate::model::{ChannelSnapshot, ChannelType, Message, SyncStatus};
use crate::relay::EventRelay;

/// 初始化超时时随 onClientInitializationError 发出的错误码
pub const INIT_TIMEOUT_CODE: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Initializing => "initializing",
            SessionState::Ready => "ready",
            SessionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

struct ActiveSession {
    client: Arc<dyn ChatClient>,
    generation: u64,
    pump: CancellationToken,
}

pub struct SessionManager {
    config: BridgeConfig,
    backend: Arc<dyn ChatBackend>,
    cache: Arc<ChannelCache>,
    events: Arc<EventManager>,
    relay: Arc<EventRelay>,
    state: RwLock<SessionState>,
    sync_status: Arc<RwLock<SyncStatus>>,
    active: RwLock<Option<ActiveSession>>,
    generation: Arc<AtomicU64>,
    /// 串行化 initialize / shutdown
    lifecycle: Mutex<()>,
}

impl SessionManager {
    pub fn new(config: BridgeConfig, backend: Arc<dyn ChatBackend>) -> Self {
        let cache = Arc::new(ChannelCache::new());
        let events = Arc::new(EventManager::new(config.event_config.buffer_size));
        let relay = Arc::new(
            EventRelay::new(cache.clone(), events.clone())
                .with_capture_timeout(config.command_timeout()),
        );

        Self {
            config,
            backend,
            cache,
            events,
            relay,
            state: RwLock::new(SessionState::Uninitialized),
            sync_status: Arc::new(RwLock::new(SyncStatus::Unknown)),
            active: RwLock::new(None),
            generation: Arc::new(AtomicU64::new(0)),
            lifecycle: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventManager> {
        &self.events
    }

    pub fn relay(&self) -> &Arc<EventRelay> {
        &self.relay
    }

    pub fn cache(&self) -> &Arc<ChannelCache> {
        &self.cache
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredEventReceiver {
        self.events.subscribe_filtered(filter)
    }

    pub async fn session_state(&self) -> SessionState {
        *self.state.read().await
    }

    pub async fn sync_status(&self) -> SyncStatus {
        *self.sync_status.read().await
    }

    /// 当前会话代数（每次 initialize / shutdown 递增）
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// 用 access token 创建（或替换）SDK 客户端
    ///
    /// 失败时除了返回错误，还会发出 `onClientInitializationError`。
    pub async fn initialize(&self, token: &str) -> Result<()> {
        if token.trim().is_empty() {
            return Err(ChatBridgeError::invalid_argument(
                "accessToken",
                "must not be empty",
            ));
        }

        let _lifecycle = self.lifecycle.lock().await;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.state.write().await = SessionState::Initializing;
        *self.sync_status.write().await = SyncStatus::Unknown;
        self.teardown(generation).await;
        info!("Initializing chat session (generation {})", generation);

        let (callbacks, receiver) = callback_channel();
        let pump = CancellationToken::new();
        self.spawn_pump(receiver, generation, pump.clone());

        let outcome =
            tokio::time::timeout(self.config.init_timeout(), self.backend.connect(token, callbacks))
                .await;

        match outcome {
            Ok(Ok(client)) => {
                *self.active.write().await = Some(ActiveSession {
                    client,
                    generation,
                    pump,
                });
                *self.state.write().await = SessionState::Ready;
                info!("✅ Chat session ready (generation {})", generation);
                Ok(())
            }
            Ok(Err(sdk_error)) => {
                pump.cancel();
                error!("Chat client initialization failed: {}", sdk_error);
                self.fail_initialization(generation, sdk_error.clone()).await;
                Err(sdk_error.into())
            }
            Err(_) => {
                pump.cancel();
                let err = ChatBridgeError::timeout(self.config.init_timeout_secs);
                self.fail_initialization(generation, SdkError::new(INIT_TIMEOUT_CODE, &err))
                    .await;
                Err(err)
            }
        }
    }

    async fn fail_initialization(&self, generation: u64, error: SdkError) {
        *self.state.write().await = SessionState::Failed;
        self.relay
            .dispatch_in(generation, SdkCallback::ClientInitFailed(error))
            .await;
    }

    /// 释放客户端，回到 Uninitialized
    pub async fn shutdown(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.state.write().await = SessionState::Uninitialized;
        *self.sync_status.write().await = SyncStatus::Unknown;
        self.teardown(generation).await;
        info!("Chat session shut down");
        Ok(())
    }

    /// 缓存切换到 `generation`，然后释放旧客户端
    async fn teardown(&self, generation: u64) {
        self.cache.reset(generation).await;
        let previous = self.active.write().await.take();
        if let Some(previous) = previous {
            debug!("Releasing client of generation {}", previous.generation);
            previous.pump.cancel();
            if tokio::time::timeout(self.config.command_timeout(), previous.client.shutdown())
                .await
                .is_err()
            {
                warn!("Client shutdown timed out, dropping it");
            }
        }
    }

    /// 把 SDK 回调交给事件中继，直到被取消或回调通道关闭
    fn spawn_pump(&self, mut receiver: CallbackReceiver, generation: u64, token: CancellationToken) {
        let relay = self.relay.clone();
        let sync_status = self.sync_status.clone();
        let current = self.generation.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    callback = receiver.recv() => {
                        let Some(callback) = callback else { break };
                        if current.load(Ordering::SeqCst) != generation {
                            debug!("Dropping {:?} from stale generation {}", callback, generation);
                            break;
                        }
                        if let SdkCallback::ClientSynchronization(status) = &callback {
                            *sync_status.write().await = *status;
                        }
                        relay.dispatch_in(generation, callback).await;
                    }
                }
            }
            debug!("Event pump of generation {} stopped", generation);
        });
    }

    async fn ready_client(&self) -> Result<(Arc<dyn ChatClient>, u64)> {
        let state = *self.state.read().await;
        if state != SessionState::Ready {
            return Err(ChatBridgeError::NotReady { state });
        }
        match self.active.read().await.as_ref() {
            Some(active) => Ok((active.client.clone(), active.generation)),
            None => Err(ChatBridgeError::NotReady { state }),
        }
    }

    async fn with_timeout<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = SdkResult<T>>,
    {
        match tokio::time::timeout(self.config.command_timeout(), call).await {
            Ok(result) => result.map_err(ChatBridgeError::from),
            Err(_) => Err(ChatBridgeError::timeout(self.config.command_timeout_secs)),
        }
    }

    /// 会话在命令执行期间被替换
    async fn superseded(&self) -> ChatBridgeError {
        ChatBridgeError::NotReady {
            state: self.session_state().await,
        }
    }

    async fn cached_channel(&self, channel_id: &str) -> Result<Arc<dyn ChannelHandle>> {
        self.ready_client().await?;
        self.cache
            .handle(channel_id)
            .await
            .ok_or_else(|| ChatBridgeError::channel_not_found(channel_id))
    }

    /// 订阅的频道列表（保持 SDK 给出的顺序），同时整体重建缓存
    pub async fn list_channels(&self) -> Result<Vec<ChannelSnapshot>> {
        let (client, generation) = self.ready_client().await?;
        let handles = self.with_timeout(client.subscribed_channels()).await?;

        let limit = self.config.command_timeout();
        let captures = handles
            .into_iter()
            .map(|handle| CachedChannel::capture(handle, limit));
        let entries = futures::future::join_all(captures)
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        let snapshots: Vec<ChannelSnapshot> = entries.iter().map(|e| e.snapshot.clone()).collect();
        if !self.cache.replace_all_if(generation, entries).await {
            return Err(self.superseded().await);
        }
        debug!("Listed {} channels", snapshots.len());
        Ok(snapshots)
    }

    pub async fn send_message(&self, channel_id: &str, body: &str) -> Result<bool> {
        let channel = self.cached_channel(channel_id).await?;
        let message = self.with_timeout(channel.send_message(body)).await?;
        debug!("Sent message #{} to {}", message.index, channel_id);
        Ok(true)
    }

    /// 序号严格大于 `after_index` 的消息，升序，最多一页
    pub async fn fetch_messages(&self, channel_id: &str, after_index: u64) -> Result<Vec<Message>> {
        let channel = self.cached_channel(channel_id).await?;
        let limit = self.config.effective_page_limit();
        let start = after_index.saturating_add(1);

        let mut messages = self
            .with_timeout(channel.messages_after(start, limit))
            .await?;
        messages.retain(|m| m.index > after_index);
        messages.sort_by_key(|m| m.index);
        messages.truncate(limit as usize);
        Ok(messages)
    }

    /// 最新一条消息，频道为空时返回 None
    pub async fn fetch_last_message(&self, channel_id: &str) -> Result<Option<Message>> {
        let channel = self.cached_channel(channel_id).await?;
        let messages = self.with_timeout(channel.last_messages(1)).await?;
        Ok(messages.into_iter().max_by_key(|m| m.index))
    }

    pub async fn create_channel(
        &self,
        friendly_name: &str,
        channel_type: ChannelType,
    ) -> Result<ChannelSnapshot> {
        let (client, generation) = self.ready_client().await?;
        let handle = self
            .with_timeout(client.create_channel(friendly_name, channel_type))
            .await?;
        let entry = CachedChannel::capture(handle, self.config.command_timeout()).await?;
        let snapshot = entry.snapshot.clone();
        if !self.cache.upsert_if(generation, entry).await {
            return Err(self.superseded().await);
        }
        info!("Created channel {} ({})", snapshot.sid, snapshot.friendly_name);
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event_names;
    use crate::memory::{InMemoryBackend, MemoryOp, ERROR_INVALID_TOKEN};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn backend() -> InMemoryBackend {
        InMemoryBackend::new().with_user("T1", "alice")
    }

    fn manager(backend: &InMemoryBackend) -> SessionManager {
        SessionManager::new(BridgeConfig::default(), Arc::new(backend.clone()))
    }

    fn short_timeouts() -> BridgeConfig {
        BridgeConfig::builder()
            .command_timeout_secs(1)
            .init_timeout_secs(1)
            .build()
    }

    async fn wait_for_state(session: &SessionManager, expected: SessionState) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while session.session_state().await != expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    /// 成员列表要过一段时间才返回的频道
    struct SlowChannel {
        sid: String,
        delay: Duration,
    }

    #[async_trait]
    impl ChannelHandle for SlowChannel {
        fn sid(&self) -> String {
            self.sid.clone()
        }

        fn friendly_name(&self) -> String {
            "Ghost".to_string()
        }

        fn unique_name(&self) -> String {
            "ghost".to_string()
        }

        async fn members(&self) -> SdkResult<Vec<String>> {
            tokio::time::sleep(self.delay).await;
            Ok(vec!["alice".to_string()])
        }

        async fn send_message(&self, _body: &str) -> SdkResult<Message> {
            Err(SdkError::new(0, "read only"))
        }

        async fn messages_after(&self, _index: u64, _limit: u32) -> SdkResult<Vec<Message>> {
            Ok(Vec::new())
        }

        async fn last_messages(&self, _count: u32) -> SdkResult<Vec<Message>> {
            Ok(Vec::new())
        }
    }

    async fn next_named(rx: &mut broadcast::Receiver<BridgeEvent>, name: &str) -> BridgeEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = rx.recv().await.unwrap();
                if event.name == name {
                    return event;
                }
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_commands_before_initialize_are_not_ready() {
        let backend = backend();
        backend.seed_channel("CH1", "General", &["alice"]).await;
        let session = manager(&backend);
        let not_ready = ChatBridgeError::NotReady {
            state: SessionState::Uninitialized,
        };

        assert_eq!(session.list_channels().await.unwrap_err(), not_ready);
        assert_eq!(session.send_message("CH1", "hi").await.unwrap_err(), not_ready);
        assert_eq!(session.fetch_messages("CH1", 0).await.unwrap_err(), not_ready);
        assert_eq!(session.fetch_last_message("CH1").await.unwrap_err(), not_ready);
        assert_eq!(
            session
                .create_channel("x", ChannelType::Public)
                .await
                .unwrap_err(),
            not_ready
        );
    }

    #[tokio::test]
    async fn test_commands_while_initializing_are_not_ready() {
        let backend = backend();
        backend.seed_channel("CH1", "General", &["alice"]).await;
        let session = Arc::new(SessionManager::new(short_timeouts(), Arc::new(backend.clone())));

        backend.hang_next(MemoryOp::Connect);
        let pending = {
            let session = session.clone();
            tokio::spawn(async move { session.initialize("T1").await })
        };
        wait_for_state(&session, SessionState::Initializing).await;

        let not_ready = ChatBridgeError::NotReady {
            state: SessionState::Initializing,
        };
        assert_eq!(session.list_channels().await.unwrap_err(), not_ready);
        assert_eq!(session.send_message("CH1", "hi").await.unwrap_err(), not_ready);
        assert_eq!(session.fetch_messages("CH1", 0).await.unwrap_err(), not_ready);
        assert_eq!(session.fetch_last_message("CH1").await.unwrap_err(), not_ready);
        assert_eq!(
            session
                .create_channel("x", ChannelType::Public)
                .await
                .unwrap_err(),
            not_ready
        );

        let err = pending.await.unwrap().unwrap_err();
        assert_eq!(err.code(), "timeout");
    }

    #[tokio::test]
    async fn test_reinitialize_reports_initializing_while_old_client_releases() {
        let backend = backend();
        backend.seed_channel("CH1", "General", &["alice"]).await;
        let session = Arc::new(SessionManager::new(short_timeouts(), Arc::new(backend.clone())));
        session.initialize("T1").await.unwrap();
        session.list_channels().await.unwrap();

        backend.hang_next(MemoryOp::Shutdown);
        let reinit = {
            let session = session.clone();
            tokio::spawn(async move { session.initialize("T1").await })
        };
        wait_for_state(&session, SessionState::Initializing).await;
        assert_eq!(
            session.send_message("CH1", "hi").await.unwrap_err(),
            ChatBridgeError::NotReady {
                state: SessionState::Initializing
            }
        );

        reinit.await.unwrap().unwrap();
        assert_eq!(session.session_state().await, SessionState::Ready);
    }

    #[tokio::test]
    async fn test_old_session_channel_does_not_leak_into_new_cache() {
        let backend = backend().with_user("T2", "bob");
        let session = manager(&backend);
        let mut rx = session.subscribe();
        session.initialize("T1").await.unwrap();

        backend.push(SdkCallback::ChannelAdded(Arc::new(SlowChannel {
            sid: "GHOST".to_string(),
            delay: Duration::from_millis(300),
        })));
        tokio::time::sleep(Duration::from_millis(50)).await;

        session.initialize("T2").await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(!session.cache().contains("GHOST").await);
        while let Ok(event) = rx.try_recv() {
            assert_ne!(event.name, event_names::CHANNEL_ADDED);
        }
    }

    #[tokio::test]
    async fn test_hanging_members_time_out_without_stalling_events() {
        let backend = backend();
        backend.seed_channel("CH1", "General", &["alice"]).await;
        let session = SessionManager::new(short_timeouts(), Arc::new(backend.clone()));
        session.initialize("T1").await.unwrap();
        session.list_channels().await.unwrap();
        let mut rx = session.subscribe();

        backend.hang_always(MemoryOp::Members);
        let err = session
            .create_channel("Team", ChannelType::Public)
            .await
            .unwrap_err();
        assert_eq!(err, ChatBridgeError::Timeout { timeout_secs: 1 });
        assert_eq!(
            session.list_channels().await.unwrap_err(),
            ChatBridgeError::Timeout { timeout_secs: 1 }
        );

        // SDK 推送的 ChannelAdded 退回空成员列表，后续回调照常处理
        let added = next_named(&mut rx, event_names::CHANNEL_ADDED).await;
        assert_eq!(added.payload["friendlyName"], "Team");
        assert_eq!(added.payload["members"], serde_json::json!([]));

        backend.set_sync_status(SyncStatus::Failed).await;
        loop {
            let event = next_named(&mut rx, event_names::CLIENT_SYNCHRONIZATION).await;
            if event.payload["status"] == "failed" {
                break;
            }
        }
        assert_eq!(session.sync_status().await, SyncStatus::Failed);
    }

    #[tokio::test]
    async fn test_scenario_send_then_read_back() {
        let backend = backend();
        backend.seed_channel("CH1", "General", &["alice", "bob"]).await;
        let session = manager(&backend);

        assert_ok!(session.initialize("T1").await);
        assert_eq!(session.session_state().await, SessionState::Ready);

        let channels = session.list_channels().await.unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].sid, "CH1");
        assert_eq!(channels[0].friendly_name, "General");
        assert_eq!(channels[0].members, vec!["alice".to_string(), "bob".to_string()]);

        assert!(session.send_message("CH1", "hi").await.unwrap());
        let last = session.fetch_last_message("CH1").await.unwrap().unwrap();
        assert_eq!(last.body, "hi");
        assert_eq!(last.author, "alice");
        assert_eq!(last.channel_sid, "CH1");
        assert_eq!(last.index, 0);
    }

    #[tokio::test]
    async fn test_uncached_channel_is_not_found() {
        let backend = backend();
        backend.seed_channel("CH1", "General", &["alice"]).await;
        let session = manager(&backend);
        session.initialize("T1").await.unwrap();

        // 还没有 listChannels，缓存为空
        let err = session.send_message("CH1", "hi").await.unwrap_err();
        assert_eq!(err, ChatBridgeError::channel_not_found("CH1"));

        session.list_channels().await.unwrap();
        assert_ok!(session.send_message("CH1", "hi").await);
        let err = session.fetch_messages("CH404", 0).await.unwrap_err();
        assert_eq!(err.code(), "channel_not_found");
    }

    #[tokio::test]
    async fn test_fetch_messages_is_strictly_after_and_capped() {
        let backend = backend();
        backend.seed_channel("CH1", "General", &["alice", "bob"]).await;
        for i in 0..320 {
            backend
                .post_message("CH1", "bob", &format!("m{}", i))
                .await
                .unwrap();
        }
        let session = manager(&backend);
        session.initialize("T1").await.unwrap();
        session.list_channels().await.unwrap();

        let page = session.fetch_messages("CH1", 4).await.unwrap();
        assert_eq!(page.len(), 300);
        assert_eq!(page[0].index, 5);
        assert!(page.windows(2).all(|w| w[0].index < w[1].index));

        let tail = session.fetch_messages("CH1", 317).await.unwrap();
        let indexes: Vec<u64> = tail.iter().map(|m| m.index).collect();
        assert_eq!(indexes, vec![318, 319]);

        assert!(session.fetch_messages("CH1", 319).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_last_message_of_empty_channel_is_none() {
        let backend = backend();
        backend.seed_channel("CH1", "General", &["alice"]).await;
        let session = manager(&backend);
        session.initialize("T1").await.unwrap();
        session.list_channels().await.unwrap();

        assert_eq!(session.fetch_last_message("CH1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_token_fails_and_emits_event() {
        let backend = backend();
        let session = manager(&backend);
        let mut rx = session.subscribe();

        let err = session.initialize("bad").await.unwrap_err();
        assert_eq!(
            err,
            ChatBridgeError::Sdk {
                code: ERROR_INVALID_TOKEN,
                message: "Invalid Access Token".to_string(),
            }
        );
        assert_eq!(session.session_state().await, SessionState::Failed);

        let event = next_named(&mut rx, event_names::CLIENT_INITIALIZATION_ERROR).await;
        assert_eq!(event.payload["errorCode"], "20101");

        let err = session.list_channels().await.unwrap_err();
        assert_eq!(
            err,
            ChatBridgeError::NotReady {
                state: SessionState::Failed
            }
        );
    }

    #[tokio::test]
    async fn test_hanging_sdk_calls_time_out() {
        let backend = backend();
        backend.seed_channel("CH1", "General", &["alice"]).await;
        let config = BridgeConfig::builder()
            .command_timeout_secs(1)
            .init_timeout_secs(1)
            .build();
        let session = SessionManager::new(config, Arc::new(backend.clone()));

        backend.hang_next(MemoryOp::Connect);
        let err = assert_err!(session.initialize("T1").await);
        assert_eq!(err, ChatBridgeError::Timeout { timeout_secs: 1 });
        assert_eq!(session.session_state().await, SessionState::Failed);

        session.initialize("T1").await.unwrap();
        session.list_channels().await.unwrap();
        backend.hang_always(MemoryOp::SendMessage);
        let err = session.send_message("CH1", "hi").await.unwrap_err();
        assert_eq!(err.code(), "timeout");
    }

    #[tokio::test]
    async fn test_sync_status_follows_callbacks() {
        let backend = backend();
        let session = manager(&backend);
        let mut rx = session.subscribe();
        session.initialize("T1").await.unwrap();

        let event = next_named(&mut rx, event_names::CLIENT_SYNCHRONIZATION).await;
        assert_eq!(event.payload["status"], "started");
        loop {
            let event = next_named(&mut rx, event_names::CLIENT_SYNCHRONIZATION).await;
            if event.payload["status"] == "completed" {
                break;
            }
        }
        assert_eq!(session.sync_status().await, SyncStatus::Completed);
    }

    #[tokio::test]
    async fn test_channel_events_update_cache() {
        let backend = backend();
        backend.seed_channel("CH1", "General", &["alice"]).await;
        let session = manager(&backend);
        let mut rx = session.subscribe();
        session.initialize("T1").await.unwrap();
        session.list_channels().await.unwrap();

        backend.add_channel("CH2", "Random", &["alice", "carol"]).await;
        let added = next_named(&mut rx, event_names::CHANNEL_ADDED).await;
        assert_eq!(added.payload["sid"], "CH2");
        assert!(session.cache().contains("CH2").await);

        backend.post_message("CH2", "carol", "yo").await.unwrap();
        let message = next_named(&mut rx, event_names::CHANNEL_MESSAGE_ADDED).await;
        assert_eq!(message.payload["channelSid"], "CH2");
        assert_eq!(message.payload["author"], "carol");

        backend.delete_channel("CH1").await.unwrap();
        next_named(&mut rx, event_names::CHANNEL_DELETED).await;
        assert!(!session.cache().contains("CH1").await);
    }

    #[tokio::test]
    async fn test_create_channel_returns_snapshot() {
        let backend = backend();
        let session = manager(&backend);
        session.initialize("T1").await.unwrap();

        let snapshot = session
            .create_channel("Project X", ChannelType::Private)
            .await
            .unwrap();
        assert!(snapshot.sid.starts_with("CH"));
        assert_eq!(snapshot.friendly_name, "Project X");
        assert_eq!(snapshot.members, vec!["alice".to_string()]);
        assert_ok!(session.send_message(&snapshot.sid, "first").await);

        backend.fail_next(MemoryOp::CreateChannel, SdkError::new(50107, "nope"));
        let err = session
            .create_channel("Project Y", ChannelType::Public)
            .await
            .unwrap_err();
        assert!(err.is_sdk_error());
    }

    #[tokio::test]
    async fn test_reinitialize_replaces_session() {
        let backend = backend().with_user("T2", "bob");
        backend.seed_channel("CH1", "General", &["alice"]).await;
        backend.seed_channel("CH2", "Random", &["bob"]).await;
        let session = manager(&backend);

        session.initialize("T1").await.unwrap();
        let first = session.generation();
        session.list_channels().await.unwrap();
        assert!(session.cache().contains("CH1").await);

        session.initialize("T2").await.unwrap();
        assert!(session.generation() > first);
        assert!(session.cache().is_empty().await);
        let channels = session.list_channels().await.unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].sid, "CH2");
        assert_eq!(backend.connected_identity().as_deref(), Some("bob"));

        session.shutdown().await.unwrap();
        assert_eq!(session.session_state().await, SessionState::Uninitialized);
        assert_eq!(
            session.list_channels().await.unwrap_err().code(),
            "not_ready"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_list_and_update_keep_valid_snapshot() {
        let backend = backend();
        backend.seed_channel("CH1", "General", &["alice", "bob"]).await;
        let session = Arc::new(manager(&backend));
        session.initialize("T1").await.unwrap();
        session.list_channels().await.unwrap();

        for round in 0..20 {
            let name = if round % 2 == 0 { "Lobby" } else { "General" };
            let lister = {
                let session = session.clone();
                tokio::spawn(async move { session.list_channels().await })
            };
            let renamer = {
                let backend = backend.clone();
                let name = name.to_string();
                tokio::spawn(async move { backend.rename_channel("CH1", &name).await })
            };
            lister.await.unwrap().unwrap();
            renamer.await.unwrap().unwrap();

            let snapshot = session.cache().snapshot("CH1").await.unwrap();
            assert!(snapshot.friendly_name == "Lobby" || snapshot.friendly_name == "General");
            assert_eq!(snapshot.members, vec!["alice".to_string(), "bob".to_string()]);
        }
    }
}
