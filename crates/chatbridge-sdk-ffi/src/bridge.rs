//! Main bridge interface for FFI

use std::collections::HashMap;
use std::sync::Arc;

use chatbridge_sdk::{BridgeGateway, ChatBackend, InMemoryBackend, SessionManager};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    config::BridgeConfig,
    error::ChatBridgeFfiError,
    events::{dispatch_to_delegate, BridgeDelegate, ChannelEntry, ChannelType, MessageEntry, SessionInfo},
    helpers::get_runtime,
};

/// 所有 FFI 入口调用时打 debug 日志
macro_rules! bridge_ffi_log {
    ($name:expr) => {
        debug!("chatbridge ffi->{}()", $name);
    };
}

/// Main bridge handle for FFI consumers
#[derive(uniffi::Object)]
pub struct ChatBridge {
    session: Arc<SessionManager>,
    gateway: BridgeGateway,
    /// Present when the bridge runs against the in-memory SDK
    memory: Option<InMemoryBackend>,
    /// Callback delegate for real-time event notifications
    delegate: Arc<RwLock<Option<Box<dyn BridgeDelegate>>>>,
    /// Event listener task handle
    event_listener_handle: tokio::task::JoinHandle<()>,
}

impl ChatBridge {
    /// Build a bridge over any SDK backend (Rust callers only)
    pub fn with_backend(config: BridgeConfig, backend: Arc<dyn ChatBackend>) -> Self {
        Self::build(config, backend, None)
    }

    fn build(
        config: BridgeConfig,
        backend: Arc<dyn ChatBackend>,
        memory: Option<InMemoryBackend>,
    ) -> Self {
        let session = Arc::new(SessionManager::new(config.into(), backend));
        let gateway = BridgeGateway::new(session.clone());
        let delegate: Arc<RwLock<Option<Box<dyn BridgeDelegate>>>> = Arc::new(RwLock::new(None));
        let event_listener_handle = Self::start_event_listener(session.clone(), delegate.clone());

        Self {
            session,
            gateway,
            memory,
            delegate,
            event_listener_handle,
        }
    }

    fn start_event_listener(
        session: Arc<SessionManager>,
        delegate: Arc<RwLock<Option<Box<dyn BridgeDelegate>>>>,
    ) -> tokio::task::JoinHandle<()> {
        let mut receiver = session.subscribe();
        get_runtime().spawn(async move {
            info!("Event listener task started");
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        let guard = delegate.read().await;
                        match guard.as_ref() {
                            Some(delegate) => dispatch_to_delegate(delegate.as_ref(), &event),
                            None => debug!("No delegate, dropping event {}", event.name),
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Event listener lagged, {} events skipped", skipped);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            info!("Event listener task stopped");
        })
    }
}

#[uniffi::export]
impl ChatBridge {
    /// Create a bridge backed by the in-memory SDK
    ///
    /// `users` maps access tokens to identities.
    #[uniffi::constructor]
    pub fn new_in_memory(config: BridgeConfig, users: HashMap<String, String>) -> Self {
        bridge_ffi_log!("new_in_memory");
        let backend = users
            .iter()
            .fold(InMemoryBackend::new(), |backend, (token, identity)| {
                backend.with_user(token, identity)
            });
        Self::build(config, Arc::new(backend.clone()), Some(backend))
    }

    /// Set the callback delegate for real-time event notifications
    pub fn set_delegate(&self, delegate: Box<dyn BridgeDelegate>) {
        bridge_ffi_log!("set_delegate");
        let delegate_arc = self.delegate.clone();
        get_runtime().block_on(async move {
            *delegate_arc.write().await = Some(delegate);
            info!("✅ Delegate set successfully");
        });
    }

    /// Remove the callback delegate
    pub fn remove_delegate(&self) {
        bridge_ffi_log!("remove_delegate");
        let delegate_arc = self.delegate.clone();
        get_runtime().block_on(async move {
            *delegate_arc.write().await = None;
            info!("Delegate removed");
        });
    }

    /// Create (or replace) the SDK client with an access token
    pub fn initialize(&self, access_token: String) -> Result<(), ChatBridgeFfiError> {
        bridge_ffi_log!("initialize");
        let session = self.session.clone();
        get_runtime().block_on(async move { Ok(session.initialize(&access_token).await?) })
    }

    pub fn list_channels(&self) -> Result<Vec<ChannelEntry>, ChatBridgeFfiError> {
        bridge_ffi_log!("list_channels");
        let session = self.session.clone();
        get_runtime().block_on(async move {
            let channels = session.list_channels().await?;
            Ok(channels.into_iter().map(Into::into).collect())
        })
    }

    pub fn send_message(&self, channel_id: String, body: String) -> Result<bool, ChatBridgeFfiError> {
        bridge_ffi_log!("send_message");
        let session = self.session.clone();
        get_runtime().block_on(async move { Ok(session.send_message(&channel_id, &body).await?) })
    }

    /// Messages with index strictly greater than `after_index`, ascending
    pub fn fetch_messages(
        &self,
        channel_id: String,
        after_index: u64,
    ) -> Result<Vec<MessageEntry>, ChatBridgeFfiError> {
        bridge_ffi_log!("fetch_messages");
        let session = self.session.clone();
        get_runtime().block_on(async move {
            let messages = session.fetch_messages(&channel_id, after_index).await?;
            Ok(messages.into_iter().map(Into::into).collect())
        })
    }

    pub fn fetch_last_message(
        &self,
        channel_id: String,
    ) -> Result<Option<MessageEntry>, ChatBridgeFfiError> {
        bridge_ffi_log!("fetch_last_message");
        let session = self.session.clone();
        get_runtime().block_on(async move {
            Ok(session.fetch_last_message(&channel_id).await?.map(Into::into))
        })
    }

    pub fn create_channel(
        &self,
        friendly_name: String,
        channel_type: ChannelType,
    ) -> Result<ChannelEntry, ChatBridgeFfiError> {
        bridge_ffi_log!("create_channel");
        let session = self.session.clone();
        get_runtime().block_on(async move {
            let channel = session
                .create_channel(&friendly_name, channel_type.into())
                .await?;
            Ok(channel.into())
        })
    }

    pub fn session_info(&self) -> SessionInfo {
        bridge_ffi_log!("session_info");
        let session = self.session.clone();
        get_runtime().block_on(async move {
            SessionInfo {
                state: session.session_state().await.into(),
                sync_status: session.sync_status().await.into(),
            }
        })
    }

    pub fn shutdown(&self) -> Result<(), ChatBridgeFfiError> {
        bridge_ffi_log!("shutdown");
        let session = self.session.clone();
        get_runtime().block_on(async move { Ok(session.shutdown().await?) })
    }

    /// Method-channel style entry: `arguments_json` is a JSON object (or empty),
    /// the result is the JSON-encoded success payload.
    pub fn invoke_method(
        &self,
        method: String,
        arguments_json: String,
    ) -> Result<String, ChatBridgeFfiError> {
        bridge_ffi_log!(method);
        let arguments = if arguments_json.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&arguments_json)
                .map_err(|_| ChatBridgeFfiError::invalid_parameter("arguments", "must be valid JSON"))?
        };

        let gateway = self.gateway.clone();
        get_runtime().block_on(async move {
            let result = gateway.invoke(&method, &arguments).await?;
            Ok(serde_json::to_string(&result)?)
        })
    }

    /// Add a channel to the in-memory SDK (no callback is pushed)
    pub fn seed_channel(
        &self,
        sid: String,
        friendly_name: String,
        members: Vec<String>,
    ) -> Result<(), ChatBridgeFfiError> {
        bridge_ffi_log!("seed_channel");
        let memory = self.memory.clone().ok_or_else(|| {
            ChatBridgeFfiError::generic("seed_channel requires the in-memory backend")
        })?;
        get_runtime().block_on(async move {
            let members: Vec<&str> = members.iter().map(String::as_str).collect();
            memory.seed_channel(&sid, &friendly_name, &members).await;
        });
        Ok(())
    }

    /// Post a message from another member through the in-memory SDK
    pub fn simulate_incoming_message(
        &self,
        channel_id: String,
        author: String,
        body: String,
    ) -> Result<MessageEntry, ChatBridgeFfiError> {
        bridge_ffi_log!("simulate_incoming_message");
        let memory = self.memory.clone().ok_or_else(|| {
            ChatBridgeFfiError::generic("simulate_incoming_message requires the in-memory backend")
        })?;
        get_runtime().block_on(async move {
            let message = memory
                .post_message(&channel_id, &author, &body)
                .await
                .map_err(chatbridge_sdk::ChatBridgeError::from)?;
            Ok(message.into())
        })
    }
}

impl Drop for ChatBridge {
    fn drop(&mut self) {
        self.event_listener_handle.abort();
    }
}
