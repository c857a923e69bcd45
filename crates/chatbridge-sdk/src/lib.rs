//! ChatBridge SDK - 聊天 SDK 客户端的跨平台桥接层
//!
//! 把一个实时聊天 SDK 的客户端暴露给跨平台应用层，包括：
//! - 🔗 命令转发：初始化客户端、频道列表、发送消息、拉取消息、创建频道
//! - 📡 事件中继：SDK 推送回调 → 宿主事件（同步状态、频道增删改、新消息）
//! - 🧠 会话管理：单会话状态机、频道缓存、超时
//! - ⚙️ Method channel：带 id 的 JSON 信封，请求/响应关联
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chatbridge_sdk::{BridgeConfig, BridgeGateway, InMemoryBackend, SessionManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = InMemoryBackend::new().with_user("T1", "alice");
//!     backend.seed_channel("CH1", "General", &["alice", "bob"]).await;
//!
//!     let session = Arc::new(SessionManager::new(BridgeConfig::default(), Arc::new(backend)));
//!     let gateway = BridgeGateway::new(session);
//!
//!     gateway.invoke("initialize", &serde_json::json!({ "accessToken": "T1" })).await?;
//!     let channels = gateway.invoke("listChannels", &serde_json::Value::Null).await?;
//!     println!("频道: {}", channels);
//!
//!     gateway
//!         .invoke("sendMessage", &serde_json::json!({ "channelId": "CH1", "body": "hi" }))
//!         .await?;
//!     Ok(())
//! }
//! ```

// 导出核心模块
pub mod backend;
pub mod cache;
pub mod channel;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod logging;
pub mod memory;
pub mod model;
pub mod relay;
pub mod session;
pub mod version;

// 重新导出核心类型，方便使用
pub use backend::{
    callback_channel, CallbackReceiver, CallbackSender, ChannelHandle, ChatBackend, ChatClient,
    SdkCallback, SdkCallbackKind, SdkResult,
};
pub use cache::{CachedChannel, ChannelCache, GenerationGuard};
pub use channel::{Envelope, MethodChannel, MethodChannelClient, MethodChannelEndpoint};
pub use config::{BridgeConfig, BridgeConfigBuilder, EventConfig, MAX_FETCH_PAGE};
pub use error::{ChatBridgeError, Result, SdkError};
pub use events::{
    event_names, BridgeEvent, EventFilter, EventManager, EventStats, FilteredEventReceiver,
};
pub use gateway::{BridgeGateway, Command, MethodCall, MethodResponse};
pub use memory::{InMemoryBackend, MemoryOp};
pub use model::{ChannelSnapshot, ChannelType, ChannelUpdateReason, Message, SyncStatus};
pub use relay::{EventRelay, RelayContext};
pub use session::{SessionManager, SessionState};
pub use version::{version_string, SDK_VERSION};
