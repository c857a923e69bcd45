//! 被包装的聊天 SDK 能力接口
//!
//! 桥接层不关心连接、重试、持久化，这些都由具体 SDK 完成。这里只定义桥接层
//! 需要的最小能力：
//! - [`ChatBackend`]：用 token 创建客户端
//! - [`ChatClient`]：订阅的频道列表、创建频道
//! - [`ChannelHandle`]：发送消息、按序号拉取消息
//! - [`SdkCallback`]：SDK 推送的回调，经 [`CallbackSender`] 投递，可以在任意线程调用

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::SdkError;
use crate::model::{ChannelType, ChannelUpdateReason, Message, SyncStatus};

pub type SdkResult<T> = std::result::Result<T, SdkError>;

/// SDK 回调发送端（UnboundedSender 可以跨线程、在非 async 上下文中调用）
pub type CallbackSender = mpsc::UnboundedSender<SdkCallback>;
pub type CallbackReceiver = mpsc::UnboundedReceiver<SdkCallback>;

/// 创建 SDK 客户端的入口
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// 用 access token 创建客户端，之后的推送回调都写入 `callbacks`
    async fn connect(&self, token: &str, callbacks: CallbackSender)
        -> SdkResult<Arc<dyn ChatClient>>;
}

/// 已认证的 SDK 客户端
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// 当前用户订阅的频道，顺序由 SDK 决定（通常按最后一条消息倒序）
    async fn subscribed_channels(&self) -> SdkResult<Vec<Arc<dyn ChannelHandle>>>;

    async fn create_channel(
        &self,
        friendly_name: &str,
        channel_type: ChannelType,
    ) -> SdkResult<Arc<dyn ChannelHandle>>;

    /// 释放客户端，之后不应再产生回调
    async fn shutdown(&self);
}

/// 频道句柄
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    fn sid(&self) -> String;
    fn friendly_name(&self) -> String;
    fn unique_name(&self) -> String;

    /// 成员 identity 列表
    async fn members(&self) -> SdkResult<Vec<String>>;

    async fn send_message(&self, body: &str) -> SdkResult<Message>;

    /// 从 `index` 开始向后拉取最多 `limit` 条
    async fn messages_after(&self, index: u64, limit: u32) -> SdkResult<Vec<Message>>;

    /// 最近的 `count` 条消息
    async fn last_messages(&self, count: u32) -> SdkResult<Vec<Message>>;
}

/// SDK 推送回调（替代一个实现几十个可选方法的 listener 对象）
#[derive(Clone)]
pub enum SdkCallback {
    ClientSynchronization(SyncStatus),
    ClientInitFailed(SdkError),
    ChannelAdded(Arc<dyn ChannelHandle>),
    ChannelUpdated {
        channel: Arc<dyn ChannelHandle>,
        reason: ChannelUpdateReason,
    },
    ChannelDeleted(Arc<dyn ChannelHandle>),
    ChannelJoined(Arc<dyn ChannelHandle>),
    ChannelInvited(Arc<dyn ChannelHandle>),
    ChannelSynchronizationChanged { channel_sid: String },
    MessageAdded(Message),
    MessageUpdated(Message),
    MessageDeleted(Message),
    MemberAdded { channel_sid: String, identity: String },
    MemberUpdated { channel_sid: String, identity: String },
    MemberDeleted { channel_sid: String, identity: String },
    TypingStarted { channel_sid: String, identity: String },
    TypingEnded { channel_sid: String, identity: String },
    UserUpdated { identity: String },
    UserSubscribed { identity: String },
    UserUnsubscribed { identity: String },
    NewMessageNotification { channel_sid: String, message_sid: String, index: u64 },
    AddedToChannelNotification { channel_sid: String },
    InvitedToChannelNotification { channel_sid: String },
    RemovedFromChannelNotification { channel_sid: String },
    NotificationSubscribed,
    NotificationFailed(SdkError),
    ConnectionStateChanged { state: String },
    TokenExpired,
    TokenAboutToExpire,
    Error(SdkError),
}

/// 回调种类（事件分发表的键）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SdkCallbackKind {
    ClientSynchronization,
    ClientInitFailed,
    ChannelAdded,
    ChannelUpdated,
    ChannelDeleted,
    ChannelJoined,
    ChannelInvited,
    ChannelSynchronizationChanged,
    MessageAdded,
    MessageUpdated,
    MessageDeleted,
    MemberAdded,
    MemberUpdated,
    MemberDeleted,
    TypingStarted,
    TypingEnded,
    UserUpdated,
    UserSubscribed,
    UserUnsubscribed,
    NewMessageNotification,
    AddedToChannelNotification,
    InvitedToChannelNotification,
    RemovedFromChannelNotification,
    NotificationSubscribed,
    NotificationFailed,
    ConnectionStateChanged,
    TokenExpired,
    TokenAboutToExpire,
    Error,
}

impl SdkCallback {
    pub fn kind(&self) -> SdkCallbackKind {
        match self {
            SdkCallback::ClientSynchronization(_) => SdkCallbackKind::ClientSynchronization,
            SdkCallback::ClientInitFailed(_) => SdkCallbackKind::ClientInitFailed,
            SdkCallback::ChannelAdded(_) => SdkCallbackKind::ChannelAdded,
            SdkCallback::ChannelUpdated { .. } => SdkCallbackKind::ChannelUpdated,
            SdkCallback::ChannelDeleted(_) => SdkCallbackKind::ChannelDeleted,
            SdkCallback::ChannelJoined(_) => SdkCallbackKind::ChannelJoined,
            SdkCallback::ChannelInvited(_) => SdkCallbackKind::ChannelInvited,
            SdkCallback::ChannelSynchronizationChanged { .. } => {
                SdkCallbackKind::ChannelSynchronizationChanged
            }
            SdkCallback::MessageAdded(_) => SdkCallbackKind::MessageAdded,
            SdkCallback::MessageUpdated(_) => SdkCallbackKind::MessageUpdated,
            SdkCallback::MessageDeleted(_) => SdkCallbackKind::MessageDeleted,
            SdkCallback::MemberAdded { .. } => SdkCallbackKind::MemberAdded,
            SdkCallback::MemberUpdated { .. } => SdkCallbackKind::MemberUpdated,
            SdkCallback::MemberDeleted { .. } => SdkCallbackKind::MemberDeleted,
            SdkCallback::TypingStarted { .. } => SdkCallbackKind::TypingStarted,
            SdkCallback::TypingEnded { .. } => SdkCallbackKind::TypingEnded,
            SdkCallback::UserUpdated { .. } => SdkCallbackKind::UserUpdated,
            SdkCallback::UserSubscribed { .. } => SdkCallbackKind::UserSubscribed,
            SdkCallback::UserUnsubscribed { .. } => SdkCallbackKind::UserUnsubscribed,
            SdkCallback::NewMessageNotification { .. } => SdkCallbackKind::NewMessageNotification,
            SdkCallback::AddedToChannelNotification { .. } => {
                SdkCallbackKind::AddedToChannelNotification
            }
            SdkCallback::InvitedToChannelNotification { .. } => {
                SdkCallbackKind::InvitedToChannelNotification
            }
            SdkCallback::RemovedFromChannelNotification { .. } => {
                SdkCallbackKind::RemovedFromChannelNotification
            }
            SdkCallback::NotificationSubscribed => SdkCallbackKind::NotificationSubscribed,
            SdkCallback::NotificationFailed(_) => SdkCallbackKind::NotificationFailed,
            SdkCallback::ConnectionStateChanged { .. } => SdkCallbackKind::ConnectionStateChanged,
            SdkCallback::TokenExpired => SdkCallbackKind::TokenExpired,
            SdkCallback::TokenAboutToExpire => SdkCallbackKind::TokenAboutToExpire,
            SdkCallback::Error(_) => SdkCallbackKind::Error,
        }
    }
}

impl std::fmt::Debug for SdkCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SdkCallback::ChannelAdded(c)
            | SdkCallback::ChannelDeleted(c)
            | SdkCallback::ChannelJoined(c)
            | SdkCallback::ChannelInvited(c) => {
                write!(f, "{:?}({})", self.kind(), c.sid())
            }
            SdkCallback::ChannelUpdated { channel, reason } => {
                write!(f, "ChannelUpdated({}, {:?})", channel.sid(), reason)
            }
            SdkCallback::MessageAdded(m)
            | SdkCallback::MessageUpdated(m)
            | SdkCallback::MessageDeleted(m) => {
                write!(f, "{:?}({}#{})", self.kind(), m.channel_sid, m.index)
            }
            _ => write!(f, "{:?}", self.kind()),
        }
    }
}

/// 创建一对回调通道
pub fn callback_channel() -> (CallbackSender, CallbackReceiver) {
    mpsc::unbounded_channel()
}
