//! 进程内的 SDK 替身
//!
//! 实现 [`ChatBackend`] 的全部能力，用于单元测试和 demo：
//! - 按 token 认证，token → identity 由测试预先登记
//! - 频道、成员、消息都保存在内存中，消息序号从 0 开始递增
//! - `messages_after` 与真实 SDK 一致，包含起始序号本身
//! - 可以注入故障（下一次调用失败，或永远不返回）来验证错误与超时路径
//!
//! 推送回调通过 connect 时传入的 [`CallbackSender`] 同步发出。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::backend::{
    CallbackSender, ChannelHandle, ChatBackend, ChatClient, SdkCallback, SdkResult,
};
use crate::error::SdkError;
use crate::model::{ChannelType, ChannelUpdateReason, Message, SyncStatus};

/// 与真实 SDK 一致的错误码
pub const ERROR_INVALID_TOKEN: i32 = 20101;
pub const ERROR_CHANNEL_NOT_FOUND: i32 = 50300;
pub const ERROR_NOT_A_MEMBER: i32 = 50400;

/// 可注入故障的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryOp {
    Connect,
    ListChannels,
    CreateChannel,
    SendMessage,
    FetchMessages,
    LastMessages,
    Members,
    Shutdown,
}

#[derive(Debug, Clone)]
enum Fault {
    Fail(SdkError),
    Hang,
}

struct ChannelRecord {
    friendly_name: String,
    unique_name: String,
    members: Vec<String>,
    messages: Vec<Message>,
    next_index: u64,
}

#[derive(Default)]
struct BackendState {
    /// token → identity
    users: HashMap<String, String>,
    /// 频道插入顺序
    order: Vec<String>,
    channels: HashMap<String, ChannelRecord>,
    callbacks: Option<CallbackSender>,
    identity: Option<String>,
    generation: u64,
}

#[derive(Default)]
struct Inner {
    state: RwLock<BackendState>,
    faults: Mutex<HashMap<MemoryOp, Fault>>,
    hung: Mutex<HashSet<MemoryOp>>,
}

impl Inner {
    /// 推送一条回调；没有已连接的客户端时丢弃
    fn emit(&self, callback: SdkCallback) {
        let sender = self.state.read().callbacks.clone();
        match sender {
            Some(sender) => {
                if sender.send(callback).is_err() {
                    debug!("Callback receiver dropped");
                }
            }
            None => debug!("No connected client, dropping {:?}", callback),
        }
    }

    async fn check_fault(&self, op: MemoryOp) -> SdkResult<()> {
        let hung = self.hung.lock().contains(&op);
        if hung {
            debug!("{:?} hanging", op);
            futures::future::pending::<()>().await;
        }
        let fault = self.faults.lock().remove(&op);
        match fault {
            Some(Fault::Fail(error)) => Err(error),
            Some(Fault::Hang) => {
                futures::future::pending::<()>().await;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

/// 内存 SDK
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    inner: Arc<Inner>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一个可用的 token
    pub fn with_user(self, token: &str, identity: &str) -> Self {
        self.inner
            .state
            .write()
            .users
            .insert(token.to_string(), identity.to_string());
        self
    }

    /// 下一次 `op` 调用返回 `error`
    pub fn fail_next(&self, op: MemoryOp, error: SdkError) {
        self.inner.faults.lock().insert(op, Fault::Fail(error));
    }

    /// 下一次 `op` 调用永不返回
    pub fn hang_next(&self, op: MemoryOp) {
        self.inner.faults.lock().insert(op, Fault::Hang);
    }

    /// 之后所有 `op` 调用都永不返回
    pub fn hang_always(&self, op: MemoryOp) {
        self.inner.hung.lock().insert(op);
    }

    /// 直接推送一条原始回调
    pub fn push(&self, callback: SdkCallback) {
        self.inner.emit(callback);
    }

    /// 预置频道（不发出回调）
    pub async fn seed_channel(&self, sid: &str, friendly_name: &str, members: &[&str]) {
        let mut state = self.inner.state.write();
        if !state.channels.contains_key(sid) {
            state.order.push(sid.to_string());
        }
        state.channels.insert(
            sid.to_string(),
            ChannelRecord {
                friendly_name: friendly_name.to_string(),
                unique_name: friendly_name.to_ascii_lowercase().replace(' ', "-"),
                members: members.iter().map(|m| m.to_string()).collect(),
                messages: Vec::new(),
                next_index: 0,
            },
        );
    }

    pub async fn channel_handle(&self, sid: &str) -> Option<Arc<dyn ChannelHandle>> {
        let state = self.inner.state.read();
        if state.channels.contains_key(sid) {
            Some(Arc::new(MemoryChannel {
                sid: sid.to_string(),
                inner: self.inner.clone(),
            }))
        } else {
            None
        }
    }

    /// 服务端新增频道，发出 ChannelAdded
    pub async fn add_channel(&self, sid: &str, friendly_name: &str, members: &[&str]) {
        self.seed_channel(sid, friendly_name, members).await;
        if let Some(handle) = self.channel_handle(sid).await {
            self.inner.emit(SdkCallback::ChannelAdded(handle));
        }
    }

    /// 修改显示名称，发出 ChannelUpdated(FriendlyName)
    pub async fn rename_channel(&self, sid: &str, friendly_name: &str) -> SdkResult<()> {
        {
            let mut state = self.inner.state.write();
            let record = state
                .channels
                .get_mut(sid)
                .ok_or_else(|| channel_not_found(sid))?;
            record.friendly_name = friendly_name.to_string();
        }
        if let Some(handle) = self.channel_handle(sid).await {
            self.inner.emit(SdkCallback::ChannelUpdated {
                channel: handle,
                reason: ChannelUpdateReason::FriendlyName,
            });
        }
        Ok(())
    }

    /// 删除频道，发出 ChannelDeleted
    pub async fn delete_channel(&self, sid: &str) -> SdkResult<()> {
        let handle = self
            .channel_handle(sid)
            .await
            .ok_or_else(|| channel_not_found(sid))?;
        {
            let mut state = self.inner.state.write();
            state.channels.remove(sid);
            state.order.retain(|s| s != sid);
        }
        self.inner.emit(SdkCallback::ChannelDeleted(handle));
        Ok(())
    }

    /// 其他用户发来的消息，发出 MessageAdded
    pub async fn post_message(&self, sid: &str, author: &str, body: &str) -> SdkResult<Message> {
        let message = self.inner.append_message(sid, author, body)?;
        self.inner.emit(SdkCallback::MessageAdded(message.clone()));
        Ok(message)
    }

    pub async fn set_sync_status(&self, status: SyncStatus) {
        self.inner.emit(SdkCallback::ClientSynchronization(status));
    }

    /// 当前连接的 identity
    pub fn connected_identity(&self) -> Option<String> {
        self.inner.state.read().identity.clone()
    }
}

impl Inner {
    fn append_message(&self, sid: &str, author: &str, body: &str) -> SdkResult<Message> {
        let mut state = self.state.write();
        let record = state
            .channels
            .get_mut(sid)
            .ok_or_else(|| channel_not_found(sid))?;
        let message = Message {
            sid: format!("IM{}", uuid::Uuid::new_v4().simple()),
            channel_sid: sid.to_string(),
            body: body.to_string(),
            author: author.to_string(),
            index: record.next_index,
            timestamp: chrono::Utc::now().timestamp(),
        };
        record.next_index += 1;
        record.messages.push(message.clone());
        Ok(message)
    }
}

fn channel_not_found(sid: &str) -> SdkError {
    SdkError::new(ERROR_CHANNEL_NOT_FOUND, format!("Channel not found: {}", sid))
}

#[async_trait]
impl ChatBackend for InMemoryBackend {
    async fn connect(
        &self,
        token: &str,
        callbacks: CallbackSender,
    ) -> SdkResult<Arc<dyn ChatClient>> {
        self.inner.check_fault(MemoryOp::Connect).await?;

        let (identity, generation) = {
            let mut state = self.inner.state.write();
            let identity = state
                .users
                .get(token)
                .cloned()
                .ok_or_else(|| SdkError::new(ERROR_INVALID_TOKEN, "Invalid Access Token"))?;
            state.generation += 1;
            state.identity = Some(identity.clone());
            state.callbacks = Some(callbacks);
            (identity, state.generation)
        };
        debug!("In-memory client connected as {}", identity);

        self.inner.emit(SdkCallback::ClientSynchronization(SyncStatus::Started));
        self.inner.emit(SdkCallback::ClientSynchronization(SyncStatus::InProgress));
        self.inner.emit(SdkCallback::ClientSynchronization(SyncStatus::Completed));

        Ok(Arc::new(MemoryClient {
            identity,
            generation,
            inner: self.inner.clone(),
        }))
    }
}

struct MemoryClient {
    identity: String,
    generation: u64,
    inner: Arc<Inner>,
}

#[async_trait]
impl ChatClient for MemoryClient {
    async fn subscribed_channels(&self) -> SdkResult<Vec<Arc<dyn ChannelHandle>>> {
        self.inner.check_fault(MemoryOp::ListChannels).await?;
        let state = self.inner.state.read();
        let handles = state
            .order
            .iter()
            .filter(|sid| {
                state
                    .channels
                    .get(*sid)
                    .map(|c| c.members.contains(&self.identity))
                    .unwrap_or(false)
            })
            .map(|sid| {
                Arc::new(MemoryChannel {
                    sid: sid.clone(),
                    inner: self.inner.clone(),
                }) as Arc<dyn ChannelHandle>
            })
            .collect();
        Ok(handles)
    }

    async fn create_channel(
        &self,
        friendly_name: &str,
        channel_type: ChannelType,
    ) -> SdkResult<Arc<dyn ChannelHandle>> {
        self.inner.check_fault(MemoryOp::CreateChannel).await?;
        let sid = format!("CH{}", uuid::Uuid::new_v4().simple());
        {
            let mut state = self.inner.state.write();
            state.order.push(sid.clone());
            state.channels.insert(
                sid.clone(),
                ChannelRecord {
                    friendly_name: friendly_name.to_string(),
                    unique_name: String::new(),
                    members: vec![self.identity.clone()],
                    messages: Vec::new(),
                    next_index: 0,
                },
            );
        }
        debug!("Created {:?} channel {} ({})", channel_type, sid, friendly_name);
        let handle: Arc<dyn ChannelHandle> = Arc::new(MemoryChannel {
            sid,
            inner: self.inner.clone(),
        });
        self.inner.emit(SdkCallback::ChannelAdded(handle.clone()));
        Ok(handle)
    }

    async fn shutdown(&self) {
        if let Err(e) = self.inner.check_fault(MemoryOp::Shutdown).await {
            debug!("Shutdown fault ignored: {}", e);
        }
        let mut state = self.inner.state.write();
        if state.generation == self.generation {
            state.callbacks = None;
            state.identity = None;
        }
    }
}

struct MemoryChannel {
    sid: String,
    inner: Arc<Inner>,
}

impl MemoryChannel {
    fn read<T>(&self, f: impl FnOnce(&ChannelRecord) -> T) -> SdkResult<T> {
        let state = self.inner.state.read();
        state
            .channels
            .get(&self.sid)
            .map(f)
            .ok_or_else(|| channel_not_found(&self.sid))
    }
}

#[async_trait]
impl ChannelHandle for MemoryChannel {
    fn sid(&self) -> String {
        self.sid.clone()
    }

    fn friendly_name(&self) -> String {
        self.read(|c| c.friendly_name.clone()).unwrap_or_default()
    }

    fn unique_name(&self) -> String {
        self.read(|c| c.unique_name.clone()).unwrap_or_default()
    }

    async fn members(&self) -> SdkResult<Vec<String>> {
        self.inner.check_fault(MemoryOp::Members).await?;
        self.read(|c| c.members.clone())
    }

    async fn send_message(&self, body: &str) -> SdkResult<Message> {
        self.inner.check_fault(MemoryOp::SendMessage).await?;
        let author = self
            .inner
            .state
            .read()
            .identity
            .clone()
            .ok_or_else(|| SdkError::new(ERROR_NOT_A_MEMBER, "Client is not connected"))?;
        let message = self.inner.append_message(&self.sid, &author, body)?;
        self.inner.emit(SdkCallback::MessageAdded(message.clone()));
        Ok(message)
    }

    async fn messages_after(&self, index: u64, limit: u32) -> SdkResult<Vec<Message>> {
        self.inner.check_fault(MemoryOp::FetchMessages).await?;
        self.read(|c| {
            c.messages
                .iter()
                .filter(|m| m.index >= index)
                .take(limit as usize)
                .cloned()
                .collect()
        })
    }

    async fn last_messages(&self, count: u32) -> SdkResult<Vec<Message>> {
        self.inner.check_fault(MemoryOp::LastMessages).await?;
        self.read(|c| {
            let skip = c.messages.len().saturating_sub(count as usize);
            c.messages[skip..].to_vec()
        })
    }
}
