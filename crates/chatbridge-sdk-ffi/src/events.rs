//! Event types and callback interface for FFI
//!
//! Events reach the host through [`BridgeDelegate`]. Every bridge event is
//! delivered to `on_event` with its JSON payload; the common ones are also
//! decoded into typed records and delivered to the dedicated methods.

use chatbridge_sdk::{events::event_names, BridgeEvent, ChannelSnapshot, Message};
use tracing::warn;

/// Callback interface implemented by the host UI layer
///
/// Called on a background thread.
#[uniffi::export(callback_interface)]
pub trait BridgeDelegate: Send + Sync {
    /// Every event, payload as JSON
    fn on_event(&self, event: BridgeEventEntry);

    /// `channelOnMessageAdded`
    fn on_message_added(&self, message: MessageEntry);

    /// `onChannelAdded`
    fn on_channel_added(&self, channel: ChannelEntry);

    /// `onClientSynchronization`
    fn on_sync_status_changed(&self, status: SyncStatus);
}

#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct BridgeEventEntry {
    pub name: String,
    pub payload_json: String,
    pub timestamp: i64,
}

impl From<&BridgeEvent> for BridgeEventEntry {
    fn from(event: &BridgeEvent) -> Self {
        Self {
            name: event.name.clone(),
            payload_json: event.payload.to_string(),
            timestamp: event.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct ChannelEntry {
    pub sid: String,
    pub friendly_name: String,
    pub unique_name: String,
    pub members: Vec<String>,
}

impl From<ChannelSnapshot> for ChannelEntry {
    fn from(channel: ChannelSnapshot) -> Self {
        Self {
            sid: channel.sid,
            friendly_name: channel.friendly_name,
            unique_name: channel.unique_name,
            members: channel.members,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct MessageEntry {
    pub sid: String,
    pub channel_sid: String,
    pub body: String,
    pub author: String,
    pub index: u64,
    /// Seconds since epoch
    pub timestamp: i64,
}

impl From<Message> for MessageEntry {
    fn from(message: Message) -> Self {
        Self {
            sid: message.sid,
            channel_sid: message.channel_sid,
            body: message.body,
            author: message.author,
            index: message.index,
            timestamp: message.timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum SyncStatus {
    Unknown,
    Started,
    InProgress,
    Completed,
    Failed,
}

impl From<chatbridge_sdk::SyncStatus> for SyncStatus {
    fn from(status: chatbridge_sdk::SyncStatus) -> Self {
        match status {
            chatbridge_sdk::SyncStatus::Unknown => SyncStatus::Unknown,
            chatbridge_sdk::SyncStatus::Started => SyncStatus::Started,
            chatbridge_sdk::SyncStatus::InProgress => SyncStatus::InProgress,
            chatbridge_sdk::SyncStatus::Completed => SyncStatus::Completed,
            chatbridge_sdk::SyncStatus::Failed => SyncStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

impl From<chatbridge_sdk::SessionState> for SessionState {
    fn from(state: chatbridge_sdk::SessionState) -> Self {
        match state {
            chatbridge_sdk::SessionState::Uninitialized => SessionState::Uninitialized,
            chatbridge_sdk::SessionState::Initializing => SessionState::Initializing,
            chatbridge_sdk::SessionState::Ready => SessionState::Ready,
            chatbridge_sdk::SessionState::Failed => SessionState::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum ChannelType {
    Public,
    Private,
}

impl From<ChannelType> for chatbridge_sdk::ChannelType {
    fn from(channel_type: ChannelType) -> Self {
        match channel_type {
            ChannelType::Public => chatbridge_sdk::ChannelType::Public,
            ChannelType::Private => chatbridge_sdk::ChannelType::Private,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Record)]
pub struct SessionInfo {
    pub state: SessionState,
    pub sync_status: SyncStatus,
}

/// Deliver one bridge event to the delegate
pub(crate) fn dispatch_to_delegate(delegate: &dyn BridgeDelegate, event: &BridgeEvent) {
    delegate.on_event(BridgeEventEntry::from(event));

    match event.name.as_str() {
        event_names::CHANNEL_MESSAGE_ADDED => {
            match serde_json::from_value::<Message>(event.payload.clone()) {
                Ok(message) => delegate.on_message_added(message.into()),
                Err(e) => warn!("Malformed message payload: {}", e),
            }
        }
        event_names::CHANNEL_ADDED => {
            match serde_json::from_value::<ChannelSnapshot>(event.payload.clone()) {
                Ok(channel) => delegate.on_channel_added(channel.into()),
                Err(e) => warn!("Malformed channel payload: {}", e),
            }
        }
        event_names::CLIENT_SYNCHRONIZATION => {
            let status = event
                .payload
                .get("status")
                .cloned()
                .map(serde_json::from_value::<chatbridge_sdk::SyncStatus>);
            match status {
                Some(Ok(status)) => delegate.on_sync_status_changed(status.into()),
                _ => warn!("Malformed sync payload: {}", event.payload),
            }
        }
        _ => {}
    }
}
