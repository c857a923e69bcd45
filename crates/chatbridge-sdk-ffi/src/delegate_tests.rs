//! Tests for the blocking bridge API and delegate delivery
//!
//! These tests verify that:
//! 1. Typed entry points and `invoke_method` reach the session
//! 2. Core errors surface as structured FFI errors
//! 3. Events are forwarded to the delegate, typed and raw

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::bridge::ChatBridge;
use crate::config::BridgeConfig;
use crate::error::ChatBridgeFfiError;
use crate::events::{
    BridgeDelegate, BridgeEventEntry, ChannelEntry, ChannelType, MessageEntry, SessionState,
    SyncStatus,
};

/// Mock delegate for testing
#[derive(Clone)]
pub struct MockDelegate {
    pub events: Arc<Mutex<Vec<BridgeEventEntry>>>,
    pub messages: Arc<Mutex<Vec<MessageEntry>>>,
    pub channels: Arc<Mutex<Vec<ChannelEntry>>>,
    pub sync_statuses: Arc<Mutex<Vec<SyncStatus>>>,
    pub call_count: Arc<AtomicUsize>,
}

impl MockDelegate {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            messages: Arc::new(Mutex::new(Vec::new())),
            channels: Arc::new(Mutex::new(Vec::new())),
            sync_statuses: Arc::new(Mutex::new(Vec::new())),
            call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn event_names(&self) -> Vec<String> {
        self.events.lock().unwrap().iter().map(|e| e.name.clone()).collect()
    }

    pub fn get_call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl BridgeDelegate for MockDelegate {
    fn on_event(&self, event: BridgeEventEntry) {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.events.lock().unwrap().push(event);
    }

    fn on_message_added(&self, message: MessageEntry) {
        self.messages.lock().unwrap().push(message);
    }

    fn on_channel_added(&self, channel: ChannelEntry) {
        self.channels.lock().unwrap().push(channel);
    }

    fn on_sync_status_changed(&self, status: SyncStatus) {
        self.sync_statuses.lock().unwrap().push(status);
    }
}

fn bridge() -> ChatBridge {
    let mut users = HashMap::new();
    users.insert("T1".to_string(), "alice".to_string());
    let bridge = ChatBridge::new_in_memory(BridgeConfig::default(), users);
    bridge
        .seed_channel(
            "CH1".to_string(),
            "General".to_string(),
            vec!["alice".to_string(), "bob".to_string()],
        )
        .unwrap();
    bridge
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn test_commands_before_initialize_fail_not_ready() {
    let bridge = bridge();
    let err = bridge.list_channels().unwrap_err();
    assert!(matches!(err, ChatBridgeFfiError::NotReady { ref state } if state == "uninitialized"));
    assert_eq!(bridge.session_info().state, SessionState::Uninitialized);
}

#[test]
fn test_typed_scenario() {
    let bridge = bridge();
    bridge.initialize("T1".to_string()).unwrap();
    assert_eq!(bridge.session_info().state, SessionState::Ready);

    let channels = bridge.list_channels().unwrap();
    assert_eq!(
        channels,
        vec![ChannelEntry {
            sid: "CH1".to_string(),
            friendly_name: "General".to_string(),
            unique_name: "general".to_string(),
            members: vec!["alice".to_string(), "bob".to_string()],
        }]
    );

    assert!(bridge
        .send_message("CH1".to_string(), "hi".to_string())
        .unwrap());
    let last = bridge.fetch_last_message("CH1".to_string()).unwrap().unwrap();
    assert_eq!(last.body, "hi");
    assert_eq!(last.author, "alice");

    let err = bridge
        .send_message("CH404".to_string(), "hi".to_string())
        .unwrap_err();
    assert_eq!(err.code(), "channel_not_found");

    let created = bridge
        .create_channel("Team".to_string(), ChannelType::Private)
        .unwrap();
    assert_eq!(created.members, vec!["alice".to_string()]);

    bridge.shutdown().unwrap();
    assert_eq!(bridge.session_info().state, SessionState::Uninitialized);
}

#[test]
fn test_invoke_method_json() {
    let bridge = bridge();
    let ok = bridge
        .invoke_method("initWithAccessToken".to_string(), r#"{"token":"T1"}"#.to_string())
        .unwrap();
    assert_eq!(ok, "true");

    let channels = bridge
        .invoke_method("getChannels".to_string(), String::new())
        .unwrap();
    let channels: serde_json::Value = serde_json::from_str(&channels).unwrap();
    assert_eq!(channels[0]["sid"], "CH1");

    let last = bridge
        .invoke_method(
            "getChannelLastMessage".to_string(),
            r#"{"sid":"CH1"}"#.to_string(),
        )
        .unwrap();
    assert_eq!(last, "null");

    let err = bridge
        .invoke_method("sendMessage".to_string(), "{not json".to_string())
        .unwrap_err();
    assert!(matches!(err, ChatBridgeFfiError::InvalidParameter { ref field, .. } if field == "arguments"));

    let err = bridge
        .invoke_method("deleteChannel".to_string(), "{}".to_string())
        .unwrap_err();
    assert_eq!(err.code(), "not_implemented");
}

#[test]
fn test_delegate_receives_typed_events() {
    let bridge = bridge();
    let delegate = MockDelegate::new();
    bridge.set_delegate(Box::new(delegate.clone()));

    bridge.initialize("T1".to_string()).unwrap();
    bridge.list_channels().unwrap();
    bridge
        .simulate_incoming_message("CH1".to_string(), "bob".to_string(), "hello".to_string())
        .unwrap();

    assert!(wait_until(|| !delegate.messages.lock().unwrap().is_empty()));
    let message = delegate.messages.lock().unwrap()[0].clone();
    assert_eq!(message.author, "bob");
    assert_eq!(message.channel_sid, "CH1");

    assert!(wait_until(|| delegate
        .sync_statuses
        .lock()
        .unwrap()
        .contains(&SyncStatus::Completed)));
    assert!(delegate
        .event_names()
        .contains(&"channelOnMessageAdded".to_string()));
    assert!(delegate.get_call_count() >= 4);

    bridge
        .create_channel("Team".to_string(), ChannelType::Public)
        .unwrap();
    assert!(wait_until(|| !delegate.channels.lock().unwrap().is_empty()));
}

#[test]
fn test_init_failure_reaches_delegate() {
    let bridge = bridge();
    let delegate = MockDelegate::new();
    bridge.set_delegate(Box::new(delegate.clone()));

    let err = bridge.initialize("wrong".to_string()).unwrap_err();
    assert!(matches!(err, ChatBridgeFfiError::Sdk { code: 20101, .. }));
    assert_eq!(bridge.session_info().state, SessionState::Failed);

    assert!(wait_until(|| delegate
        .event_names()
        .contains(&"onClientInitializationError".to_string())));
    let payload = delegate
        .events
        .lock()
        .unwrap()
        .iter()
        .find(|e| e.name == "onClientInitializationError")
        .map(|e| e.payload_json.clone())
        .unwrap();
    let payload: serde_json::Value = serde_json::from_str(&payload).unwrap();
    assert_eq!(payload["errorCode"], "20101");

    bridge.remove_delegate();
}
