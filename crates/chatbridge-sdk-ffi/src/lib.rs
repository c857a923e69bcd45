//! ChatBridge FFI - Foreign Function Interface for ChatBridge SDK
//!
//! This crate provides cross-language bindings for the ChatBridge SDK using UniFFI.
//! It generates bindings for:
//! - Kotlin (Android)
//! - Swift (iOS)
//!
//! # Architecture
//!
//! - Blocking entry points that run on a shared Tokio runtime
//! - Typed records for channels and messages, plus a JSON `invoke_method`
//!   entry for hosts that speak the method-channel protocol
//! - Events delivered through the [`BridgeDelegate`] callback interface

#![allow(clippy::new_without_default)]

mod bridge;
mod config;
mod error;
mod events;
mod helpers;

#[cfg(test)]
mod delegate_tests;

// Re-export public types
pub use bridge::ChatBridge;
pub use config::{BridgeConfig, BridgeConfigBuilder};
pub use error::ChatBridgeFfiError;
pub use events::{
    BridgeDelegate, BridgeEventEntry, ChannelEntry, ChannelType, MessageEntry, SessionInfo,
    SessionState, SyncStatus,
};

uniffi::setup_scaffolding!();

/// Get SDK version string
#[uniffi::export]
pub fn sdk_version() -> String {
    chatbridge_sdk::version::SDK_VERSION.to_string()
}

/// Install the tracing subscriber used by the bridge logs
#[uniffi::export]
pub fn init_logging(debug_mode: bool) {
    chatbridge_sdk::logging::init_tracing(debug_mode);
}
