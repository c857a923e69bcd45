//! Error types for FFI layer
//!
//! Mirrors `chatbridge_sdk::ChatBridgeError` with plain fields so every
//! binding gets a non-empty, structured error.

use std::fmt;

use chatbridge_sdk::ChatBridgeError;

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ChatBridgeFfiError {
    #[error("Invalid parameter: {field} - {msg}")]
    InvalidParameter { field: String, msg: String },

    #[error("Method not implemented: {method}")]
    NotImplemented { method: String },

    #[error("Session not ready (state: {state})")]
    NotReady { state: String },

    #[error("Channel not found: {channel_id}")]
    ChannelNotFound { channel_id: String },

    #[error("SDK error [{code}]: {msg}")]
    Sdk { code: i32, msg: String },

    #[error("Operation timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Serialization error: {msg}")]
    Serialization { msg: String },

    #[error("Method channel closed")]
    ChannelClosed,

    #[error("Generic error: {msg}")]
    Generic { msg: String },
}

impl ChatBridgeFfiError {
    pub fn generic<T: fmt::Display>(msg: T) -> Self {
        let msg_str = msg.to_string();
        tracing::error!("Generic error: {}", msg_str);
        Self::Generic { msg: msg_str }
    }

    pub fn invalid_parameter(field: &str, msg: &str) -> Self {
        tracing::error!("Invalid parameter {}: {}", field, msg);
        Self::InvalidParameter {
            field: field.to_string(),
            msg: msg.to_string(),
        }
    }

    /// Stable code shared with the method-channel error responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParameter { .. } => "invalid_argument",
            Self::NotImplemented { .. } => "not_implemented",
            Self::NotReady { .. } => "not_ready",
            Self::ChannelNotFound { .. } => "channel_not_found",
            Self::Sdk { .. } => "sdk_error",
            Self::Timeout { .. } => "timeout",
            Self::Serialization { .. } => "serialization",
            Self::ChannelClosed => "channel_closed",
            Self::Generic { .. } => "generic",
        }
    }
}

impl From<ChatBridgeError> for ChatBridgeFfiError {
    fn from(err: ChatBridgeError) -> Self {
        match err {
            ChatBridgeError::InvalidArgument { field, msg } => Self::InvalidParameter { field, msg },
            ChatBridgeError::NotImplemented { method } => Self::NotImplemented { method },
            ChatBridgeError::NotReady { state } => Self::NotReady {
                state: state.to_string(),
            },
            ChatBridgeError::ChannelNotFound { channel_id } => Self::ChannelNotFound { channel_id },
            ChatBridgeError::Sdk { code, message } => Self::Sdk { code, msg: message },
            ChatBridgeError::Timeout { timeout_secs } => Self::Timeout { timeout_secs },
            ChatBridgeError::Serialization(msg) => Self::Serialization { msg },
            ChatBridgeError::ChannelClosed => Self::ChannelClosed,
        }
    }
}

impl From<serde_json::Error> for ChatBridgeFfiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            msg: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatbridge_sdk::SessionState;

    #[test]
    fn test_core_errors_keep_their_details() {
        let err: ChatBridgeFfiError = ChatBridgeError::NotReady {
            state: SessionState::Initializing,
        }
        .into();
        assert_eq!(err.code(), "not_ready");
        assert_eq!(err.to_string(), "Session not ready (state: initializing)");

        let err: ChatBridgeFfiError = ChatBridgeError::Sdk {
            code: 20101,
            message: "Invalid Access Token".to_string(),
        }
        .into();
        assert!(matches!(err, ChatBridgeFfiError::Sdk { code: 20101, .. }));
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn test_every_variant_has_a_message() {
        let errors = vec![
            ChatBridgeFfiError::ChannelClosed,
            ChatBridgeFfiError::generic("boom"),
            ChatBridgeFfiError::invalid_parameter("body", "is required"),
            ChatBridgeError::timeout(30).into(),
            ChatBridgeError::channel_not_found("CH1").into(),
        ];
        for err in errors {
            assert!(!err.to_string().is_empty(), "{:?}", err);
        }
    }
}
