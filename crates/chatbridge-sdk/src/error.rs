//! 桥接层错误类型
//!
//! 命令调用产生的错误通过该命令的响应同步返回；会话自身生命周期产生的错误
//! （例如初始化失败）额外通过事件异步投递。

use std::fmt;

use crate::session::SessionState;

/// SDK 回调中携带的错误信息（code + message）
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct SdkError {
    pub code: i32,
    pub message: String,
}

impl SdkError {
    pub fn new<T: fmt::Display>(code: i32, message: T) -> Self {
        Self {
            code,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatBridgeError {
    #[error("Invalid argument: {field} - {msg}")]
    InvalidArgument { field: String, msg: String },

    #[error("Method not implemented: {method}")]
    NotImplemented { method: String },

    #[error("Session not ready (state: {state})")]
    NotReady { state: SessionState },

    #[error("Channel not found: {channel_id}")]
    ChannelNotFound { channel_id: String },

    #[error("SDK error [{code}]: {message}")]
    Sdk { code: i32, message: String },

    #[error("Operation timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Method channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, ChatBridgeError>;

impl ChatBridgeError {
    pub fn invalid_argument(field: &str, msg: &str) -> Self {
        tracing::warn!("Invalid argument {}: {}", field, msg);
        Self::InvalidArgument {
            field: field.to_string(),
            msg: msg.to_string(),
        }
    }

    pub fn channel_not_found<T: Into<String>>(channel_id: T) -> Self {
        Self::ChannelNotFound {
            channel_id: channel_id.into(),
        }
    }

    pub fn timeout(timeout_secs: u64) -> Self {
        tracing::error!("Operation timed out after {}s", timeout_secs);
        Self::Timeout { timeout_secs }
    }

    /// 稳定的错误码，用于 MethodResponse::Error 的 code 字段
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::NotImplemented { .. } => "not_implemented",
            Self::NotReady { .. } => "not_ready",
            Self::ChannelNotFound { .. } => "channel_not_found",
            Self::Sdk { .. } => "sdk_error",
            Self::Timeout { .. } => "timeout",
            Self::Serialization(_) => "serialization",
            Self::ChannelClosed => "channel_closed",
        }
    }

    /// 附加的结构化信息（宿主侧可以据此做更细的处理）
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::InvalidArgument { field, .. } => Some(serde_json::json!({ "field": field })),
            Self::NotImplemented { method } => Some(serde_json::json!({ "method": method })),
            Self::NotReady { state } => Some(serde_json::json!({ "state": state })),
            Self::ChannelNotFound { channel_id } => {
                Some(serde_json::json!({ "channelId": channel_id }))
            }
            Self::Sdk { code, .. } => Some(serde_json::json!({ "sdkCode": code })),
            Self::Timeout { timeout_secs } => {
                Some(serde_json::json!({ "timeoutSecs": timeout_secs }))
            }
            Self::Serialization(_) | Self::ChannelClosed => None,
        }
    }

    pub fn is_sdk_error(&self) -> bool {
        matches!(self, Self::Sdk { .. })
    }
}

impl From<SdkError> for ChatBridgeError {
    fn from(error: SdkError) -> Self {
        tracing::error!("SDK error: {}", error);
        Self::Sdk {
            code: error.code,
            message: error.message,
        }
    }
}

impl From<serde_json::Error> for ChatBridgeError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        let err = ChatBridgeError::NotReady {
            state: SessionState::Uninitialized,
        };
        assert_eq!(err.code(), "not_ready");
        assert_eq!(
            err.details(),
            Some(serde_json::json!({ "state": "uninitialized" }))
        );

        let sdk = SdkError::new(50107, "channel is full");
        assert_eq!(sdk.to_string(), "[50107] channel is full");
        let err: ChatBridgeError = sdk.into();
        assert!(err.is_sdk_error());
        assert_eq!(err.code(), "sdk_error");
        assert_eq!(err.to_string(), "SDK error [50107]: channel is full");
    }
}
