//! Configuration types and builder for FFI

use std::sync::Arc;

use crate::error::ChatBridgeFfiError;
use crate::helpers::unwrap_or_clone_arc;

/// Bridge configuration (FFI 层)
#[derive(Debug, Clone, uniffi::Record)]
pub struct BridgeConfig {
    /// 普通命令超时（秒）
    pub command_timeout_secs: u64,
    /// initialize 超时（秒）
    pub init_timeout_secs: u64,
    /// fetch_messages 单页条数，最大 300
    pub fetch_page_limit: u32,
    /// 事件缓冲区大小
    pub event_buffer_size: u32,
    pub debug_mode: bool,
}

impl From<BridgeConfig> for chatbridge_sdk::BridgeConfig {
    fn from(config: BridgeConfig) -> Self {
        chatbridge_sdk::BridgeConfig::builder()
            .command_timeout_secs(config.command_timeout_secs)
            .init_timeout_secs(config.init_timeout_secs)
            .fetch_page_limit(config.fetch_page_limit)
            .event_buffer_size(config.event_buffer_size as usize)
            .debug_mode(config.debug_mode)
            .build()
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let core = chatbridge_sdk::BridgeConfig::default();
        Self {
            command_timeout_secs: core.command_timeout_secs,
            init_timeout_secs: core.init_timeout_secs,
            fetch_page_limit: core.fetch_page_limit,
            event_buffer_size: core.event_config.buffer_size as u32,
            debug_mode: core.debug_mode,
        }
    }
}

/// Builder for [`BridgeConfig`]
#[derive(Clone, uniffi::Object)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

#[uniffi::export]
impl BridgeConfigBuilder {
    #[uniffi::constructor]
    pub fn new() -> Self {
        Self {
            config: BridgeConfig::default(),
        }
    }

    /// Set command timeout in seconds
    pub fn command_timeout(self: Arc<Self>, seconds: u64) -> Arc<Self> {
        let mut builder = unwrap_or_clone_arc(self);
        builder.config.command_timeout_secs = seconds;
        Arc::new(builder)
    }

    /// Set initialize timeout in seconds
    pub fn init_timeout(self: Arc<Self>, seconds: u64) -> Arc<Self> {
        let mut builder = unwrap_or_clone_arc(self);
        builder.config.init_timeout_secs = seconds;
        Arc::new(builder)
    }

    pub fn fetch_page_limit(self: Arc<Self>, limit: u32) -> Arc<Self> {
        let mut builder = unwrap_or_clone_arc(self);
        builder.config.fetch_page_limit = limit;
        Arc::new(builder)
    }

    pub fn event_buffer_size(self: Arc<Self>, size: u32) -> Arc<Self> {
        let mut builder = unwrap_or_clone_arc(self);
        builder.config.event_buffer_size = size;
        Arc::new(builder)
    }

    /// Enable or disable debug mode
    pub fn debug_mode(self: Arc<Self>, enabled: bool) -> Arc<Self> {
        let mut builder = unwrap_or_clone_arc(self);
        builder.config.debug_mode = enabled;
        Arc::new(builder)
    }

    /// Build the configuration
    pub fn build(self: Arc<Self>) -> Result<BridgeConfig, ChatBridgeFfiError> {
        let builder = unwrap_or_clone_arc(self);
        let config = builder.config;

        if config.command_timeout_secs == 0 {
            return Err(ChatBridgeFfiError::invalid_parameter(
                "command_timeout_secs",
                "must be greater than 0",
            ));
        }
        if config.init_timeout_secs == 0 {
            return Err(ChatBridgeFfiError::invalid_parameter(
                "init_timeout_secs",
                "must be greater than 0",
            ));
        }
        if config.fetch_page_limit == 0 || config.fetch_page_limit > chatbridge_sdk::MAX_FETCH_PAGE
        {
            return Err(ChatBridgeFfiError::invalid_parameter(
                "fetch_page_limit",
                "must be between 1 and 300",
            ));
        }

        Ok(config)
    }
}

impl Default for BridgeConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
