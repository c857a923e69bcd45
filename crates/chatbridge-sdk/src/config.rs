//! 桥接配置

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::events::EventFilter;

/// 单次拉取消息的硬上限，配置值超过时按此截断
pub const MAX_FETCH_PAGE: u32 = 300;

pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

/// 桥接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// 普通命令（list/send/fetch/create）等待 SDK 完成回调的超时（秒）
    pub command_timeout_secs: u64,
    /// initialize 等待客户端创建完成的超时（秒）
    pub init_timeout_secs: u64,
    /// fetchMessages 单页条数，最大 300
    pub fetch_page_limit: u32,
    /// 事件配置
    pub event_config: EventConfig,
    /// 调试模式
    pub debug_mode: bool,
}

/// 事件配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// 事件广播缓冲区大小
    pub buffer_size: usize,
    /// 方法通道转发事件时使用的过滤器（空表示全部转发）
    pub filters: Vec<EventFilter>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            init_timeout_secs: 15,
            fetch_page_limit: MAX_FETCH_PAGE,
            event_config: EventConfig::default(),
            debug_mode: false,
        }
    }
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            filters: Vec::new(),
        }
    }
}

impl BridgeConfig {
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::new()
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_secs(self.init_timeout_secs)
    }

    /// 实际生效的分页大小（1..=300）
    pub fn effective_page_limit(&self) -> u32 {
        self.fetch_page_limit.clamp(1, MAX_FETCH_PAGE)
    }
}

/// 配置构建器
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: BridgeConfig::default(),
        }
    }

    pub fn command_timeout_secs(mut self, secs: u64) -> Self {
        self.config.command_timeout_secs = secs;
        self
    }

    pub fn init_timeout_secs(mut self, secs: u64) -> Self {
        self.config.init_timeout_secs = secs;
        self
    }

    pub fn fetch_page_limit(mut self, limit: u32) -> Self {
        self.config.fetch_page_limit = limit;
        self
    }

    pub fn event_config(mut self, config: EventConfig) -> Self {
        self.config.event_config = config;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.config.event_config.buffer_size = size;
        self
    }

    pub fn debug_mode(mut self, enabled: bool) -> Self {
        self.config.debug_mode = enabled;
        self
    }

    pub fn build(self) -> BridgeConfig {
        self.config
    }
}

impl Default for BridgeConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
