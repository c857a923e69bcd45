//! 日志初始化
//!
//! 库本身只通过 `tracing` 宏打日志；宿主或 demo 调用 [`init_tracing`] 安装订阅者。

use std::sync::Once;

static INIT: Once = Once::new();

/// 安装 fmt 订阅者（重复调用是无害的）
///
/// `debug_mode` 为 true 时输出 DEBUG 级别，否则 INFO。
pub fn init_tracing(debug_mode: bool) {
    INIT.call_once(|| {
        let level = if debug_mode {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        };
        // 宿主可能已经安装了全局订阅者，此时 try_init 失败，忽略即可
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .try_init();
    });
}
