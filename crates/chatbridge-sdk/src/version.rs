//! SDK 版本信息
//!
//! SDK semver 唯一来源是 Cargo.toml，禁止手写版本号。

pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// 包名，随版本一起上报给宿主（getSdkVersion）
pub const SDK_NAME: &str = env!("CARGO_PKG_NAME");

/// "chatbridge-sdk/0.1.0" 形式的版本串
pub fn version_string() -> String {
    format!("{}/{}", SDK_NAME, SDK_VERSION)
}
