//! 宿主可见的数据模型
//!
//! 字段名在线上（JSON）沿用宿主插件一直使用的键：频道是 sid / friendlyName /
//! uniqueName / members，消息是 sid / channelSid / body / author / index / timestamp。

use serde::{Deserialize, Serialize};

/// 频道快照
///
/// 缓存里的快照可能在两次事件之间过期，只代表最后一次观察到的状态。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSnapshot {
    /// 频道 ID（唯一）
    pub sid: String,
    /// 显示名称
    pub friendly_name: String,
    /// 内部名称
    pub unique_name: String,
    /// 成员 identity 列表（保持 SDK 返回的顺序）
    pub members: Vec<String>,
}

/// 消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub sid: String,
    /// 所属频道 ID（非拥有引用）
    pub channel_sid: String,
    pub body: String,
    pub author: String,
    /// 频道内单调递增的序号
    pub index: u64,
    /// 创建时间（UNIX 秒）
    pub timestamp: i64,
}

/// 客户端同步状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncStatus {
    Unknown,
    Started,
    /// 频道列表已同步，消息仍在同步
    InProgress,
    Completed,
    Failed,
}

impl SyncStatus {
    /// 与 SDK 的数值编码对应（started=0, channelsCompleted=1, completed=2, failed=3）
    pub fn value(&self) -> i32 {
        match self {
            SyncStatus::Unknown => -1,
            SyncStatus::Started => 0,
            SyncStatus::InProgress => 1,
            SyncStatus::Completed => 2,
            SyncStatus::Failed => 3,
        }
    }

    pub fn from_value(value: i32) -> Self {
        match value {
            0 => SyncStatus::Started,
            1 => SyncStatus::InProgress,
            2 => SyncStatus::Completed,
            3 => SyncStatus::Failed,
            _ => SyncStatus::Unknown,
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncStatus::Unknown => "unknown",
            SyncStatus::Started => "started",
            SyncStatus::InProgress => "inProgress",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// 频道更新原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelUpdateReason {
    Status,
    LastConsumedMessageIndex,
    UniqueName,
    FriendlyName,
    Attributes,
    LastMessage,
    NotificationLevel,
}

/// 频道类型（创建频道时使用）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelType {
    #[default]
    Public,
    Private,
}

impl std::str::FromStr for ChannelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "public" => Ok(ChannelType::Public),
            "private" => Ok(ChannelType::Private),
            other => Err(format!("unknown channel type: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_snapshot_wire_keys() {
        let channel = ChannelSnapshot {
            sid: "CH1".to_string(),
            friendly_name: "General".to_string(),
            unique_name: "general".to_string(),
            members: vec!["alice".to_string(), "bob".to_string()],
        };
        let value = serde_json::to_value(&channel).unwrap();
        assert_eq!(value["sid"], "CH1");
        assert_eq!(value["friendlyName"], "General");
        assert_eq!(value["uniqueName"], "general");
        assert_eq!(value["members"], serde_json::json!(["alice", "bob"]));
    }

    #[test]
    fn test_message_wire_keys() {
        let message = Message {
            sid: "IM1".to_string(),
            channel_sid: "CH1".to_string(),
            body: "hi".to_string(),
            author: "alice".to_string(),
            index: 7,
            timestamp: 1_700_000_000,
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["channelSid"], "CH1");
        assert_eq!(value["index"], 7);
        assert_eq!(value["timestamp"], 1_700_000_000i64);
    }

    #[test]
    fn test_sync_status_values() {
        assert_eq!(SyncStatus::from_value(2), SyncStatus::Completed);
        assert_eq!(SyncStatus::from_value(42), SyncStatus::Unknown);
        assert_eq!(SyncStatus::InProgress.value(), 1);
        assert_eq!(
            serde_json::to_value(SyncStatus::InProgress).unwrap(),
            serde_json::json!("inProgress")
        );
    }

    #[test]
    fn test_channel_type_parse() {
        assert_eq!("PRIVATE".parse::<ChannelType>(), Ok(ChannelType::Private));
        assert!("secret".parse::<ChannelType>().is_err());
    }
}
