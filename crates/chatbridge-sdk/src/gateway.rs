//! 命令网关
//!
//! 把宿主传来的 `(method, arguments)` 校验成强类型的 [`Command`]，再交给
//! [`SessionManager`] 执行。参数缺失或类型不对时同步返回 `InvalidArgument`，
//! 未知方法返回 `NotImplemented`。
//!
//! 旧版宿主使用的方法名和参数名（`initWithAccessToken`、`sid`、`index` 等）
//! 同样被接受，`index` 可以是数字也可以是数字字符串。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{ChatBridgeError, Result};
use crate::model::ChannelType;
use crate::session::SessionManager;
use crate::version;

/// 宿主发起的一次调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new<M: Into<String>>(method: M, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }
}

/// 调用结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum MethodResponse {
    Success {
        result: Value,
    },
    Error {
        code: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },
}

impl MethodResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, MethodResponse::Success { .. })
    }

    pub fn into_result(self) -> std::result::Result<Value, (String, String)> {
        match self {
            MethodResponse::Success { result } => Ok(result),
            MethodResponse::Error { code, message, .. } => Err((code, message)),
        }
    }
}

impl From<Result<Value>> for MethodResponse {
    fn from(result: Result<Value>) -> Self {
        match result {
            Ok(result) => MethodResponse::Success { result },
            Err(err) => MethodResponse::Error {
                code: err.code().to_string(),
                message: err.to_string(),
                details: err.details(),
            },
        }
    }
}

/// 校验后的命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Initialize { access_token: String },
    ListChannels,
    SendMessage { channel_id: String, body: String },
    FetchMessages { channel_id: String, after_index: u64 },
    FetchLastMessage { channel_id: String },
    CreateChannel { friendly_name: String, channel_type: ChannelType },
    GetSessionState,
    GetSdkVersion,
    Shutdown,
}

impl Command {
    pub fn parse(method: &str, arguments: &Value) -> Result<Self> {
        let args = Arguments::new(arguments)?;

        let command = match method {
            "initialize" | "initWithAccessToken" => Command::Initialize {
                access_token: args.required_id(&["accessToken", "token"])?,
            },
            "listChannels" | "getChannels" => Command::ListChannels,
            "sendMessage" | "sendMessageInChannel" => Command::SendMessage {
                channel_id: args.required_id(&["channelId", "sid"])?,
                body: args.required_str(&["body", "message"])?,
            },
            "fetchMessages" | "getChannelMessages" => Command::FetchMessages {
                channel_id: args.required_id(&["channelId", "sid"])?,
                after_index: args.required_index(&["afterIndex", "index"])?,
            },
            "fetchLastMessage" | "getChannelLastMessage" => Command::FetchLastMessage {
                channel_id: args.required_id(&["channelId", "sid"])?,
            },
            "createChannel" => Command::CreateChannel {
                friendly_name: args.required_id(&["friendlyName"])?,
                channel_type: args.channel_type("channelType")?,
            },
            "getSessionState" => Command::GetSessionState,
            "getSdkVersion" | "getPlatformVersion" => Command::GetSdkVersion,
            "shutdown" => Command::Shutdown,
            other => {
                warn!("Unknown method: {}", other);
                return Err(ChatBridgeError::NotImplemented {
                    method: other.to_string(),
                });
            }
        };
        Ok(command)
    }
}

/// 命名参数的读取器，接受 JSON 对象或 null（无参数）
struct Arguments<'a> {
    map: Option<&'a serde_json::Map<String, Value>>,
}

impl<'a> Arguments<'a> {
    fn new(value: &'a Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self { map: None }),
            Value::Object(map) => Ok(Self { map: Some(map) }),
            _ => Err(ChatBridgeError::invalid_argument(
                "arguments",
                "must be an object",
            )),
        }
    }

    /// 按顺序取第一个存在且非 null 的参数
    fn lookup(&self, names: &[&str]) -> Option<&'a Value> {
        let map = self.map?;
        names
            .iter()
            .find_map(|name| map.get(*name).filter(|v| !v.is_null()))
    }

    fn required_str(&self, names: &[&str]) -> Result<String> {
        let field = names[0];
        match self.lookup(names) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(ChatBridgeError::invalid_argument(field, "must be a string")),
            None => Err(ChatBridgeError::invalid_argument(field, "is required")),
        }
    }

    fn required_id(&self, names: &[&str]) -> Result<String> {
        let value = self.required_str(names)?;
        if value.trim().is_empty() {
            return Err(ChatBridgeError::invalid_argument(names[0], "must not be empty"));
        }
        Ok(value)
    }

    fn required_index(&self, names: &[&str]) -> Result<u64> {
        let field = names[0];
        match self.lookup(names) {
            Some(Value::Number(n)) => n.as_u64().ok_or_else(|| {
                ChatBridgeError::invalid_argument(field, "must be a non-negative integer")
            }),
            Some(Value::String(s)) => s.trim().parse::<u64>().map_err(|_| {
                ChatBridgeError::invalid_argument(field, "must be a non-negative integer")
            }),
            Some(_) => Err(ChatBridgeError::invalid_argument(
                field,
                "must be a non-negative integer",
            )),
            None => Err(ChatBridgeError::invalid_argument(field, "is required")),
        }
    }

    fn channel_type(&self, name: &str) -> Result<ChannelType> {
        match self.lookup(&[name]) {
            None => Ok(ChannelType::default()),
            Some(Value::String(s)) => s
                .parse::<ChannelType>()
                .map_err(|msg| ChatBridgeError::invalid_argument(name, &msg)),
            Some(_) => Err(ChatBridgeError::invalid_argument(name, "must be a string")),
        }
    }
}

/// JSON 命令入口
#[derive(Clone)]
pub struct BridgeGateway {
    session: Arc<SessionManager>,
}

impl BridgeGateway {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// 执行一次调用，返回 JSON 结果
    pub async fn invoke(&self, method: &str, arguments: &Value) -> Result<Value> {
        debug!("chatbridge gateway->{}()", method);
        let command = Command::parse(method, arguments)?;
        self.execute(command).await
    }

    pub async fn handle(&self, call: MethodCall) -> MethodResponse {
        self.invoke(&call.method, &call.arguments).await.into()
    }

    pub async fn execute(&self, command: Command) -> Result<Value> {
        let session = &self.session;
        let value = match command {
            Command::Initialize { access_token } => {
                session.initialize(&access_token).await?;
                Value::Bool(true)
            }
            Command::ListChannels => serde_json::to_value(session.list_channels().await?)?,
            Command::SendMessage { channel_id, body } => {
                Value::Bool(session.send_message(&channel_id, &body).await?)
            }
            Command::FetchMessages {
                channel_id,
                after_index,
            } => serde_json::to_value(session.fetch_messages(&channel_id, after_index).await?)?,
            Command::FetchLastMessage { channel_id } => {
                serde_json::to_value(session.fetch_last_message(&channel_id).await?)?
            }
            Command::CreateChannel {
                friendly_name,
                channel_type,
            } => serde_json::to_value(session.create_channel(&friendly_name, channel_type).await?)?,
            Command::GetSessionState => json!({
                "state": session.session_state().await,
                "syncStatus": session.sync_status().await,
            }),
            Command::GetSdkVersion => Value::String(version::version_string()),
            Command::Shutdown => {
                session.shutdown().await?;
                Value::Bool(true)
            }
        };
        Ok(value)
    }
}
