/// EventSub 入站消息定义
///
/// 消息保持为通用 JSON 树，按需通过带路径的类型化访问器校验字段

use serde_json::{Map, Value};

use super::error::ShapeError;

/// metadata.message_type 取值
pub mod message_type {
    pub const SESSION_WELCOME: &str = "session_welcome";
    pub const SESSION_KEEPALIVE: &str = "session_keepalive";
    pub const SESSION_RECONNECT: &str = "session_reconnect";
    pub const NOTIFICATION: &str = "notification";
    pub const REVOCATION: &str = "revocation";
}

/// metadata.subscription_type 取值
pub mod subscription_type {
    pub const CHANNEL_CHAT_MESSAGE: &str = "channel.chat.message";
}

const METADATA: &str = "metadata";
const PAYLOAD: &str = "payload";

/// 入站消息
///
/// 结构为 `{ metadata: {...}, payload: {...} }`，只在一次分发期间存在
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    raw: Value,
}

impl InboundMessage {
    /// 从 JSON 字符串解码
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text).map(Self::from_value)
    }

    /// 从 JSON 字节解码
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes).map(Self::from_value)
    }

    pub fn from_value(raw: Value) -> Self {
        Self { raw }
    }

    /// 原始 JSON 树
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// metadata.message_type
    pub fn message_type(&self) -> Result<&str, ShapeError> {
        self.metadata_str("message_type")
    }

    /// metadata.subscription_type（仅通知消息携带）
    pub fn subscription_type(&self) -> Result<&str, ShapeError> {
        self.metadata_str("subscription_type")
    }

    /// 读取 metadata 下的字符串字段
    pub fn metadata_str(&self, key: &str) -> Result<&str, ShapeError> {
        as_str(lookup(&self.raw, METADATA, &[key])?, METADATA, &[key])
    }

    /// 读取 payload 下的字符串字段
    pub fn payload_str(&self, path: &[&str]) -> Result<&str, ShapeError> {
        as_str(lookup(&self.raw, PAYLOAD, path)?, PAYLOAD, path)
    }

    /// 读取 payload 下的对象字段
    pub fn payload_object(&self, path: &[&str]) -> Result<&Map<String, Value>, ShapeError> {
        lookup(&self.raw, PAYLOAD, path)?
            .as_object()
            .ok_or_else(|| ShapeError::wrong_type(dotted(PAYLOAD, path), "object"))
    }

    /// 读取 payload 下的任意字段，不存在时返回 None
    pub fn payload_value(&self, path: &[&str]) -> Option<&Value> {
        lookup(&self.raw, PAYLOAD, path).ok()
    }
}

fn dotted(section: &str, path: &[&str]) -> String {
    std::iter::once(section)
        .chain(path.iter().copied())
        .collect::<Vec<_>>()
        .join(".")
}

/// 沿 section + path 逐级下钻，每一级都要求父节点是对象
fn lookup<'a>(root: &'a Value, section: &str, path: &[&str]) -> Result<&'a Value, ShapeError> {
    let mut current = root;
    let mut walked: Vec<&str> = Vec::with_capacity(path.len() + 1);

    for key in std::iter::once(section).chain(path.iter().copied()) {
        let object = current
            .as_object()
            .ok_or_else(|| ShapeError::wrong_type(walked.join("."), "object"))?;
        walked.push(key);
        current = object
            .get(key)
            .ok_or_else(|| ShapeError::missing(walked.join(".")))?;
    }

    Ok(current)
}

fn as_str<'a>(value: &'a Value, section: &str, path: &[&str]) -> Result<&'a str, ShapeError> {
    value
        .as_str()
        .ok_or_else(|| ShapeError::wrong_type(dotted(section, path), "string"))
}

/// 欢迎消息（握手）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Welcome {
    pub session_id: String,
    pub keepalive_timeout_seconds: Option<u64>,
}

impl TryFrom<&InboundMessage> for Welcome {
    type Error = ShapeError;

    fn try_from(message: &InboundMessage) -> Result<Self, Self::Error> {
        let session_id = message.payload_str(&["session", "id"])?;
        if session_id.is_empty() {
            return Err(ShapeError::empty("payload.session.id"));
        }

        let keepalive_timeout_seconds = message
            .payload_value(&["session", "keepalive_timeout_seconds"])
            .and_then(Value::as_u64);

        Ok(Self {
            session_id: session_id.to_string(),
            keepalive_timeout_seconds,
        })
    }
}

/// channel.chat.message 通知中的聊天消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub broadcaster_user_login: String,
    pub chatter_user_login: String,
    pub text: String,
}

impl TryFrom<&InboundMessage> for ChatMessage {
    type Error = ShapeError;

    fn try_from(message: &InboundMessage) -> Result<Self, Self::Error> {
        let event = message.payload_object(&["event"])?;
        let text = message.payload_str(&["event", "message", "text"])?;

        // 登录名缺失不影响处理，仅用于日志
        let login = |key: &str| {
            event
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Ok(Self {
            broadcaster_user_login: login("broadcaster_user_login"),
            chatter_user_login: login("chatter_user_login"),
            text: text.to_string(),
        })
    }
}
