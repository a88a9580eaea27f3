/// Helix 接口数据类型定义
///
/// EventSub 订阅创建、聊天消息发送和 token 校验的请求/响应体

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{Error, Result};

// ============================================================================
// EventSub 订阅
// ============================================================================

/// 订阅条件：频道与机器人身份
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscriptionCondition {
    pub broadcaster_user_id: String,
    pub user_id: String,
}

/// 订阅传输方式
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscriptionTransport {
    pub method: String,
    pub session_id: String,
}

/// 创建订阅请求
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateSubscriptionRequest {
    #[serde(rename = "type")]
    pub subscription_type: String,
    pub version: String,
    pub condition: SubscriptionCondition,
    pub transport: SubscriptionTransport,
}

impl CreateSubscriptionRequest {
    /// 绑定到 WebSocket 会话的订阅
    pub fn websocket(
        subscription_type: impl Into<String>,
        version: impl Into<String>,
        condition: SubscriptionCondition,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            subscription_type: subscription_type.into(),
            version: version.into(),
            condition,
            transport: SubscriptionTransport {
                method: "websocket".to_string(),
                session_id: session_id.into(),
            },
        }
    }
}

/// 从创建订阅的响应体中取出 `data[0].id`
pub fn parse_subscription_id(body: &[u8]) -> Result<String> {
    let response: Value = serde_json::from_slice(body)?;

    let data = response
        .get("data")
        .and_then(Value::as_array)
        .ok_or(Error::MissingData)?;

    let first = data.first().ok_or(Error::EmptyData)?;

    first
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(Error::MissingSubscriptionId)
}

// ============================================================================
// 聊天消息
// ============================================================================

/// 发送聊天消息请求
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendChatMessageRequest {
    pub broadcaster_id: String,
    pub sender_id: String,
    pub message: String,
}

/// 发送聊天消息响应
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendChatMessageResponse {
    #[serde(default)]
    pub data: Vec<SentChatMessage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentChatMessage {
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub is_sent: bool,
    #[serde(default)]
    pub drop_reason: Option<DropReason>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropReason {
    pub code: String,
    pub message: String,
}

// ============================================================================
// Token 校验
// ============================================================================

/// `GET /oauth2/validate` 响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateTokenResponse {
    pub client_id: String,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub expires_in: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subscription_request_shape() {
        let req = CreateSubscriptionRequest::websocket(
            "channel.chat.message",
            "1",
            SubscriptionCondition {
                broadcaster_user_id: "1001".to_string(),
                user_id: "2002".to_string(),
            },
            "abc123",
        );

        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({
                "type": "channel.chat.message",
                "version": "1",
                "condition": {"broadcaster_user_id": "1001", "user_id": "2002"},
                "transport": {"method": "websocket", "session_id": "abc123"}
            })
        );
    }

    #[test]
    fn test_parse_subscription_id() {
        let body = br#"{"data":[{"id":"sub-1","status":"enabled"}],"total":1}"#;
        assert_eq!(parse_subscription_id(body).unwrap(), "sub-1");
    }

    #[test]
    fn test_parse_subscription_id_malformed() {
        assert!(matches!(parse_subscription_id(b"{}"), Err(Error::MissingData)));
        assert!(matches!(
            parse_subscription_id(br#"{"data":"nope"}"#),
            Err(Error::MissingData)
        ));
        assert!(matches!(
            parse_subscription_id(br#"{"data":[]}"#),
            Err(Error::EmptyData)
        ));
        assert!(matches!(
            parse_subscription_id(br#"{"data":[{"status":"enabled"}]}"#),
            Err(Error::MissingSubscriptionId)
        ));
        assert!(matches!(
            parse_subscription_id(b"not json"),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_send_chat_message_response() {
        let resp: SendChatMessageResponse = serde_json::from_value(json!({
            "data": [{
                "message_id": "",
                "is_sent": false,
                "drop_reason": {"code": "msg_duplicate", "message": "duplicate"}
            }]
        }))
        .unwrap();
        assert!(!resp.data[0].is_sent);
        assert_eq!(resp.data[0].drop_reason.as_ref().unwrap().code, "msg_duplicate");
    }
}
