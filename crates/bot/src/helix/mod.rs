/// Helix 接口客户端
///
/// 创建 EventSub 订阅、发送聊天消息、校验 OAuth token

use async_trait::async_trait;
use common::eventsub::{
    parse_subscription_id, CreateSubscriptionRequest, SendChatMessageRequest,
    SendChatMessageResponse, ValidateTokenResponse,
};
use common::{Error, Result};
use reqwest::StatusCode;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::ws::SubscriptionApi;

/// 可替换的 OAuth token，回调页面写入新 token 后立即生效
#[derive(Clone, Default)]
pub struct TokenStore(Arc<RwLock<String>>);

impl TokenStore {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Arc::new(RwLock::new(token.into())))
    }

    pub async fn get(&self) -> String {
        self.0.read().await.clone()
    }

    pub async fn set(&self, token: impl Into<String>) {
        *self.0.write().await = token.into();
    }
}

/// Helix HTTP 客户端
#[derive(Clone)]
pub struct HelixClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    token: TokenStore,
}

impl HelixClient {
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        token: TokenStore,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            token,
        }
    }

    /// 带认证头的 POST 请求，返回状态码和响应体
    async fn post<T>(&self, path: &str, body: &T) -> Result<(StatusCode, Vec<u8>)>
    where
        T: serde::Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        let token = self.token.get().await;

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .header("Client-Id", &self.client_id)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        debug!("POST {} -> {}", url, status);

        Ok((status, bytes.to_vec()))
    }

    /// 创建 EventSub 订阅，成功时返回订阅 ID
    pub async fn create_subscription(&self, request: &CreateSubscriptionRequest) -> Result<String> {
        let (status, body) = self.post("/eventsub/subscriptions", request).await?;

        if status != StatusCode::ACCEPTED {
            return Err(unexpected(status, &body));
        }

        parse_subscription_id(&body)
    }

    /// 以机器人身份向频道发送聊天消息
    pub async fn send_chat_message(
        &self,
        broadcaster_id: &str,
        sender_id: &str,
        message: &str,
    ) -> Result<SendChatMessageResponse> {
        let request = SendChatMessageRequest {
            broadcaster_id: broadcaster_id.to_string(),
            sender_id: sender_id.to_string(),
            message: message.to_string(),
        };
        let (status, body) = self.post("/chat/messages", &request).await?;

        if status != StatusCode::OK {
            return Err(unexpected(status, &body));
        }

        let response: SendChatMessageResponse = serde_json::from_slice(&body)?;
        for sent in response.data.iter().filter(|m| !m.is_sent) {
            match &sent.drop_reason {
                Some(reason) => {
                    warn!(code = %reason.code, reason = %reason.message, "消息被丢弃")
                }
                None => warn!("消息未发送"),
            }
        }

        Ok(response)
    }
}

#[async_trait]
impl SubscriptionApi for HelixClient {
    async fn create_subscription(&self, request: &CreateSubscriptionRequest) -> Result<String> {
        HelixClient::create_subscription(self, request).await
    }
}

/// 校验 OAuth token
pub async fn validate_token(
    http: &reqwest::Client,
    url: &str,
    token: &str,
) -> Result<ValidateTokenResponse> {
    let response = http
        .get(url)
        .header("Authorization", format!("OAuth {}", token))
        .send()
        .await
        .map_err(|e| Error::Http(e.to_string()))?;

    let status = response.status();
    if status != StatusCode::OK {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Authentication(format!(
            "token 校验失败 {}: {}",
            status.as_u16(),
            body
        )));
    }

    let info: ValidateTokenResponse = response
        .json()
        .await
        .map_err(|e| Error::Http(e.to_string()))?;
    info!(
        login = info.login.as_deref().unwrap_or("-"),
        expires_in = info.expires_in,
        "🔑 OAuth token 有效"
    );

    Ok(info)
}

fn unexpected(status: StatusCode, body: &[u8]) -> Error {
    Error::UnexpectedStatus {
        status: status.as_u16(),
        body: String::from_utf8_lossy(body).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::eventsub::SubscriptionCondition;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> CreateSubscriptionRequest {
        CreateSubscriptionRequest::websocket(
            "channel.chat.message",
            "1",
            SubscriptionCondition {
                broadcaster_user_id: "1001".to_string(),
                user_id: "2002".to_string(),
            },
            "abc123",
        )
    }

    fn client(server: &MockServer) -> HelixClient {
        HelixClient::new(server.uri(), "client-id", TokenStore::new("token"))
    }

    #[tokio::test]
    async fn test_create_subscription() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/eventsub/subscriptions"))
            .and(header("Authorization", "Bearer token"))
            .and(header("Client-Id", "client-id"))
            .and(body_partial_json(json!({
                "type": "channel.chat.message",
                "transport": {"method": "websocket", "session_id": "abc123"}
            })))
            .respond_with(
                ResponseTemplate::new(202).set_body_json(json!({"data": [{"id": "sub-42"}]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let id = client(&server).create_subscription(&request()).await.unwrap();
        assert_eq!(id, "sub-42");
    }

    #[tokio::test]
    async fn test_create_subscription_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/eventsub/subscriptions"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        match client(&server).create_subscription(&request()).await {
            Err(Error::UnexpectedStatus { status, body }) => {
                assert_eq!(status, 403);
                assert_eq!(body, "forbidden");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_subscription_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/eventsub/subscriptions"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        let result = client(&server).create_subscription(&request()).await;
        assert!(matches!(result, Err(Error::EmptyData)));
    }

    #[tokio::test]
    async fn test_token_update_applies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/eventsub/subscriptions"))
            .and(header("Authorization", "Bearer fresh"))
            .respond_with(
                ResponseTemplate::new(202).set_body_json(json!({"data": [{"id": "sub-1"}]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let tokens = TokenStore::new("stale");
        let helix = HelixClient::new(server.uri(), "client-id", tokens.clone());
        tokens.set("fresh").await;

        assert_eq!(helix.create_subscription(&request()).await.unwrap(), "sub-1");
    }

    #[tokio::test]
    async fn test_send_chat_message_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{
                    "message_id": "",
                    "is_sent": false,
                    "drop_reason": {"code": "msg_duplicate", "message": "duplicate"}
                }]
            })))
            .mount(&server)
            .await;

        let response = client(&server)
            .send_chat_message("1001", "2002", "VoHiYo")
            .await
            .unwrap();
        assert!(!response.data[0].is_sent);
    }

    #[tokio::test]
    async fn test_validate_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth2/validate"))
            .and(header("Authorization", "OAuth good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "client_id": "client-id",
                "login": "bot",
                "user_id": "2002",
                "scopes": ["user:write:chat"],
                "expires_in": 3600
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/oauth2/validate"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid access token"))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let url = format!("{}/oauth2/validate", server.uri());

        let info = validate_token(&http, &url, "good").await.unwrap();
        assert_eq!(info.user_id.as_deref(), Some("2002"));

        let err = validate_token(&http, &url, "bad").await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }
}
