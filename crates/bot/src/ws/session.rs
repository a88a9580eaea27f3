/// 会话注册
///
/// 处理欢迎握手：记录会话 ID，并为该会话创建一次 EventSub 订阅

use async_trait::async_trait;
use common::eventsub::{
    subscription_type, CreateSubscriptionRequest, InboundMessage, SubscriptionCondition, Welcome,
};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::client::Client;

/// 订阅创建接口
#[async_trait]
pub trait SubscriptionApi: Send + Sync + 'static {
    /// 创建订阅，返回订阅 ID
    async fn create_subscription(
        &self,
        request: &CreateSubscriptionRequest,
    ) -> common::Result<String>;
}

/// 会话注册器
#[derive(Clone)]
pub struct SessionRegistrar {
    api: Arc<dyn SubscriptionApi>,
    subscription_type: String,
    version: String,
    condition: SubscriptionCondition,
}

impl SessionRegistrar {
    /// 订阅频道聊天消息
    pub fn chat_messages(api: Arc<dyn SubscriptionApi>, condition: SubscriptionCondition) -> Self {
        Self::new(api, subscription_type::CHANNEL_CHAT_MESSAGE, "1", condition)
    }

    pub fn new(
        api: Arc<dyn SubscriptionApi>,
        subscription_type: impl Into<String>,
        version: impl Into<String>,
        condition: SubscriptionCondition,
    ) -> Self {
        Self {
            api,
            subscription_type: subscription_type.into(),
            version: version.into(),
            condition,
        }
    }

    /// 完成握手
    ///
    /// 格式错误或会话已存在时直接返回 Ok，不发起订阅；
    /// 订阅失败返回错误，但不影响连接
    pub async fn on_welcome(
        &self,
        client: &Client,
        message: &InboundMessage,
    ) -> anyhow::Result<()> {
        let welcome = match Welcome::try_from(message) {
            Ok(welcome) => welcome,
            Err(e) => {
                error!(
                    field = %e.field,
                    section = e.section(),
                    error = %e,
                    "欢迎消息格式错误，放弃握手"
                );
                return Ok(());
            }
        };

        if !client.assign_session(&welcome.session_id).await {
            warn!(
                session_id = %welcome.session_id,
                "当前连接已有会话，忽略重复的欢迎消息"
            );
            return Ok(());
        }

        info!(
            session_id = %welcome.session_id,
            keepalive_timeout_seconds = ?welcome.keepalive_timeout_seconds,
            "🤝 会话已建立"
        );

        let request = CreateSubscriptionRequest::websocket(
            self.subscription_type.clone(),
            self.version.clone(),
            self.condition.clone(),
            welcome.session_id.clone(),
        );

        match self.api.create_subscription(&request).await {
            Ok(subscription_id) => {
                info!(
                    subscription_id = %subscription_id,
                    subscription_type = %self.subscription_type,
                    "✅ 订阅成功"
                );
                if !client
                    .set_subscription_id(&welcome.session_id, subscription_id)
                    .await
                {
                    warn!(session_id = %welcome.session_id, "会话已失效，丢弃订阅 ID");
                }
                Ok(())
            }
            Err(e) => {
                error!(
                    subscription_type = %self.subscription_type,
                    error = %e,
                    "订阅失败，本次连接将不会收到事件"
                );
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ws::client::ClientOptions;
    use common::Error;
    use serde_json::json;
    use std::sync::Mutex;

    /// 记录请求的订阅接口
    pub(crate) struct RecordingApi {
        pub requests: Mutex<Vec<CreateSubscriptionRequest>>,
        pub fail: bool,
    }

    impl RecordingApi {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                fail: false,
            })
        }

        pub fn failing() -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                fail: true,
            })
        }

        pub fn session_ids(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.transport.session_id.clone())
                .collect()
        }
    }

    #[async_trait]
    impl SubscriptionApi for RecordingApi {
        async fn create_subscription(
            &self,
            request: &CreateSubscriptionRequest,
        ) -> common::Result<String> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(Error::UnexpectedStatus {
                    status: 403,
                    body: "forbidden".to_string(),
                });
            }
            Ok("sub-1".to_string())
        }
    }

    pub(crate) fn condition() -> SubscriptionCondition {
        SubscriptionCondition {
            broadcaster_user_id: "1001".to_string(),
            user_id: "2002".to_string(),
        }
    }

    fn welcome(session: serde_json::Value) -> InboundMessage {
        InboundMessage::from_value(json!({
            "metadata": {"message_type": "session_welcome"},
            "payload": {"session": session}
        }))
    }

    fn client() -> Client {
        Client::new(ClientOptions::new("ws://127.0.0.1:9"))
    }

    #[tokio::test]
    async fn test_welcome_subscribes_once() {
        let api = RecordingApi::new();
        let registrar = SessionRegistrar::chat_messages(api.clone(), condition());
        let client = client();

        registrar
            .on_welcome(&client, &welcome(json!({"id": "abc123"})))
            .await
            .unwrap();

        assert_eq!(client.session_id().await.as_deref(), Some("abc123"));
        assert_eq!(client.subscription_id().await.as_deref(), Some("sub-1"));
        assert_eq!(api.session_ids(), vec!["abc123".to_string()]);

        let request = api.requests.lock().unwrap()[0].clone();
        assert_eq!(request.subscription_type, "channel.chat.message");
        assert_eq!(request.version, "1");
        assert_eq!(request.transport.method, "websocket");
        assert_eq!(request.condition, condition());
    }

    #[tokio::test]
    async fn test_duplicate_welcome_ignored() {
        let api = RecordingApi::new();
        let registrar = SessionRegistrar::chat_messages(api.clone(), condition());
        let client = client();

        registrar.on_welcome(&client, &welcome(json!({"id": "first"}))).await.unwrap();
        registrar.on_welcome(&client, &welcome(json!({"id": "second"}))).await.unwrap();

        assert_eq!(client.session_id().await.as_deref(), Some("first"));
        assert_eq!(api.session_ids(), vec!["first".to_string()]);
    }

    #[tokio::test]
    async fn test_malformed_welcome_no_subscription() {
        let api = RecordingApi::new();
        let registrar = SessionRegistrar::chat_messages(api.clone(), condition());
        let client = client();

        for session in [json!({}), json!({"id": 42}), json!({"id": ""}), json!("abc")] {
            registrar.on_welcome(&client, &welcome(session)).await.unwrap();
        }
        let no_payload = InboundMessage::from_value(json!({
            "metadata": {"message_type": "session_welcome"}
        }));
        registrar.on_welcome(&client, &no_payload).await.unwrap();

        assert!(client.session_id().await.is_none());
        assert!(api.session_ids().is_empty());
    }

    /// 订阅请求期间连接被替换
    struct SessionChangingApi {
        client: Client,
    }

    #[async_trait]
    impl SubscriptionApi for SessionChangingApi {
        async fn create_subscription(
            &self,
            _request: &CreateSubscriptionRequest,
        ) -> common::Result<String> {
            self.client.stop().await;
            Ok("sub-stale".to_string())
        }
    }

    #[tokio::test]
    async fn test_stale_subscription_id_discarded() {
        let client = client();
        let api = Arc::new(SessionChangingApi { client: client.clone() });
        let registrar = SessionRegistrar::chat_messages(api, condition());

        registrar
            .on_welcome(&client, &welcome(json!({"id": "abc123"})))
            .await
            .unwrap();

        assert!(client.session_id().await.is_none());
        assert!(client.subscription_id().await.is_none());
    }

    #[tokio::test]
    async fn test_subscription_failure_keeps_session() {
        let api = RecordingApi::failing();
        let registrar = SessionRegistrar::chat_messages(api.clone(), condition());
        let client = client();

        let result = registrar.on_welcome(&client, &welcome(json!({"id": "abc123"}))).await;

        assert!(result.is_err());
        assert_eq!(client.session_id().await.as_deref(), Some("abc123"));
        assert!(client.subscription_id().await.is_none());
        assert_eq!(api.requests.lock().unwrap().len(), 1);
    }
}
