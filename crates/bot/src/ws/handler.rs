/// 消息处理器注册表
///
/// 按 metadata.message_type 路由入站消息，支持欢迎处理器和默认处理器

use common::eventsub::{subscription_type, ChatMessage, InboundMessage};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::client::Client;

/// 处理器返回的 Future
pub type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// 异步消息处理器类型
pub type HandlerFn = Arc<dyn Fn(Client, InboundMessage) -> HandlerFuture + Send + Sync>;

/// 将异步闭包包装为处理器
pub fn handler_fn<F, Fut>(handler: F) -> HandlerFn
where
    F: Fn(Client, InboundMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |client: Client, message: InboundMessage| {
        Box::pin(handler(client, message)) as HandlerFuture
    })
}

/// 路由结果
pub enum Route {
    /// 按消息类型精确匹配
    Exact(HandlerFn),
    /// 会话尚未建立时的欢迎处理器
    Welcome(HandlerFn),
    /// 兜底处理器
    Default(HandlerFn),
}

impl Route {
    pub fn kind(&self) -> &'static str {
        match self {
            Route::Exact(_) => "exact",
            Route::Welcome(_) => "welcome",
            Route::Default(_) => "default",
        }
    }

    pub fn into_handler(self) -> HandlerFn {
        match self {
            Route::Exact(h) | Route::Welcome(h) | Route::Default(h) => h,
        }
    }
}

/// 处理器注册表
///
/// 本身不加锁，由 `Client` 的读写锁统一保护
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, HandlerFn>,
    welcome: Option<HandlerFn>,
    default: Option<HandlerFn>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册消息类型处理器，同一类型重复注册时后者覆盖前者
    pub fn insert(&mut self, message_type: impl Into<String>, handler: HandlerFn) -> bool {
        let message_type = message_type.into();
        let replaced = self.handlers.insert(message_type.clone(), handler).is_some();
        if replaced {
            warn!("覆盖已注册的处理器: {}", message_type);
        }
        replaced
    }

    pub fn set_welcome(&mut self, handler: HandlerFn) {
        self.welcome = Some(handler);
    }

    pub fn set_default(&mut self, handler: HandlerFn) {
        self.default = Some(handler);
    }

    /// 查找处理器
    ///
    /// 顺序：精确匹配 → 会话未建立时的欢迎处理器 → 默认处理器
    pub fn resolve(&self, message_type: &str, session_established: bool) -> Option<Route> {
        if let Some(handler) = self.handlers.get(message_type) {
            return Some(Route::Exact(handler.clone()));
        }
        if !session_established {
            if let Some(handler) = &self.welcome {
                return Some(Route::Welcome(handler.clone()));
            }
        }
        self.default.clone().map(Route::Default)
    }

    /// 已注册的消息类型
    pub fn message_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}

/// 构造通知处理器：按 subscription_type 二次分发，只处理聊天消息
pub fn chat_message_handler<F, Fut>(on_message: F) -> HandlerFn
where
    F: Fn(ChatMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let on_message = Arc::new(on_message);
    handler_fn(move |_client: Client, message: InboundMessage| {
        let on_message = on_message.clone();
        async move {
            let subscription = match message.subscription_type() {
                Ok(subscription) => subscription,
                Err(e) => {
                    warn!(error = %e, "通知缺少订阅类型，已丢弃");
                    return Ok(());
                }
            };

            if subscription != subscription_type::CHANNEL_CHAT_MESSAGE {
                debug!("忽略未处理的订阅类型: {}", subscription);
                return Ok(());
            }

            let chat = match ChatMessage::try_from(&message) {
                Ok(chat) => chat,
                Err(e) => {
                    warn!(
                        field = %e.field,
                        section = e.section(),
                        error = %e,
                        "聊天消息格式错误，已丢弃"
                    );
                    return Ok(());
                }
            };

            info!(
                channel = %chat.broadcaster_user_login,
                user = %chat.chatter_user_login,
                message = %chat.text,
                "💬 收到聊天消息"
            );

            on_message(chat).await
        }
    })
}
