/// 聊天机器人
///
/// 根据聊天内容决定回复，并把所有处理器注册到 WebSocket 客户端

use common::eventsub::{message_type, ChatMessage, InboundMessage, SubscriptionCondition};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::helix::HelixClient;
use crate::ollama::OllamaClient;
use crate::ws::{Client, ClientOptions, SessionRegistrar};

/// 回复方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// 直接回复固定文本
    Text(String),
    /// 交给 Ollama 生成回复
    Prompt(String),
}

/// 判断一条聊天消息是否需要回复
pub fn classify(text: &str, mention: Option<&str>) -> Option<Reply> {
    let text = text.trim();
    if text == "HeyGuys" {
        return Some(Reply::Text("VoHiYo".to_string()));
    }

    let mention = mention.filter(|m| !m.is_empty())?;
    let rest = text.strip_prefix(mention)?.trim();
    if rest.is_empty() {
        return None;
    }
    Some(Reply::Prompt(rest.to_string()))
}

/// 聊天机器人
#[derive(Clone)]
pub struct ChatBot {
    helix: HelixClient,
    broadcaster_id: String,
    sender_id: String,
    mention: Option<String>,
    ollama: Option<OllamaClient>,
}

impl ChatBot {
    pub fn new(
        helix: HelixClient,
        broadcaster_id: impl Into<String>,
        sender_id: impl Into<String>,
    ) -> Self {
        Self {
            helix,
            broadcaster_id: broadcaster_id.into(),
            sender_id: sender_id.into(),
            mention: None,
            ollama: None,
        }
    }

    /// 启用 @提及 时的 Ollama 回复
    pub fn with_ollama(mut self, mention: impl Into<String>, ollama: OllamaClient) -> Self {
        self.mention = Some(mention.into());
        self.ollama = Some(ollama);
        self
    }

    pub fn from_config(cfg: &Config, helix: HelixClient) -> Self {
        let bot = Self::new(helix, cfg.chat_channel_user_id.clone(), cfg.bot_user_id.clone());
        match (&cfg.bot_mention, &cfg.ollama_url) {
            (Some(mention), Some(url)) => {
                info!(
                    "🤖 已启用 Ollama 回复: model={}, mention={}",
                    cfg.ollama_model, mention
                );
                let ollama = OllamaClient::new(
                    url,
                    cfg.ollama_model.clone(),
                    cfg.ollama_language.clone(),
                );
                bot.with_ollama(mention.clone(), ollama)
            }
            _ => bot,
        }
    }

    /// 处理一条聊天消息
    pub async fn on_message(&self, chat: ChatMessage) -> anyhow::Result<()> {
        let mention = self.mention.as_deref().filter(|_| self.ollama.is_some());
        let reply = match classify(&chat.text, mention) {
            Some(Reply::Text(text)) => text,
            Some(Reply::Prompt(prompt)) => {
                let Some(ollama) = &self.ollama else {
                    return Ok(());
                };
                let answer = ollama.generate(&prompt).await?;
                if answer.is_empty() {
                    warn!("Ollama 返回空回复，跳过");
                    return Ok(());
                }
                answer
            }
            None => return Ok(()),
        };

        self.helix
            .send_chat_message(&self.broadcaster_id, &self.sender_id, &reply)
            .await?;
        info!(user = %chat.chatter_user_login, reply = %reply, "📤 已回复");
        Ok(())
    }

    fn condition(&self) -> SubscriptionCondition {
        SubscriptionCondition {
            broadcaster_user_id: self.broadcaster_id.clone(),
            user_id: self.sender_id.clone(),
        }
    }
}

/// 构建客户端并注册全部处理器
pub async fn build_client(cfg: &Config, helix: HelixClient, bot: ChatBot) -> Client {
    let options = ClientOptions::new(cfg.eventsub_websocket_url.clone())
        .with_reconnect_delay(cfg.reconnect_delay())
        .on_connect(|| info!("🔌 已连接 EventSub"))
        .on_disconnect(|err| match err {
            Some(e) => warn!("EventSub 连接断开: {}", e),
            None => info!("EventSub 连接已关闭"),
        });
    let client = Client::new(options);

    client
        .handle_welcome(SessionRegistrar::chat_messages(Arc::new(helix), bot.condition()))
        .await;

    let bot = Arc::new(bot);
    client
        .handle_chat_message(move |chat: ChatMessage| {
            let bot = bot.clone();
            async move { bot.on_message(chat).await }
        })
        .await;

    client.handle(message_type::SESSION_KEEPALIVE, on_keepalive).await;
    client.handle(message_type::REVOCATION, on_revocation).await;
    client.handle(message_type::SESSION_RECONNECT, on_reconnect).await;
    client.handle_default(on_unhandled).await;

    client
}

async fn on_keepalive(_client: Client, _message: InboundMessage) -> anyhow::Result<()> {
    debug!("💓 keepalive");
    Ok(())
}

async fn on_revocation(_client: Client, message: InboundMessage) -> anyhow::Result<()> {
    let status = message
        .payload_str(&["subscription", "status"])
        .unwrap_or("unknown");
    warn!(status = %status, "订阅已被撤销");
    Ok(())
}

/// 只记录日志，等待服务端关闭连接后由重连流程接管
async fn on_reconnect(_client: Client, message: InboundMessage) -> anyhow::Result<()> {
    let url = message
        .payload_str(&["session", "reconnect_url"])
        .unwrap_or("-");
    warn!(reconnect_url = %url, "服务端要求重连");
    Ok(())
}

async fn on_unhandled(_client: Client, message: InboundMessage) -> anyhow::Result<()> {
    debug!("未处理的消息: {}", message.raw());
    Ok(())
}
