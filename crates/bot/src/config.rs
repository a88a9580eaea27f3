/// 配置管理

use std::path::PathBuf;
use std::time::Duration;

use common::{Error, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server_port: u16,
    pub log_level: String,
    pub environment: String,
    pub bot_user_id: String,
    pub oauth_token: String,
    pub client_id: String,
    pub chat_channel_user_id: String,
    pub eventsub_websocket_url: String,
    pub helix_base_url: String,
    pub oauth_validate_url: String,
    pub twitch_secret_state: String,
    pub reconnect_delay_secs: u64,
    pub static_dir: PathBuf,
    pub bot_mention: Option<String>,
    pub ollama_url: Option<String>,
    pub ollama_model: String,
    pub ollama_language: String,
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 通过任意键值来源加载配置
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::Config(format!("缺少环境变量 {}", key)))
        };
        let optional = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let server_port = or("SERVER_PORT", "8080")
            .parse()
            .map_err(|e| Error::Config(format!("SERVER_PORT 无效: {}", e)))?;

        let reconnect_delay_secs = or("RECONNECT_DELAY_SECS", "3")
            .parse()
            .map_err(|e| Error::Config(format!("RECONNECT_DELAY_SECS 无效: {}", e)))?;

        Ok(Self {
            server_port,
            log_level: or("LOG_LEVEL", "info"),
            environment: or("APP_ENV", "development"),
            bot_user_id: required("BOT_USER_ID")?,
            oauth_token: required("OAUTH_TOKEN")?,
            client_id: required("CLIENT_ID")?,
            chat_channel_user_id: required("CHAT_CHANNEL_USER_ID")?,
            eventsub_websocket_url: or("EVENTSUB_WEBSOCKET_URL", "wss://eventsub.wss.twitch.tv/ws"),
            helix_base_url: or("HELIX_BASE_URL", "https://api.twitch.tv/helix"),
            oauth_validate_url: or("OAUTH_VALIDATE_URL", "https://id.twitch.tv/oauth2/validate"),
            twitch_secret_state: required("TWITCH_SECRET_STATE")?,
            reconnect_delay_secs,
            static_dir: PathBuf::from(or("STATIC_DIR", "web/static")),
            bot_mention: optional("BOT_MENTION"),
            ollama_url: optional("OLLAMA_URL"),
            ollama_model: or("OLLAMA_MODEL", "gemma3:1b"),
            ollama_language: or("OLLAMA_LANGUAGE", "Ukrainian"),
        })
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}
