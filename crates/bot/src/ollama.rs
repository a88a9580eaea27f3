/// Ollama 文本生成客户端

use common::{Error, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// 调用本地 Ollama 生成聊天回复
#[derive(Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    url: String,
    model: String,
    language: String,
}

impl OllamaClient {
    pub fn new(
        url: impl Into<String>,
        model: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            language: language.into(),
        }
    }

    fn prompt(&self, question: &str) -> String {
        format!(
            "You are a friendly Twitch chat bot. Answer in {} in at most 50 words. \
             Do not ask questions, do not apologize and do not quote yourself.\n\n{}",
            self.language, question
        )
    }

    /// 生成回复文本
    pub async fn generate(&self, question: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt: self.prompt(question),
            stream: false,
        };

        let response = self
            .http
            .post(format!("{}/api/generate", self.url))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::UnexpectedStatus { status: status.as_u16(), body });
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        debug!("Ollama 回复 {} 字符", body.response.len());

        Ok(body.response.trim().to_string())
    }
}
