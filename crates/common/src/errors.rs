use thiserror::Error;

/// 统一错误类型
#[derive(Error, Debug)]
pub enum Error {
    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("认证错误: {0}")]
    Authentication(String),

    #[error("HTTP 请求错误: {0}")]
    Http(String),

    #[error("接口返回异常状态 {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("响应格式错误: 缺少 data 字段")]
    MissingData,

    #[error("响应格式错误: data 为空")]
    EmptyData,

    #[error("响应格式错误: 缺少订阅 id")]
    MissingSubscriptionId,
}

/// 统一结果类型
pub type Result<T> = std::result::Result<T, Error>;
