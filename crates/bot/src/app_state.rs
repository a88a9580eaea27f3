/// 应用全局状态

use std::path::PathBuf;

use crate::helix::TokenStore;

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    /// 与 Helix 客户端共享的 OAuth token
    pub tokens: TokenStore,
    /// OAuth 回调校验用的 state
    pub secret_state: String,
    /// 静态文件目录
    pub static_dir: PathBuf,
}

impl AppState {
    pub fn new(
        tokens: TokenStore,
        secret_state: impl Into<String>,
        static_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            tokens,
            secret_state: secret_state.into(),
            static_dir: static_dir.into(),
        }
    }
}
