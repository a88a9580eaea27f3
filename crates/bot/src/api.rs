/// HTTP 接口
///
/// 健康检查、OAuth 回调页面和静态文件

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, get_service},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::app_state::AppState;

/// 健康检查响应
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// OAuth 隐式授权回调表单
#[derive(Debug, Deserialize)]
pub struct CallbackForm {
    pub access_token: String,
    pub state: String,
}

/// 构建应用路由
pub fn router(state: AppState) -> Router {
    let callback_page = ServeFile::new(state.static_dir.join("callback.html"));
    let static_files = ServeDir::new(&state.static_dir);

    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/twitch/callback", get_service(callback_page).post(callback_handler))
        .fallback_service(static_files)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

/// 接收回调页面提交的 token
async fn callback_handler(
    State(state): State<AppState>,
    Form(form): Form<CallbackForm>,
) -> StatusCode {
    if form.state != state.secret_state {
        warn!("OAuth 回调 state 不匹配，拒绝");
        return StatusCode::UNAUTHORIZED;
    }

    state.tokens.set(form.access_token).await;
    info!("🔑 OAuth token 已更新");
    StatusCode::OK
}
