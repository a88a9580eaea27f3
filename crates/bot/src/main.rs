/// Twitch Chat Bot
///
/// 通过 EventSub WebSocket 接收聊天消息并自动回复，同时提供 OAuth 回调页面

mod api;
mod app_state;
mod chat;
mod config;
mod helix;
mod ollama;
mod ws;

use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    app_state::AppState,
    chat::ChatBot,
    helix::{HelixClient, TokenStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置
    dotenvy::dotenv().ok();
    let cfg = config::Config::from_env()?;

    // 初始化日志
    // RUST_LOG 优先，未设置时使用配置中的 LOG_LEVEL，例如：
    // RUST_LOG=bot=debug cargo run
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_env_filter(log_filter(&cfg))
        .init();

    info!("🚀 启动 Twitch Chat Bot...");
    info!("✅ 配置加载成功 (env: {}, log: {})", cfg.environment, cfg.log_level);

    let _ = rustls::crypto::ring::default_provider().install_default();

    // 校验 token，失败不影响启动，可通过回调页面重新授权
    let http = reqwest::Client::new();
    if let Err(e) = helix::validate_token(&http, &cfg.oauth_validate_url, &cfg.oauth_token).await {
        warn!("OAuth token 校验失败: {}", e);
    }

    let tokens = TokenStore::new(cfg.oauth_token.clone());
    let helix = HelixClient::new(cfg.helix_base_url.clone(), cfg.client_id.clone(), tokens.clone());

    // 启动 HTTP 服务
    let shutdown = CancellationToken::new();
    let app = api::router(AppState::new(
        tokens,
        cfg.twitch_secret_state.clone(),
        cfg.static_dir.clone(),
    ));
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.server_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("🎯 HTTP 服务监听在 http://{}", addr);

    let server_shutdown = shutdown.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await
    });

    // 创建 WebSocket 客户端
    let bot = ChatBot::from_config(&cfg, helix.clone());
    let client = chat::build_client(&cfg, helix, bot).await;

    info!("🎯 连接到 EventSub: {}", cfg.eventsub_websocket_url);
    if let Err(e) = client.start().await {
        shutdown.cancel();
        return Err(anyhow::anyhow!("EventSub 连接失败: {}", e));
    }

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("监听退出信号失败: {}", e);
            }
            info!("收到退出信号");
        }
        result = &mut server => {
            match result {
                Ok(Ok(())) => warn!("HTTP 服务已退出"),
                Ok(Err(e)) => error!("HTTP 服务错误: {}", e),
                Err(e) => error!("HTTP 服务任务异常: {}", e),
            }
        }
    }

    client.stop().await;
    shutdown.cancel();
    if !server.is_finished() {
        let _ = server.await;
    }

    info!("👋 已退出");
    Ok(())
}

/// 日志过滤器：RUST_LOG 优先，其次为配置的日志级别
fn log_filter(cfg: &config::Config) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.log_level))
}
