/// WebSocket 客户端
///
/// 连接 EventSub WebSocket，分发入站消息，连接断开后自动重连

use common::eventsub::{ChatMessage, InboundMessage};
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::handler::{chat_message_handler, handler_fn, HandlerRegistry};
use super::session::SessionRegistrar;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 连接建立回调
pub type ConnectCallback = Arc<dyn Fn() + Send + Sync>;

/// 连接断开回调，参数为导致断开的错误（正常关闭时为 None）
pub type DisconnectCallback = Arc<dyn Fn(Option<&ClientError>) + Send + Sync>;

/// WebSocket 客户端状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connected,
    Reconnecting,
    Stopped,
}

/// 客户端错误
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("连接失败: {0}")]
    Connect(#[source] tungstenite::Error),

    #[error("读取失败: {0}")]
    Read(#[source] tungstenite::Error),

    #[error("客户端已启动")]
    AlreadyStarted,

    #[error("客户端已停止")]
    Stopped,
}

/// 客户端配置
#[derive(Clone)]
pub struct ClientOptions {
    /// WebSocket 地址
    pub url: String,

    /// 重连间隔（固定，不递增）
    pub reconnect_delay: Duration,

    /// 连接断开后是否自动重连
    pub auto_reconnect: bool,

    /// 每次连接成功后同步调用
    pub on_connect: Option<ConnectCallback>,

    /// 每次读循环退出后调用
    pub on_disconnect: Option<DisconnectCallback>,
}

impl ClientOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: Duration::from_secs(5),
            auto_reconnect: true,
            on_connect: None,
            on_disconnect: None,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_auto_reconnect(mut self, enable: bool) -> Self {
        self.auto_reconnect = enable;
        self
    }

    pub fn on_connect<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_connect = Some(Arc::new(callback));
        self
    }

    pub fn on_disconnect<F>(mut self, callback: F) -> Self
    where
        F: Fn(Option<&ClientError>) + Send + Sync + 'static,
    {
        self.on_disconnect = Some(Arc::new(callback));
        self
    }
}

/// 读写锁保护的共享状态
struct Shared {
    state: ClientState,
    started: bool,
    registry: HandlerRegistry,
    session_id: Option<String>,
    subscription_id: Option<String>,
}

struct Inner {
    options: ClientOptions,
    shared: RwLock<Shared>,
    cancel: CancellationToken,
}

/// WebSocket 客户端
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// 创建新的 WebSocket 客户端
    pub fn new(options: ClientOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                options,
                shared: RwLock::new(Shared {
                    state: ClientState::Disconnected,
                    started: false,
                    registry: HandlerRegistry::new(),
                    session_id: None,
                    subscription_id: None,
                }),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// 注册消息类型处理器
    pub async fn handle<F, Fut>(&self, message_type: impl Into<String>, handler: F)
    where
        F: Fn(Client, InboundMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let mut shared = self.inner.shared.write().await;
        shared.registry.insert(message_type, handler_fn(handler));
    }

    /// 注册欢迎处理器：会话建立后创建订阅
    pub async fn handle_welcome(&self, registrar: SessionRegistrar) {
        let registrar = Arc::new(registrar);
        let handler = handler_fn(move |client: Client, message: InboundMessage| {
            let registrar = registrar.clone();
            async move { registrar.on_welcome(&client, &message).await }
        });

        let mut shared = self.inner.shared.write().await;
        shared.registry.set_welcome(handler);
    }

    /// 注册默认处理器
    pub async fn handle_default<F, Fut>(&self, handler: F)
    where
        F: Fn(Client, InboundMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let mut shared = self.inner.shared.write().await;
        shared.registry.set_default(handler_fn(handler));
    }

    /// 注册聊天消息处理器（占用 notification 类型）
    pub async fn handle_chat_message<F, Fut>(&self, handler: F)
    where
        F: Fn(ChatMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let mut shared = self.inner.shared.write().await;
        shared
            .registry
            .insert(common::eventsub::message_type::NOTIFICATION, chat_message_handler(handler));
    }

    /// 建立连接并启动读循环
    ///
    /// 首次连接失败直接返回错误，由调用方决定是否退出
    pub async fn start(&self) -> Result<(), ClientError> {
        if self.inner.cancel.is_cancelled() {
            return Err(ClientError::Stopped);
        }

        {
            let mut shared = self.inner.shared.write().await;
            if shared.started {
                return Err(ClientError::AlreadyStarted);
            }
            shared.started = true;
        }

        match self.connect().await {
            Ok(stream) => {
                self.spawn_read_loop(stream);
                Ok(())
            }
            Err(e) => {
                self.inner.shared.write().await.started = false;
                Err(e)
            }
        }
    }

    /// 停止客户端：中断重连等待并关闭当前连接
    ///
    /// 不等待正在执行的消息处理任务
    pub async fn stop(&self) {
        info!("停止 WebSocket 客户端");
        self.inner.cancel.cancel();

        let mut shared = self.inner.shared.write().await;
        shared.state = ClientState::Stopped;
        shared.session_id = None;
        shared.subscription_id = None;
    }

    /// 当前是否已连接
    pub async fn is_connected(&self) -> bool {
        self.inner.shared.read().await.state == ClientState::Connected
    }

    /// 获取当前状态
    pub async fn state(&self) -> ClientState {
        self.inner.shared.read().await.state
    }

    /// 当前连接的会话 ID
    pub async fn session_id(&self) -> Option<String> {
        self.inner.shared.read().await.session_id.clone()
    }

    /// 已注册精确处理器的消息类型
    pub async fn message_types(&self) -> Vec<String> {
        self.inner.shared.read().await.registry.message_types()
    }

    /// 当前会话的订阅 ID
    pub async fn subscription_id(&self) -> Option<String> {
        self.inner.shared.read().await.subscription_id.clone()
    }

    /// 记录会话 ID，当前连接已有会话时返回 false
    pub(crate) async fn assign_session(&self, session_id: &str) -> bool {
        let mut shared = self.inner.shared.write().await;
        if shared.session_id.is_some() {
            return false;
        }
        shared.session_id = Some(session_id.to_string());
        true
    }

    /// 记录订阅 ID，会话已更换时丢弃并返回 false
    pub(crate) async fn set_subscription_id(
        &self,
        session_id: &str,
        subscription_id: String,
    ) -> bool {
        let mut shared = self.inner.shared.write().await;
        if shared.session_id.as_deref() != Some(session_id) {
            return false;
        }
        shared.subscription_id = Some(subscription_id);
        true
    }

    /// 状态变更，进入 Stopped 后不再离开
    async fn transition(&self, next: ClientState) -> bool {
        let mut shared = self.inner.shared.write().await;
        if shared.state == ClientState::Stopped {
            return false;
        }
        debug!("状态变更: {:?} -> {:?}", shared.state, next);
        shared.state = next;
        // 每次连接都要重新握手
        shared.session_id = None;
        shared.subscription_id = None;
        true
    }

    /// 建立 WebSocket 连接
    async fn connect(&self) -> Result<WsStream, ClientError> {
        let url = self.inner.options.url.as_str();
        let (stream, response) = connect_async(url).await.map_err(ClientError::Connect)?;
        debug!("握手完成: status={}", response.status());

        if !self.transition(ClientState::Connected).await {
            return Err(ClientError::Stopped);
        }
        info!("✅ WebSocket 连接成功: {}", url);

        if let Some(on_connect) = &self.inner.options.on_connect {
            on_connect();
        }

        Ok(stream)
    }

    fn spawn_read_loop(&self, stream: WsStream) {
        let client = self.clone();
        tokio::spawn(async move { client.read_loop(stream).await });
    }

    /// 读循环：每条消息在独立任务中处理，退出时交给重连监督
    async fn read_loop(self, stream: WsStream) {
        let (mut sink, mut source) = stream.split();

        let outcome = loop {
            tokio::select! {
                _ = self.inner.cancel.cancelled() => {
                    debug!("收到停止信号，关闭连接");
                    break None;
                }
                frame = source.next() => match frame {
                    Some(Ok(message)) => self.on_frame(message),
                    Some(Err(e)) => {
                        if is_expected_error(&e) {
                            info!("连接已断开: {}", e);
                        } else {
                            error!("接收消息错误: {}", e);
                        }
                        break Some(ClientError::Read(e));
                    }
                    None => {
                        info!("连接已关闭");
                        break None;
                    }
                }
            }
        };

        if let Err(e) = sink.close().await {
            debug!("关闭连接: {}", e);
        }
        self.transition(ClientState::Disconnected).await;

        if let Some(on_disconnect) = &self.inner.options.on_disconnect {
            on_disconnect(outcome.as_ref());
        }

        if self.inner.options.auto_reconnect && !self.inner.cancel.is_cancelled() {
            // 唯一的重连入口
            let client = self.clone();
            tokio::spawn(async move { client.supervise().await });
        }
    }

    /// 处理单个帧：解码失败只记录日志，成功则异步分发
    fn on_frame(&self, message: Message) {
        let decoded = match message {
            Message::Text(text) => InboundMessage::from_json(&text),
            Message::Binary(data) => InboundMessage::from_slice(&data),
            Message::Close(frame) => {
                log_close(frame.as_ref());
                return;
            }
            _ => return,
        };

        match decoded {
            Ok(message) => {
                let client = self.clone();
                tokio::spawn(async move { client.dispatch(message).await });
            }
            Err(e) => error!("解析消息失败: {}", e),
        }
    }

    /// 将消息路由到唯一的处理器
    async fn dispatch(self, message: InboundMessage) {
        let message_type = match message.message_type() {
            Ok(message_type) => message_type.to_string(),
            Err(e) => {
                warn!(
                    field = %e.field,
                    section = e.section(),
                    error = %e,
                    "消息缺少类型，已丢弃"
                );
                return;
            }
        };

        let route = {
            let shared = self.inner.shared.read().await;
            shared
                .registry
                .resolve(&message_type, shared.session_id.is_some())
        };

        let Some(route) = route else {
            warn!("没有找到消息处理器: {}", message_type);
            return;
        };

        debug!("分发消息: type={}, route={}", message_type, route.kind());
        if let Err(e) = (route.into_handler())(self, message).await {
            error!("处理消息失败: type={}, error={:#}", message_type, e);
        }
    }

    /// 重连监督：固定间隔无限重试，直到成功或收到停止信号
    async fn supervise(self) {
        if !self.transition(ClientState::Reconnecting).await {
            return;
        }

        let url = self.inner.options.url.clone();
        let delay = self.inner.options.reconnect_delay;
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            warn!("{:?} 后重新连接 {} (第 {} 次)", delay, url, attempt);

            tokio::select! {
                _ = self.inner.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            let result = tokio::select! {
                _ = self.inner.cancel.cancelled() => break,
                result = self.connect() => result,
            };

            match result {
                Ok(stream) => {
                    info!("✅ 重新连接成功: {}", url);
                    self.spawn_read_loop(stream);
                    return;
                }
                Err(ClientError::Stopped) => break,
                Err(e) => warn!("重连失败: {}", e),
            }
        }

        debug!("重连已取消");
    }
}

/// 正常关闭码：服务端离开、正常关闭或未完成关闭握手
fn is_expected_close(code: CloseCode) -> bool {
    matches!(code, CloseCode::Normal | CloseCode::Away | CloseCode::Abnormal)
}

fn is_expected_error(e: &tungstenite::Error) -> bool {
    matches!(
        e,
        tungstenite::Error::ConnectionClosed
            | tungstenite::Error::AlreadyClosed
            | tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake)
    )
}

fn log_close(frame: Option<&CloseFrame<'_>>) {
    match frame {
        Some(frame) if is_expected_close(frame.code) => {
            info!(code = u16::from(frame.code), reason = %frame.reason, "服务端关闭连接");
        }
        Some(frame) => {
            warn!(code = u16::from(frame.code), reason = %frame.reason, "连接被异常关闭");
        }
        None => info!("服务端关闭连接"),
    }
}
