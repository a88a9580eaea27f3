/// WebSocket 客户端模块
///
/// Bot 通过 WebSocket 连接 EventSub，接收会话与通知消息

pub mod client;
pub mod handler;
pub mod session;

pub use client::{Client, ClientOptions};
pub use session::{SessionRegistrar, SubscriptionApi};
