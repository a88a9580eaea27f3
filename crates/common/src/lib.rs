/// Twitch 聊天机器人 - 公共库
/// 
/// 提供 EventSub 消息模型、Helix 请求/响应类型和统一错误处理

pub mod errors;
pub mod eventsub;

// 重新导出常用类型
pub use errors::{Error, Result};
pub use eventsub::{ChatMessage, InboundMessage, ShapeError, ShapeErrorKind, Welcome};
