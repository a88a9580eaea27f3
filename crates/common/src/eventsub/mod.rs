/// EventSub 模块
///
/// WebSocket 入站消息模型与 Helix 订阅接口类型

pub mod error;
pub mod message;
pub mod types;

pub use error::{ShapeError, ShapeErrorKind};
pub use message::{message_type, subscription_type, ChatMessage, InboundMessage, Welcome};
pub use types::*;
