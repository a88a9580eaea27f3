/// EventSub 消息格式错误定义

use std::fmt;

/// 字段校验失败的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeErrorKind {
    /// 字段不存在
    Missing,
    /// 字段类型不符
    WrongType { expected: &'static str },
    /// 字段为空字符串
    Empty,
}

/// 消息格式错误
///
/// `field` 是从消息根开始的点分路径，例如 `payload.session.id`，
/// 第一段即所在分区（metadata / payload）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeError {
    pub field: String,
    pub kind: ShapeErrorKind,
}

impl ShapeError {
    /// 字段缺失
    pub fn missing(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind: ShapeErrorKind::Missing,
        }
    }

    /// 字段类型错误
    pub fn wrong_type(field: impl Into<String>, expected: &'static str) -> Self {
        Self {
            field: field.into(),
            kind: ShapeErrorKind::WrongType { expected },
        }
    }

    /// 字段为空
    pub fn empty(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind: ShapeErrorKind::Empty,
        }
    }

    /// 字段所在分区
    pub fn section(&self) -> &str {
        self.field.split('.').next().unwrap_or_default()
    }
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = if self.field.is_empty() { "<root>" } else { &self.field };
        match &self.kind {
            ShapeErrorKind::Missing => write!(f, "字段 {} 不存在", field),
            ShapeErrorKind::WrongType { expected } => {
                write!(f, "字段 {} 类型错误，期望 {}", field, expected)
            }
            ShapeErrorKind::Empty => write!(f, "字段 {} 为空", field),
        }
    }
}

impl std::error::Error for ShapeError {}
