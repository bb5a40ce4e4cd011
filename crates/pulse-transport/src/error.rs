//! 传输层错误词汇。
//!
//! # 教案式导航
//! - **定位（Where）**：被所有 [`crate::TransportContext`] 实现与 `pulse-core` 共享；
//! - **动机（Why）**：核心需要区分“超时”与“真正的故障”，而实现方需要一个稳定的分类去描述失败，
//!   因此以 [`TransportErrorKind`] 承载机读语义，以消息承载排障信息；
//! - **约束（What）**：错误一律 `Send + Sync + 'static`，可以跨越轮询线程与驱动线程传递。

use std::borrow::Cow;

use thiserror::Error;

/// 传输失败的分类。
///
/// # 契约说明（What）
/// - `TimedOut` 只用于描述“某个出站调用在期限内没有结果”，不会出现在 `progress` 的错误返回中，
///   `progress` 的超时以 [`crate::PollStatus::TimedOut`] 表达；
/// - 其余变体对轮询线程而言均为致命错误。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum TransportErrorKind {
    /// 端点类别非法（协议不受支持或地址为空）。
    InvalidClass,
    /// `(地址, 上下文 ID)` 已被其他上下文占用。
    AddressInUse,
    /// 同名过程在同一上下文重复注册。
    AlreadyRegistered,
    /// 对端没有注册目标过程。
    NoSuchProcedure,
    /// 目标不可达。
    Unreachable,
    /// 出站调用超时。
    TimedOut,
    /// 同一调用句柄被重复应答。
    AlreadyResponded,
    /// 传输内部状态异常。
    Protocol,
    /// 上下文已关闭。
    Closed,
}

impl TransportErrorKind {
    /// 返回稳定的分类标签，用于日志字段。
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidClass => "invalid_class",
            Self::AddressInUse => "address_in_use",
            Self::AlreadyRegistered => "already_registered",
            Self::NoSuchProcedure => "no_such_procedure",
            Self::Unreachable => "unreachable",
            Self::TimedOut => "timed_out",
            Self::AlreadyResponded => "already_responded",
            Self::Protocol => "protocol",
            Self::Closed => "closed",
        }
    }
}

/// 传输层返回的错误。
///
/// # 教案式说明
/// - **意图 (Why)**：让实现方只需挑选分类并写一句人类可读的描述，核心即可据此做出“致命/非致命”判定；
/// - **契约 (What)**：`kind` 为稳定分类，`message` 面向排障人员；
/// - **取舍 (Trade-offs)**：以 `Cow<'static, str>` 保存消息，静态描述零分配，动态描述才分配。
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{}: {message}", .kind.as_str())]
pub struct TransportError {
    kind: TransportErrorKind,
    message: Cow<'static, str>,
}

impl TransportError {
    /// 构造传输错误。
    pub fn new(kind: TransportErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// 出站调用超时的便捷构造。
    pub fn timed_out(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(TransportErrorKind::TimedOut, message)
    }

    /// 错误分类。
    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    /// 人类可读描述。
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 是否为出站调用超时。
    pub fn is_timeout(&self) -> bool {
        self.kind == TransportErrorKind::TimedOut
    }
}
