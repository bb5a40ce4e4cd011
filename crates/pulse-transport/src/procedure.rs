//! 过程注册与调用句柄契约。
//!
//! # 教案式导航
//! - **Why**：响应方需要在完成事件到达时执行回调并回送应答，发起方需要在调用结束时得到结果；
//!   两种回调都由轮询线程在 `try_trigger` 内部同步执行；
//! - **What**：[`RpcHandler`] 处理入站调用，[`ResponseCallback`] 接收出站调用的 [`CallOutcome`]；
//!   [`IncomingCall`] 是单次入站调用的句柄；
//! - **How**：过程编号由名称确定性派生（[`ProcedureId::from_name`]），对端无需协商即可对齐。

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::TransportError;

/// 过程编号。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcedureId(u32);

impl ProcedureId {
    const FNV_OFFSET: u32 = 0x811c_9dc5;
    const FNV_PRIME: u32 = 0x0100_0193;

    /// 以 FNV-1a（32 位）散列过程名得到编号。
    ///
    /// # 契约说明（What）
    /// - 同名必得同号，跨进程、跨实现稳定；
    /// - 不同名称可能碰撞，实现方应在注册时拒绝同号的第二个名称。
    pub const fn from_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash = Self::FNV_OFFSET;
        let mut idx = 0;
        while idx < bytes.len() {
            hash ^= bytes[idx] as u32;
            hash = hash.wrapping_mul(Self::FNV_PRIME);
            idx += 1;
        }
        Self(hash)
    }

    /// 原始数值。
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProcedureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// 单次入站调用的句柄。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 对应“应答 + 释放句柄”两步：应答把（可能为空的）载荷送回发起方，释放则归还传输层为该调用分配的资源。
///
/// ## 契约（What）
/// - `respond` 至多成功一次，重复调用返回 [`crate::TransportErrorKind::AlreadyResponded`]；
/// - `destroy` 消费句柄；未应答即销毁时，发起方最终会观察到超时；
/// - 两个方法都在轮询线程内被调用，实现方不得在其中阻塞等待网络。
pub trait IncomingCall: Send {
    /// 被调用的过程。
    fn procedure(&self) -> ProcedureId;

    /// 回送应答；`None` 表示空应答。
    fn respond(&mut self, payload: Option<Bytes>) -> crate::Result<()>;

    /// 释放句柄。
    fn destroy(self: Box<Self>) -> crate::Result<()>;
}

/// 入站调用处理器；返回错误会让所在的 `try_trigger` 以同一错误失败。
pub type RpcHandler = Arc<dyn Fn(Box<dyn IncomingCall>) -> crate::Result<()> + Send + Sync>;

/// 出站调用的完成回调，恰好被调用一次（上下文销毁时尚未交付的除外）。
pub type ResponseCallback = Box<dyn FnOnce(CallOutcome) + Send>;

/// 出站调用的最终结果。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallOutcome {
    /// 对端已应答。
    Responded { payload: Option<Bytes> },
    /// 调用失败，包括超时（[`TransportError::is_timeout`]）。
    Failed(TransportError),
}

impl CallOutcome {
    pub fn is_responded(&self) -> bool {
        matches!(self, Self::Responded { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Failed(err) if err.is_timeout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn procedure_ids_are_stable_per_name() {
        assert_eq!(ProcedureId::from_name("nm_noop"), ProcedureId::from_name("nm_noop"));
        assert_ne!(ProcedureId::from_name("nm_noop"), ProcedureId::from_name("nm_ping"));
        // FNV-1a 的空串散列等于偏移基。
        assert_eq!(ProcedureId::from_name("").get(), 0x811c_9dc5);
    }
}
