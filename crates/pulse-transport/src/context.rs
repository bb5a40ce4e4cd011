use std::fmt;
use std::time::Duration;

use crate::{
    ContextId, EndpointClass, PollStatus, ProcedureId, ResponseCallback, RpcHandler,
    TriggerReport,
};

/// 传输实现入口：负责创建上下文。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把“类别校验 + 端点绑定”集中在一处，驱动方只需给出类别与编号即可得到可推进的上下文。
///
/// ## 契约（What）
/// - 类别非法返回 [`crate::TransportErrorKind::InvalidClass`]；
/// - 同一 `(地址, 编号)` 重复绑定返回 [`crate::TransportErrorKind::AddressInUse`]；
/// - 返回的上下文由调用方独占所有权，生命周期结束时必须调用 [`TransportContext::destroy`]。
pub trait Transport: Send + Sync {
    type Context: TransportContext;

    fn create_context(&self, class: &EndpointClass, id: ContextId) -> crate::Result<Self::Context>;
}

/// 已绑定的传输上下文。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 上下文是轮询线程与驱动线程唯一共享的对象：轮询线程借用它执行 `try_trigger`/`progress`，
///   驱动线程持有它的所有权并最终销毁；
/// - 发起方在轮询线程运行期间从驱动线程发出调用，因此要求 `Sync`，内部同步由实现方负责。
///
/// ## 契约（What）
/// - `try_trigger(max)`：非阻塞；执行至多 `max` 个就绪回调；没有就绪完成时返回
///   [`TriggerReport::idle`] 且不产生任何副作用；回调返回的错误原样向上传播；
/// - `progress(timeout)`：阻塞至出现网络活动或超时，分别返回 [`PollStatus::Progressed`] /
///   [`PollStatus::TimedOut`]；返回 `Err` 表示传输已不可用；
/// - `destroy(self)`：按值消费，借用检查器因此保证销毁发生在所有借用（包括轮询线程）结束之后。
///
/// ## 风险提示（Trade-offs）
/// - 回调在 `try_trigger` 内同步执行，耗时回调会直接拉长交付延迟；
/// - `progress` 的超时是唯一的挂起点，实现方不得无界阻塞。
pub trait TransportContext: Send + Sync {
    /// 可被 `forward` 寻址的对端地址。
    type Address: Clone + fmt::Display + Send + Sync + 'static;

    /// 本上下文自身的地址。
    fn address(&self) -> Self::Address;

    /// 注册过程；`handler` 为空表示只发出调用、不处理入站调用。
    fn register_procedure(
        &self,
        name: &str,
        handler: Option<RpcHandler>,
    ) -> crate::Result<ProcedureId>;

    /// 向 `target` 发出一次调用，结果稍后以完成事件交付给 `on_complete`。
    fn forward(
        &self,
        target: &Self::Address,
        procedure: ProcedureId,
        on_complete: ResponseCallback,
    ) -> crate::Result<()>;

    /// 交付至多 `max_count` 个就绪完成。
    fn try_trigger(&self, max_count: u32) -> crate::Result<TriggerReport>;

    /// 推进网络 I/O，至多阻塞 `timeout`。
    fn progress(&self, timeout: Duration) -> crate::Result<PollStatus>;

    /// 销毁上下文。
    fn destroy(self) -> crate::Result<()>
    where
        Self: Sized;
}
