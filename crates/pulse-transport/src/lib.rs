#![deny(unsafe_code)]
#![doc = "pulse-transport: 异步 RPC 传输协作方的能力契约。"]
#![doc = ""]
#![doc = "== 使命概述 =="]
#![doc = "- **Why**：进度驱动引擎只依赖传输层的一小组能力（建上下文、注册过程、非阻塞触发、有界阻塞推进、应答与销毁），本 crate 把这组能力固化为 trait，使核心与具体传输实现解耦。"]
#![doc = "- **What**：定义 [`Transport`]、[`TransportContext`]、[`IncomingCall`] 三个 trait，以及 [`PollStatus`]、[`TriggerReport`]、[`TransportError`] 等共享词汇。"]
#![doc = "- **How**：契约不关心连接建立、线上编码与过程分发，这些全部属于实现方；核心只通过这里的签名与传输交互。"]

pub mod class;
pub mod context;
pub mod error;
pub mod procedure;
pub mod status;

pub use class::{ContextId, EndpointClass};
pub use context::{Transport, TransportContext};
pub use error::{TransportError, TransportErrorKind};
pub use procedure::{CallOutcome, IncomingCall, ProcedureId, ResponseCallback, RpcHandler};
pub use status::{PollStatus, TriggerReport};

/// 传输契约统一使用的返回别名。
pub type Result<T, E = TransportError> = core::result::Result<T, E>;
