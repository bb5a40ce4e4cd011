#![deny(unsafe_code)]
#![doc = "pulse-transport-loopback: 进程内回环传输。"]
#![doc = ""]
#![doc = "== 使命概述 =="]
#![doc = "- **Why**：进度驱动引擎的每一条可测性质（活性上限、关闭前不丢完成、响应方/发起方场景）都需要一个真实可推进的传输；回环传输在单进程内提供这组能力，无需网络与外部运行时。"]
#![doc = "- **What**：[`LoopbackFabric`] 是已绑定上下文的注册表，[`LoopbackTransport`] 按端点类别创建 [`LoopbackContext`]；请求与应答以线上事件的形式投递到目标上下文的网络队列，由 `progress` 转化为就绪完成，再由 `try_trigger` 交付。"]
#![doc = "- **How**：每个上下文一把 `parking_lot::Mutex` 加一个 `Condvar`；跨上下文投递总是在释放自身锁之后进行，避免两个上下文互相持锁等待。"]

mod addr;
mod call;
mod context;
mod fabric;
mod node;
pub mod smoke;

pub use addr::LoopbackAddr;
pub use call::LoopbackCall;
pub use context::{LoopbackConfig, LoopbackContext, LoopbackTransport};
pub use fabric::LoopbackFabric;

/// 回环传输的协议名。
pub const PROTOCOL: &str = "loopback";

/// 日志 target。
pub const TARGET: &str = "pulse::loopback";
