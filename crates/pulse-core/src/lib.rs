#![deny(unsafe_code)]
#![doc = "pulse-core: 进度驱动的完成事件引擎。"]
#![doc = ""]
#![doc = "== 组成 =="]
#![doc = "- [`ShutdownSignal`]：一次性、单写多读的终止令牌，在派生轮询线程时显式传入；"]
#![doc = "- [`CompletionPoller`]：专用线程上的“先排空、后有界阻塞”循环，直到观察到终止令牌；"]
#![doc = "- [`RoleDriver`]：以发起方或响应方身份建立上下文、注册唯一过程、启动轮询线程、等待宽限、完成关闭握手并销毁上下文；"]
#![doc = "- [`WorkLatch`]：以“工作完成”信号替代固定时长睡眠的宽限等待；"]
#![doc = "- [`PulseConfig`]：可由 TOML 加载的轮询/驱动参数；[`PulseError`]：带稳定错误码的致命错误。"]
#![doc = ""]
#![doc = "== 失败策略 =="]
#![doc = "核心不存在可恢复错误：库层以 `Result` 传播第一处异常，二进制入口通过 [`fail_fast`] 记录诊断并中止进程。"]

pub mod config;
pub mod error;
pub mod latch;
pub mod poller;
pub mod role;
pub mod signal;

pub use config::{DriverConfig, GracePolicy, PollerConfig, PulseConfig};
pub use error::{PulseError, Result};
pub use latch::{LatchWait, WorkLatch};
pub use poller::{CompletionPoller, PollerState, PollerStats};
pub use role::{GraceOutcome, NOOP_PROCEDURE, Role, RoleDriver, RoleReport, fail_fast};
pub use signal::ShutdownSignal;

/// 日志 target 常量，便于 `RUST_LOG=pulse::poller=trace` 之类的过滤。
pub mod targets {
    pub const POLLER: &str = "pulse::poller";
    pub const DRIVER: &str = "pulse::driver";
}
