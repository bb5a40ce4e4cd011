//! 核心错误域。
//!
//! # 教案式导航
//! - **Why**：引擎只有两类失败（致命传输错误、启动/拆除失败）外加配置错误，且全部不可恢复；
//!   统一枚举让驱动方可以先完成关闭握手，再把第一处根因交给调用方；
//! - **What**：每个变体都有稳定错误码（[`codes`]），遵循 `<域>.<语义>` 约定，供日志与告警聚合；
//! - **How**：传输层错误以 `source` 保留，`std::error::Error::source` 可以拿到完整链路。

use pulse_transport::TransportError;
use thiserror::Error;

/// 稳定错误码。
pub mod codes {
    pub const TRANSPORT_CREATE_CONTEXT: &str = "transport.create_context";
    pub const TRANSPORT_REGISTER: &str = "transport.register";
    pub const TRANSPORT_FORWARD: &str = "transport.forward";
    pub const TRANSPORT_TRIGGER: &str = "transport.trigger";
    pub const TRANSPORT_PROGRESS: &str = "transport.progress";
    pub const TRANSPORT_DESTROY: &str = "transport.destroy";
    pub const DRIVER_SPAWN: &str = "driver.spawn";
    pub const DRIVER_JOIN: &str = "driver.join";
    pub const CONFIG_INVALID: &str = "config.invalid";
}

/// `pulse-core` 的统一返回别名。
pub type Result<T, E = PulseError> = core::result::Result<T, E>;

/// 引擎错误。
///
/// # 契约说明（What）
/// - `Trigger`/`Progress`：轮询线程遇到的致命传输错误，轮询随即停止；
/// - `CreateContext`/`Register`/`Forward`/`Destroy`/`Spawn`/`Join`：启动与拆除步骤失败；
/// - `Config`：配置无法解析或取值越界。
///
/// # 风险提示（Trade-offs）
/// - `Join` 只保留 panic 载荷的文本形式，非字符串载荷会被记为占位描述。
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PulseError {
    #[error("failed to create transport context `{class}` (id {id}): {source}")]
    CreateContext {
        class: String,
        id: u8,
        source: TransportError,
    },
    #[error("failed to register procedure `{name}`: {source}")]
    Register {
        name: String,
        source: TransportError,
    },
    #[error("failed to forward call to `{target}`: {source}")]
    Forward {
        target: String,
        source: TransportError,
    },
    #[error("unexpected try_trigger failure: {0}")]
    Trigger(#[source] TransportError),
    #[error("unexpected progress failure: {0}")]
    Progress(#[source] TransportError),
    #[error("failed to destroy transport context: {0}")]
    Destroy(#[source] TransportError),
    #[error("failed to spawn progress thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("progress thread panicked: {0}")]
    Join(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PulseError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::CreateContext { .. } => codes::TRANSPORT_CREATE_CONTEXT,
            Self::Register { .. } => codes::TRANSPORT_REGISTER,
            Self::Forward { .. } => codes::TRANSPORT_FORWARD,
            Self::Trigger(_) => codes::TRANSPORT_TRIGGER,
            Self::Progress(_) => codes::TRANSPORT_PROGRESS,
            Self::Destroy(_) => codes::TRANSPORT_DESTROY,
            Self::Spawn(_) => codes::DRIVER_SPAWN,
            Self::Join(_) => codes::DRIVER_JOIN,
            Self::Config(_) => codes::CONFIG_INVALID,
        }
    }

    /// 是否由轮询线程中的传输调用引发。
    pub fn is_poller_failure(&self) -> bool {
        matches!(self, Self::Trigger(_) | Self::Progress(_))
    }

    /// 底层传输错误（若有）。
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Self::CreateContext { source, .. }
            | Self::Register { source, .. }
            | Self::Forward { source, .. } => Some(source),
            Self::Trigger(source) | Self::Progress(source) | Self::Destroy(source) => Some(source),
            Self::Spawn(_) | Self::Join(_) | Self::Config(_) => None,
        }
    }
}
