//! 轮询与驱动参数。
//!
//! # 教案式导航
//! - **Why**：推进超时、排空预算、宽限策略都是部署相关的取值，固化在代码里会让冒烟测试与长跑场景无法共用一套实现；
//! - **What**：[`PulseConfig`] 聚合 `[poller]` 与 `[driver]` 两节，可通过 [`PulseConfig::from_toml_str`] 从 TOML 加载，
//!   缺省值为（100 ms 推进超时、排空不设上限、过程 `nm_noop`、上下文 1、固定 1 s 宽限）；
//! - **How**：`serde` 反序列化后统一调用 `validate`，越界取值以 [`PulseError::Config`] 拒绝。

use std::time::Duration;

use serde::Deserialize;

use crate::error::{PulseError, Result};
use crate::role::NOOP_PROCEDURE;

/// 轮询线程参数。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollerConfig {
    /// 单次 `progress` 的阻塞上限（毫秒），必须大于 0。
    pub poll_timeout_ms: u64,
    /// 每轮排空最多交付的完成数；`None` 表示排空至无就绪完成为止。
    pub drain_budget: Option<u32>,
}

impl PollerConfig {
    pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 100;

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_drain_budget(mut self, budget: Option<u32>) -> Self {
        self.drain_budget = budget;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_timeout_ms == 0 {
            return Err(PulseError::Config("poller.poll_timeout_ms must be > 0".into()));
        }
        if self.drain_budget == Some(0) {
            return Err(PulseError::Config(
                "poller.drain_budget must be > 0 when present".into(),
            ));
        }
        Ok(())
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: Self::DEFAULT_POLL_TIMEOUT_MS,
            drain_budget: None,
        }
    }
}

/// 宽限策略：驱动线程在发起关闭前等待多久。
///
/// # 契约说明（What）
/// - `Fixed`：固定等待 `millis` 毫秒，轮询线程失败时提前结束；
/// - `UntilComplete`：等待 `expected` 个角色工作单元完成（响应方为已服务的调用，发起方为收到的调用结果），
///   至多 `limit_ms` 毫秒。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum GracePolicy {
    Fixed { millis: u64 },
    UntilComplete { expected: usize, limit_ms: u64 },
}

impl GracePolicy {
    pub const DEFAULT_FIXED_MILLIS: u64 = 1_000;

    pub fn fixed(duration: Duration) -> Self {
        Self::Fixed {
            millis: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn until_complete(expected: usize, limit: Duration) -> Self {
        Self::UntilComplete {
            expected,
            limit_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// 等待的上限。
    pub fn limit(&self) -> Duration {
        match *self {
            Self::Fixed { millis } => Duration::from_millis(millis),
            Self::UntilComplete { limit_ms, .. } => Duration::from_millis(limit_ms),
        }
    }

    fn validate(&self) -> Result<()> {
        match *self {
            Self::Fixed { .. } => Ok(()),
            Self::UntilComplete { limit_ms: 0, .. } => Err(PulseError::Config(
                "driver.grace.limit_ms must be > 0".into(),
            )),
            Self::UntilComplete { .. } => Ok(()),
        }
    }
}

impl Default for GracePolicy {
    fn default() -> Self {
        Self::Fixed {
            millis: Self::DEFAULT_FIXED_MILLIS,
        }
    }
}

/// 角色驱动参数。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriverConfig {
    /// 注册的唯一过程名。
    pub procedure: String,
    /// 上下文编号。
    pub context_id: u8,
    pub grace: GracePolicy,
}

impl DriverConfig {
    pub const DEFAULT_CONTEXT_ID: u8 = 1;

    pub fn with_grace(mut self, grace: GracePolicy) -> Self {
        self.grace = grace;
        self
    }

    pub fn with_context_id(mut self, id: u8) -> Self {
        self.context_id = id;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.procedure.trim().is_empty() {
            return Err(PulseError::Config("driver.procedure must not be empty".into()));
        }
        self.grace.validate()
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            procedure: NOOP_PROCEDURE.to_owned(),
            context_id: Self::DEFAULT_CONTEXT_ID,
            grace: GracePolicy::default(),
        }
    }
}

/// 完整配置。
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PulseConfig {
    pub poller: PollerConfig,
    pub driver: DriverConfig,
}

impl PulseConfig {
    /// 从 TOML 文本加载并校验。
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|err| PulseError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.poller.validate()?;
        self.driver.validate()
    }
}
