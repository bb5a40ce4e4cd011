//! 完成事件轮询器。
//!
//! # 教案式导航
//! - **定位（Where）**：运行在专用线程上，是唯一对传输上下文执行 `try_trigger`/`progress` 的调用方；
//! - **动机（Why）**：回调必须及时执行，传输也必须持续推进；同时关闭请求既不能让线程多挂起一个超时周期以上，
//!   也不能让关闭前已就绪的完成被静默丢弃；
//! - **流程（How）**：每轮先排空（`try_trigger(1)` 直到没有就绪完成或预算耗尽），令牌未触发时再做一次有界阻塞推进，
//!   令牌已触发则跳过阻塞；观察到令牌后做最后一次不设预算的排空，然后停止。
//!
//! ```text
//! Draining ──► Blocking ──┐
//!    ▲      └► Skipping ──┴──► CheckingShutdown ──(raised)──► Stopped
//!    └──────────────(not raised)──────┘
//! ```

use pulse_transport::{PollStatus, TransportContext};
use tracing::{debug, error, trace};

use crate::config::PollerConfig;
use crate::error::{PulseError, Result};
use crate::signal::ShutdownSignal;
use crate::targets::POLLER;

/// 轮询器所处阶段。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PollerState {
    Draining,
    Blocking,
    Skipping,
    CheckingShutdown,
    Stopped,
}

impl PollerState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draining => "draining",
            Self::Blocking => "blocking",
            Self::Skipping => "skipping",
            Self::CheckingShutdown => "checking_shutdown",
            Self::Stopped => "stopped",
        }
    }
}

/// 一次轮询运行的统计。
///
/// - `completions` 包含 `final_drain` 中交付的部分；
/// - `skipped_blocks`：因令牌已触发而跳过的阻塞推进次数；
/// - `budget_yields`：排空因预算耗尽而让位给推进的次数。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PollerStats {
    pub cycles: u64,
    pub completions: u64,
    pub progress_calls: u64,
    pub progress_timeouts: u64,
    pub skipped_blocks: u64,
    pub final_drain: u64,
    pub budget_yields: u64,
}

/// 进度驱动的完成事件轮询器。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - “先排空、后阻塞”的顺序是强制的：若先阻塞，已就绪的完成最多会被推迟一整个超时周期；
/// - 排空时逐个触发并立即重试，传输可能连续交付多个完成，尽早交付可以压低延迟并避免饿死响应方。
///
/// ## 契约（What）
/// - **前置条件**：`context` 在轮询器整个生命周期内有效（借用保证），且没有其他线程对它调用 `try_trigger`/`progress`；
/// - **后置条件**：`run` 返回 `Ok` 时，令牌触发之前已就绪的完成都已恰好交付一次；
/// - **活性**：令牌触发后，`run` 至多再经历一次 `poll_timeout` 的阻塞即返回；
/// - **失败**：`try_trigger`/`progress` 的任何错误都是致命的，轮询立即停止并返回
///   [`PulseError::Trigger`]/[`PulseError::Progress`]。
///
/// ## 注意事项（Trade-offs）
/// - 收尾排空不设预算：线程即将退出，没有需要让位的推进调用；持续涌入的完成会拖长收尾，调用方应先停止发起工作再触发令牌。
pub struct CompletionPoller<'ctx, C: TransportContext> {
    context: &'ctx C,
    signal: ShutdownSignal,
    config: PollerConfig,
    state: PollerState,
    stats: PollerStats,
}

impl<'ctx, C: TransportContext> CompletionPoller<'ctx, C> {
    pub fn new(context: &'ctx C, signal: ShutdownSignal, config: PollerConfig) -> Self {
        Self {
            context,
            signal,
            config,
            state: PollerState::Draining,
            stats: PollerStats::default(),
        }
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    pub fn stats(&self) -> PollerStats {
        self.stats
    }

    /// 运行至令牌触发或出现致命错误。
    pub fn run(mut self) -> Result<PollerStats> {
        debug!(
            target: POLLER,
            poll_timeout_ms = self.config.poll_timeout_ms,
            drain_budget = ?self.config.drain_budget,
            "progress loop started"
        );

        match self.cycle_until_shutdown().and_then(|()| self.final_drain()) {
            Ok(()) => {
                self.transition(PollerState::Stopped);
                debug!(target: POLLER, stats = ?self.stats, "progress loop stopped");
                Ok(self.stats)
            }
            Err(err) => {
                self.transition(PollerState::Stopped);
                error!(
                    target: POLLER,
                    code = err.code(),
                    error = %err,
                    stats = ?self.stats,
                    "progress loop aborted"
                );
                Err(err)
            }
        }
    }

    fn cycle_until_shutdown(&mut self) -> Result<()> {
        loop {
            self.transition(PollerState::Draining);
            self.drain(self.config.drain_budget)?;

            if self.signal.is_raised() {
                self.transition(PollerState::Skipping);
                self.stats.skipped_blocks += 1;
            } else {
                self.transition(PollerState::Blocking);
                self.block()?;
            }

            self.transition(PollerState::CheckingShutdown);
            self.stats.cycles += 1;
            if self.signal.is_raised() {
                return Ok(());
            }
        }
    }

    fn final_drain(&mut self) -> Result<()> {
        self.transition(PollerState::Draining);
        self.stats.final_drain = self.drain(None)?;
        Ok(())
    }

    /// 逐个触发就绪完成，返回交付数量。
    fn drain(&mut self, budget: Option<u32>) -> Result<u64> {
        let mut delivered = 0u64;
        loop {
            if let Some(budget) = budget {
                if delivered >= u64::from(budget) {
                    self.stats.budget_yields += 1;
                    trace!(target: POLLER, delivered, "drain budget exhausted, yielding to progress");
                    break;
                }
            }
            let report = self.context.try_trigger(1).map_err(PulseError::Trigger)?;
            if report.is_idle() {
                break;
            }
            delivered += u64::from(report.completed);
        }
        self.stats.completions += delivered;
        Ok(delivered)
    }

    fn block(&mut self) -> Result<()> {
        self.stats.progress_calls += 1;
        match self.context.progress(self.config.poll_timeout()) {
            Ok(PollStatus::TimedOut) => {
                self.stats.progress_timeouts += 1;
                Ok(())
            }
            Ok(PollStatus::Progressed) => Ok(()),
            Err(err) => Err(PulseError::Progress(err)),
        }
    }

    fn transition(&mut self, next: PollerState) {
        trace!(target: POLLER, from = self.state.as_str(), to = next.as_str(), "state");
        self.state = next;
    }
}
