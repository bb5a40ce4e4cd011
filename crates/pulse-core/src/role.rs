//! 角色驱动：发起方 / 响应方。
//!
//! # 教案式导航
//! - **Why**：关闭握手的正确性依赖严格的步骤顺序（建上下文 → 注册 → 启动轮询 → 角色工作 → 宽限 →
//!   触发令牌 → 汇合 → 销毁），把它集中在一处，两种角色只在“注册什么处理器、是否发出调用”上不同；
//! - **What**：[`RoleDriver::run`] 完成一次完整运行并返回 [`RoleReport`]；任何一步失败都返回 [`PulseError`]，
//!   已建立的上下文仍会在轮询线程汇合后被销毁；
//! - **How**：轮询线程通过 `std::thread::scope` 借用上下文，作用域结束即完成汇合，`destroy` 按值消费上下文，
//!   “销毁晚于汇合”由借用检查器在编译期保证。

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;
use pulse_transport::{
    CallOutcome, ContextId, EndpointClass, IncomingCall, ProcedureId, RpcHandler, Transport,
    TransportContext,
};
use tracing::{debug, error, info, warn};

use crate::config::{GracePolicy, PulseConfig};
use crate::error::{PulseError, Result};
use crate::latch::{LatchWait, WorkLatch};
use crate::poller::{CompletionPoller, PollerStats};
use crate::signal::ShutdownSignal;
use crate::targets::DRIVER;

/// 两种角色共用的无参过程名。
pub const NOOP_PROCEDURE: &str = "nm_noop";

/// 角色。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Role<A> {
    /// 注册过程但不处理入站调用；给定 `target` 时在轮询线程启动后发出一次调用。
    Initiator { target: Option<A> },
    /// 注册带自动应答处理器的过程。
    Responder,
}

impl<A> Role<A> {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Initiator { .. } => "initiator",
            Self::Responder => "responder",
        }
    }
}

/// 宽限等待如何结束。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraceOutcome {
    /// 等满了期限。
    Elapsed,
    /// 预期的工作量提前完成。
    Completed,
    /// 轮询线程失败，等待被提前打断。
    PollerFailed,
    /// 角色工作本身失败，未进入等待。
    Skipped,
}

/// 一次角色运行的观测结果。
#[derive(Clone, Debug)]
pub struct RoleReport {
    pub role: &'static str,
    pub procedure: ProcedureId,
    /// 响应方处理器被调用的次数。
    pub calls_served: u64,
    /// 响应方成功回送的应答数。
    pub replies_sent: u64,
    /// 发起方出站调用的结果；未发出或未在关闭前完成时为 `None`。
    pub outcome: Option<CallOutcome>,
    pub grace: GraceOutcome,
    pub poller: PollerStats,
}

#[derive(Debug, Default)]
struct ResponderCounters {
    calls: AtomicU64,
    replies: AtomicU64,
}

/// 把一个传输上下文绑定到某个角色并完成关闭握手。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 驱动线程是上下文生命周期的唯一所有者，轮询线程只借用它；
/// - 失败策略是“第一处异常即失败”：不重试、不降级，适合冒烟测试而非容错服务。
///
/// ## 契约（What）
/// - 每次 `run` 创建一个新上下文、一个新令牌、一个新轮询线程，多个驱动可以在同一进程中并存；
/// - 返回前令牌必已触发、轮询线程必已汇合、上下文必已销毁（创建失败的情形除外）；
/// - 错误优先级：轮询线程的致命错误 > 角色工作错误 > 销毁错误。
///
/// ## 注意事项（Trade-offs）
/// - 发起方在驱动线程上调用 `forward`，与轮询线程并发访问上下文，依赖传输实现自身的 `Sync` 保证。
pub struct RoleDriver<'t, T: Transport> {
    transport: &'t T,
    class: EndpointClass,
    config: PulseConfig,
}

impl<'t, T: Transport> RoleDriver<'t, T> {
    pub fn new(transport: &'t T, class: EndpointClass, config: PulseConfig) -> Self {
        Self {
            transport,
            class,
            config,
        }
    }

    pub fn config(&self) -> &PulseConfig {
        &self.config
    }

    /// 执行一次完整的角色运行。
    pub fn run(
        &self,
        role: Role<<T::Context as TransportContext>::Address>,
    ) -> Result<RoleReport> {
        self.config.validate()?;
        let id = ContextId(self.config.driver.context_id);
        let context = self
            .transport
            .create_context(&self.class, id)
            .map_err(|source| PulseError::CreateContext {
                class: self.class.to_string(),
                id: id.0,
                source,
            })?;
        info!(
            target: DRIVER,
            role = role.label(),
            class = %self.class,
            context = %context.address(),
            "transport context created"
        );

        let outcome = self.drive(&context, &role);

        let address = context.address().to_string();
        let destroyed = context.destroy().map_err(PulseError::Destroy);
        match &destroyed {
            Ok(()) => debug!(target: DRIVER, context = %address, "transport context destroyed"),
            Err(err) => error!(target: DRIVER, context = %address, error = %err, "destroy failed"),
        }

        let report = outcome?;
        destroyed?;
        Ok(report)
    }

    fn drive(
        &self,
        context: &T::Context,
        role: &Role<<T::Context as TransportContext>::Address>,
    ) -> Result<RoleReport> {
        let latch = Arc::new(WorkLatch::new());
        let counters = Arc::new(ResponderCounters::default());
        let outcome_slot: Arc<Mutex<Option<CallOutcome>>> = Arc::new(Mutex::new(None));

        let handler = match role {
            Role::Responder => Some(auto_reply_handler(
                Arc::clone(&counters),
                Arc::clone(&latch),
            )),
            Role::Initiator { .. } => None,
        };
        let name = self.config.driver.procedure.as_str();
        let procedure = context
            .register_procedure(name, handler)
            .map_err(|source| PulseError::Register {
                name: name.to_owned(),
                source,
            })?;
        debug!(target: DRIVER, procedure = name, id = %procedure, "procedure registered");

        let signal = ShutdownSignal::new();
        let (poller, grace) = thread::scope(|scope| -> Result<(PollerStats, GraceOutcome)> {
            let poller = CompletionPoller::new(context, signal.clone(), self.config.poller.clone());
            let poller_latch = Arc::clone(&latch);
            let handle = thread::Builder::new()
                .name(format!("pulse-progress-{}", role.label()))
                .spawn_scoped(scope, move || {
                    let guard = AbortOnExit::new(poller_latch);
                    let result = poller.run();
                    if result.is_ok() {
                        guard.disarm();
                    }
                    result
                })
                .map_err(PulseError::Spawn)?;

            let work = self.role_work(context, role, procedure, &outcome_slot, &latch);
            let grace = match &work {
                Ok(()) => self.await_grace(&latch),
                Err(_) => GraceOutcome::Skipped,
            };

            let raised_at = Instant::now();
            signal.raise();
            debug!(target: DRIVER, role = role.label(), grace = ?grace, "shutdown signal raised");

            let stats = handle.join().map_err(|panic| PulseError::Join(panic_text(panic)))??;
            debug!(
                target: DRIVER,
                role = role.label(),
                join_ms = raised_at.elapsed().as_millis() as u64,
                "progress thread joined"
            );
            work?;
            Ok((stats, grace))
        })?;

        let report = RoleReport {
            role: role.label(),
            procedure,
            calls_served: counters.calls.load(Ordering::Acquire),
            replies_sent: counters.replies.load(Ordering::Acquire),
            outcome: outcome_slot.lock().take(),
            grace,
            poller,
        };
        info!(
            target: DRIVER,
            role = report.role,
            calls = report.calls_served,
            replies = report.replies_sent,
            outcome = ?report.outcome,
            completions = report.poller.completions,
            "role run finished"
        );
        Ok(report)
    }

    fn role_work(
        &self,
        context: &T::Context,
        role: &Role<<T::Context as TransportContext>::Address>,
        procedure: ProcedureId,
        outcome_slot: &Arc<Mutex<Option<CallOutcome>>>,
        latch: &Arc<WorkLatch>,
    ) -> Result<()> {
        let Role::Initiator {
            target: Some(target),
        } = role
        else {
            return Ok(());
        };

        let slot = Arc::clone(outcome_slot);
        let latch = Arc::clone(latch);
        context
            .forward(
                target,
                procedure,
                Box::new(move |outcome: CallOutcome| {
                    if let CallOutcome::Failed(err) = &outcome {
                        warn!(target: DRIVER, error = %err, "outgoing call failed");
                    }
                    *slot.lock() = Some(outcome);
                    latch.arrive();
                }),
            )
            .map_err(|source| PulseError::Forward {
                target: target.to_string(),
                source,
            })?;
        debug!(target: DRIVER, target_addr = %target, "call forwarded");
        Ok(())
    }

    fn await_grace(&self, latch: &WorkLatch) -> GraceOutcome {
        let grace = self.config.driver.grace;
        let target = match grace {
            GracePolicy::Fixed { .. } => usize::MAX,
            GracePolicy::UntilComplete { expected, .. } => expected,
        };
        match latch.wait_for(target, grace.limit()) {
            LatchWait::Reached => GraceOutcome::Completed,
            LatchWait::Aborted => GraceOutcome::PollerFailed,
            LatchWait::TimedOut => GraceOutcome::Elapsed,
        }
    }
}

/// 响应方处理器：立即、无条件地回送空应答并释放调用句柄。
fn auto_reply_handler(counters: Arc<ResponderCounters>, latch: Arc<WorkLatch>) -> RpcHandler {
    Arc::new(move |mut call: Box<dyn IncomingCall>| {
        counters.calls.fetch_add(1, Ordering::AcqRel);
        let procedure = call.procedure();
        call.respond(None)?;
        counters.replies.fetch_add(1, Ordering::AcqRel);
        call.destroy()?;
        debug!(target: DRIVER, procedure = %procedure, "incoming call answered");
        latch.arrive();
        Ok(())
    })
}

/// 轮询线程以错误或 panic 结束时中止闩，让宽限等待中的驱动线程立即醒来。
struct AbortOnExit {
    latch: Arc<WorkLatch>,
    armed: bool,
}

impl AbortOnExit {
    fn new(latch: Arc<WorkLatch>) -> Self {
        Self { latch, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbortOnExit {
    fn drop(&mut self) {
        if self.armed || thread::panicking() {
            self.latch.abort();
        }
    }
}

fn panic_text(panic: Box<dyn Any + Send>) -> String {
    if let Some(text) = panic.downcast_ref::<&'static str>() {
        (*text).to_owned()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// 二进制入口的失败策略：记录诊断后立即中止进程。
///
/// # 契约说明（What）
/// - `Ok` 原样返回；`Err` 先以 `error` 级别输出结构化日志，再向标准错误写一行诊断（订阅器可能尚未安装），
///   最后调用 [`std::process::abort`]，不运行任何析构逻辑。
pub fn fail_fast<V>(result: Result<V>) -> V {
    match result {
        Ok(value) => value,
        Err(err) => {
            error!(target: DRIVER, code = err.code(), error = %err, "fatal error, aborting");
            eprintln!("pulse: fatal [{}] {err}", err.code());
            std::process::abort()
        }
    }
}
