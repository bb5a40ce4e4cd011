//! 进程内冒烟运行：响应方与发起方共享一个织网，各自独立完成关闭握手。
//!
//! # 教案式说明
//! - **What**：响应方监听 [`RESPONDER_ENDPOINT`]，发起方从 [`INITIATOR_ENDPOINT`] 向它发出一次调用；
//!   两个角色各有自己的上下文、令牌与轮询线程；
//! - **How**：先启动响应方并等待其地址绑定，再启动发起方，两者在作用域线程中运行并一起汇合；
//! - **契约**：任一角色失败即返回错误，响应方的错误优先；[`SmokeReport::succeeded`] 只看发起方是否收到应答。

use std::thread;
use std::time::Duration;

use pulse_core::{PulseConfig, PulseError, Role, RoleDriver, RoleReport};
use pulse_transport::{ContextId, EndpointClass};
use tracing::warn;

use crate::{LoopbackAddr, LoopbackTransport, PROTOCOL};

pub const RESPONDER_ENDPOINT: &str = "node-b";
pub const INITIATOR_ENDPOINT: &str = "node-a";

/// 冒烟运行的日志 target。
pub const SMOKE: &str = "pulse::smoke";

const BIND_WAIT: Duration = Duration::from_secs(5);

/// 两个角色的运行结果。
#[derive(Clone, Debug)]
pub struct SmokeReport {
    pub responder: RoleReport,
    pub initiator: RoleReport,
}

impl SmokeReport {
    /// 发起方的调用得到了应答。
    pub fn succeeded(&self) -> bool {
        self.initiator
            .outcome
            .as_ref()
            .is_some_and(|outcome| outcome.is_responded())
    }
}

/// 在 `transport` 上跑完一轮响应方 + 发起方。
pub fn run_smoke(
    transport: &LoopbackTransport,
    config: &PulseConfig,
) -> pulse_core::Result<SmokeReport> {
    let target = LoopbackAddr::new(RESPONDER_ENDPOINT, ContextId(config.driver.context_id));

    let (responder, initiator) = thread::scope(|scope| -> pulse_core::Result<_> {
        let responder = thread::Builder::new()
            .name("responder".into())
            .spawn_scoped(scope, || {
                RoleDriver::new(
                    transport,
                    EndpointClass::new(PROTOCOL, RESPONDER_ENDPOINT, true),
                    config.clone(),
                )
                .run(Role::Responder)
            })
            .map_err(PulseError::Spawn)?;

        if !transport.fabric().wait_bound(&target, BIND_WAIT) {
            warn!(target: SMOKE, addr = %target, "responder not bound yet, call may time out");
        }

        let initiator = thread::Builder::new()
            .name("initiator".into())
            .spawn_scoped(scope, || {
                RoleDriver::new(
                    transport,
                    EndpointClass::new(PROTOCOL, INITIATOR_ENDPOINT, false),
                    config.clone(),
                )
                .run(Role::Initiator {
                    target: Some(target.clone()),
                })
            })
            .map_err(PulseError::Spawn)?;

        Ok((join(responder), join(initiator)))
    })?;

    Ok(SmokeReport {
        responder: responder?,
        initiator: initiator?,
    })
}

fn join<T>(handle: thread::ScopedJoinHandle<'_, pulse_core::Result<T>>) -> pulse_core::Result<T> {
    handle
        .join()
        .map_err(|_| PulseError::Join("role thread panicked".into()))?
}
