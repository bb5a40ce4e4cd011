//! 单个回环上下文的共享状态：网络队列、就绪完成队列与未决调用表。
//!
//! # 教案式导航
//! - **定位（Where）**：被 [`crate::LoopbackFabric`] 以 `Arc` 共享，其他上下文只通过 [`Mailbox::deliver`] 写入；
//! - **流程（How）**：线上事件先进入 `wire`，`progress` 调用 [`NodeState::pump`] 把它们转化为就绪完成，
//!   同时让到期的未决调用以超时结束；`try_trigger` 只消费 `ready`。

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex, MutexGuard};
use pulse_transport::{
    CallOutcome, ProcedureId, ResponseCallback, RpcHandler, TransportError, TransportErrorKind,
};
use tracing::{debug, trace};

use crate::{LoopbackAddr, LoopbackCall, LoopbackFabric, TARGET};

/// 跨上下文投递的线上事件。
pub(crate) enum WireEvent {
    Request {
        call: u64,
        procedure: ProcedureId,
        reply_to: LoopbackAddr,
    },
    Response {
        call: u64,
        result: Result<Option<Bytes>, TransportError>,
    },
}

/// 等待 `try_trigger` 交付的完成。
pub(crate) enum Completion {
    Incoming {
        handler: RpcHandler,
        call: LoopbackCall,
    },
    Outcome {
        callback: ResponseCallback,
        outcome: CallOutcome,
    },
}

impl Completion {
    /// 执行回调；处理器的错误原样上抛给 `try_trigger`。
    pub(crate) fn invoke(self) -> pulse_transport::Result<()> {
        match self {
            Self::Incoming { handler, call } => handler(Box::new(call)),
            Self::Outcome { callback, outcome } => {
                callback(outcome);
                Ok(())
            }
        }
    }
}

pub(crate) struct Outstanding {
    target: LoopbackAddr,
    deadline: Instant,
    callback: ResponseCallback,
}

pub(crate) struct Registration {
    name: String,
    handler: Option<RpcHandler>,
}

#[derive(Default)]
pub(crate) struct NodeState {
    pub(crate) wire: VecDeque<WireEvent>,
    pub(crate) ready: VecDeque<Completion>,
    outstanding: HashMap<u64, Outstanding>,
    procedures: HashMap<ProcedureId, Registration>,
    next_call: u64,
    pub(crate) closed: bool,
}

impl NodeState {
    pub(crate) fn register(
        &mut self,
        name: &str,
        handler: Option<RpcHandler>,
    ) -> Result<ProcedureId, TransportError> {
        let id = ProcedureId::from_name(name);
        if let Some(existing) = self.procedures.get(&id) {
            let message = if existing.name == name {
                format!("procedure `{name}` is already registered")
            } else {
                format!("procedure `{name}` collides with `{}` ({id})", existing.name)
            };
            return Err(TransportError::new(
                TransportErrorKind::AlreadyRegistered,
                message,
            ));
        }
        self.procedures.insert(
            id,
            Registration {
                name: name.to_owned(),
                handler,
            },
        );
        Ok(id)
    }

    /// 登记一个出站调用，返回调用编号。
    pub(crate) fn track(
        &mut self,
        target: LoopbackAddr,
        timeout: Duration,
        callback: ResponseCallback,
    ) -> u64 {
        let call = self.next_call;
        self.next_call = self.next_call.wrapping_add(1);
        let now = Instant::now();
        let deadline = now.checked_add(timeout).unwrap_or(now);
        self.outstanding.insert(
            call,
            Outstanding {
                target,
                deadline,
                callback,
            },
        );
        call
    }

    /// 最早到期的未决调用。
    pub(crate) fn next_expiry(&self) -> Option<Instant> {
        self.outstanding.values().map(|entry| entry.deadline).min()
    }

    /// 处理全部线上事件并让到期调用超时，返回新增就绪完成数与需要回送的应答。
    ///
    /// # 契约说明（What）
    /// - 请求：过程未注册时回送 `NoSuchProcedure`；过程无处理器或本上下文不监听时丢弃，发起方最终超时；
    /// - 应答：匹配到未决调用则转为完成，已超时的迟到应答被丢弃；
    /// - 回送的应答由调用方在释放本上下文锁之后投递。
    pub(crate) fn pump(
        &mut self,
        fabric: &LoopbackFabric,
        listening: bool,
        now: Instant,
    ) -> (u32, Vec<(LoopbackAddr, WireEvent)>) {
        let mut readied = 0u32;
        let mut outbound = Vec::new();

        while let Some(event) = self.wire.pop_front() {
            match event {
                WireEvent::Request {
                    call,
                    procedure,
                    reply_to,
                } => {
                    if !listening {
                        trace!(target: TARGET, call, from = %reply_to, "request to non-listening context discarded");
                        continue;
                    }
                    match self.procedures.get(&procedure) {
                        None => outbound.push((
                            reply_to,
                            WireEvent::Response {
                                call,
                                result: Err(TransportError::new(
                                    TransportErrorKind::NoSuchProcedure,
                                    format!("procedure {procedure} is not registered"),
                                )),
                            },
                        )),
                        Some(Registration { handler: None, name }) => {
                            trace!(target: TARGET, call, procedure = %name, "request without handler discarded");
                        }
                        Some(Registration {
                            handler: Some(handler),
                            ..
                        }) => {
                            self.ready.push_back(Completion::Incoming {
                                handler: handler.clone(),
                                call: LoopbackCall::new(call, procedure, reply_to, fabric.clone()),
                            });
                            readied += 1;
                        }
                    }
                }
                WireEvent::Response { call, result } => match self.outstanding.remove(&call) {
                    Some(entry) => {
                        let outcome = match result {
                            Ok(payload) => CallOutcome::Responded { payload },
                            Err(err) => CallOutcome::Failed(err),
                        };
                        self.ready.push_back(Completion::Outcome {
                            callback: entry.callback,
                            outcome,
                        });
                        readied += 1;
                    }
                    None => debug!(target: TARGET, call, "late response discarded"),
                },
            }
        }

        let expired: Vec<u64> = self
            .outstanding
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(call, _)| *call)
            .collect();
        for call in expired {
            if let Some(entry) = self.outstanding.remove(&call) {
                debug!(target: TARGET, call, target_addr = %entry.target, "outgoing call timed out");
                self.ready.push_back(Completion::Outcome {
                    callback: entry.callback,
                    outcome: CallOutcome::Failed(TransportError::timed_out(format!(
                        "call #{call} to {} got no response",
                        entry.target
                    ))),
                });
                readied += 1;
            }
        }

        (readied, outbound)
    }

    /// 关闭并清空，返回被丢弃的完成与未决调用数量。
    pub(crate) fn close(&mut self) -> usize {
        self.closed = true;
        let dropped = self.ready.len() + self.outstanding.len();
        self.ready.clear();
        self.outstanding.clear();
        self.wire.clear();
        self.procedures.clear();
        dropped
    }
}

/// 共享的上下文状态与唤醒条件。
#[derive(Default)]
pub(crate) struct Mailbox {
    state: Mutex<NodeState>,
    activity: Condvar,
}

impl Mailbox {
    pub(crate) fn lock(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock()
    }

    /// 投递线上事件并唤醒阻塞在 `progress` 中的线程；上下文已关闭时返回 `false`。
    pub(crate) fn deliver(&self, event: WireEvent) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.wire.push_back(event);
        drop(state);
        self.activity.notify_all();
        true
    }

    pub(crate) fn notify(&self) {
        self.activity.notify_all();
    }

    /// 阻塞至被唤醒或到达 `deadline`。
    pub(crate) fn wait_until(&self, state: &mut MutexGuard<'_, NodeState>, deadline: Instant) {
        self.activity.wait_until(state, deadline);
    }
}

impl fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Mailbox")
            .field("wire", &state.wire.len())
            .field("ready", &state.ready.len())
            .field("outstanding", &state.outstanding.len())
            .field("closed", &state.closed)
            .finish()
    }
}
