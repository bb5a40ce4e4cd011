use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pulse_transport::{
    ContextId, EndpointClass, PollStatus, ProcedureId, ResponseCallback, RpcHandler, Transport,
    TransportContext, TransportError, TransportErrorKind, TriggerReport,
};
use tracing::{debug, info, trace};

use crate::node::{Completion, Mailbox, WireEvent};
use crate::{LoopbackAddr, LoopbackFabric, PROTOCOL, TARGET};

/// 回环传输参数。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopbackConfig {
    /// 出站调用在没有应答时多久以超时结束。
    pub call_timeout: Duration,
}

impl LoopbackConfig {
    pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(1);

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            call_timeout: Self::DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// 在 [`LoopbackFabric`] 上创建上下文的传输。
#[derive(Clone, Debug)]
pub struct LoopbackTransport {
    fabric: LoopbackFabric,
    config: LoopbackConfig,
}

impl LoopbackTransport {
    pub fn new(fabric: LoopbackFabric, config: LoopbackConfig) -> Self {
        Self { fabric, config }
    }

    pub fn fabric(&self) -> &LoopbackFabric {
        &self.fabric
    }
}

impl Transport for LoopbackTransport {
    type Context = LoopbackContext;

    fn create_context(
        &self,
        class: &EndpointClass,
        id: ContextId,
    ) -> pulse_transport::Result<LoopbackContext> {
        if class.protocol() != PROTOCOL {
            return Err(TransportError::new(
                TransportErrorKind::InvalidClass,
                format!("unsupported protocol `{}`", class.protocol()),
            ));
        }
        if class.address().trim().is_empty() {
            return Err(TransportError::new(
                TransportErrorKind::InvalidClass,
                "endpoint address must not be empty",
            ));
        }

        let addr = LoopbackAddr::new(class.address(), id);
        let mailbox = Arc::new(Mailbox::default());
        self.fabric.bind(addr.clone(), Arc::clone(&mailbox))?;
        debug!(target: TARGET, addr = %addr, listening = class.is_listening(), "context bound");

        Ok(LoopbackContext {
            addr,
            fabric: self.fabric.clone(),
            mailbox,
            config: self.config,
            listening: class.is_listening(),
        })
    }
}

/// 绑定在回环织网上的传输上下文。
///
/// # 教案级注释
///
/// ## 契约（What）
/// - `try_trigger` 不阻塞、只交付已就绪的完成，无就绪完成时返回空报告且没有副作用；
///   某个回调失败时错误立即上抛，同批次尚未执行的完成留在队首，不会丢失；
/// - `progress` 处理网络队列、让到期调用超时；没有任何事件时在条件变量上等待，至多 `timeout`；
/// - `destroy`（或析构）从织网解绑并丢弃未交付的完成。
///
/// ## 注意事项（Trade-offs）
/// - 完成回调在释放上下文锁之后执行，回调内部可以再次调用 `forward`；
/// - 未绑定目标的调用不会立即失败，而是等到 `call_timeout` 以超时结束，与真实网络中“无人应答”的表现一致。
pub struct LoopbackContext {
    addr: LoopbackAddr,
    fabric: LoopbackFabric,
    mailbox: Arc<Mailbox>,
    config: LoopbackConfig,
    listening: bool,
}

impl LoopbackContext {
    /// 标记关闭、解绑并清空队列，返回被丢弃的数量；重复调用返回 `None`。
    fn close(&self) -> Option<usize> {
        let dropped = {
            let mut state = self.mailbox.lock();
            if state.closed {
                return None;
            }
            state.close()
        };
        self.fabric.unbind(&self.addr);
        Some(dropped)
    }

    fn send(&self, outbound: Vec<(LoopbackAddr, WireEvent)>) {
        for (target, event) in outbound {
            let delivered = self
                .fabric
                .lookup(&target)
                .is_some_and(|mailbox| mailbox.deliver(event));
            if !delivered {
                trace!(target: TARGET, to = %target, "wire event to unbound address dropped");
            }
        }
    }
}

impl TransportContext for LoopbackContext {
    type Address = LoopbackAddr;

    fn address(&self) -> LoopbackAddr {
        self.addr.clone()
    }

    fn register_procedure(
        &self,
        name: &str,
        handler: Option<RpcHandler>,
    ) -> pulse_transport::Result<ProcedureId> {
        let with_handler = handler.is_some();
        let id = self.mailbox.lock().register(name, handler)?;
        debug!(target: TARGET, addr = %self.addr, procedure = name, id = %id, with_handler, "procedure registered");
        Ok(id)
    }

    fn forward(
        &self,
        target: &LoopbackAddr,
        procedure: ProcedureId,
        on_complete: ResponseCallback,
    ) -> pulse_transport::Result<()> {
        let call = self
            .mailbox
            .lock()
            .track(target.clone(), self.config.call_timeout, on_complete);
        // 阻塞中的 `progress` 需要按新的到期时间重算等待上限。
        self.mailbox.notify();

        let request = WireEvent::Request {
            call,
            procedure,
            reply_to: self.addr.clone(),
        };
        match self.fabric.lookup(target) {
            Some(mailbox) if mailbox.deliver(request) => {
                trace!(target: TARGET, call, to = %target, "request queued");
            }
            _ => debug!(target: TARGET, call, to = %target, "target not bound, call will time out"),
        }
        Ok(())
    }

    fn try_trigger(&self, max_count: u32) -> pulse_transport::Result<TriggerReport> {
        let mut batch: VecDeque<Completion> = {
            let mut state = self.mailbox.lock();
            let take = state.ready.len().min(max_count as usize);
            state.ready.drain(..take).collect()
        };
        let mut delivered = 0u32;
        while let Some(completion) = batch.pop_front() {
            if let Err(err) = completion.invoke() {
                // 失败的那一个已被消费，其余完成放回队首，留给下一次触发。
                if !batch.is_empty() {
                    let mut state = self.mailbox.lock();
                    while let Some(pending) = batch.pop_back() {
                        state.ready.push_front(pending);
                    }
                }
                return Err(err);
            }
            delivered += 1;
        }
        Ok(TriggerReport::delivered(delivered))
    }

    fn progress(&self, timeout: Duration) -> pulse_transport::Result<PollStatus> {
        let started = Instant::now();
        let deadline = started.checked_add(timeout).unwrap_or(started);
        loop {
            let (readied, outbound) = {
                let mut state = self.mailbox.lock();
                state.pump(&self.fabric, self.listening, Instant::now())
            };
            self.send(outbound);
            if readied > 0 {
                return Ok(PollStatus::Progressed);
            }

            let mut state = self.mailbox.lock();
            if !state.ready.is_empty() {
                return Ok(PollStatus::Progressed);
            }
            if !state.wire.is_empty() {
                continue;
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(PollStatus::TimedOut);
            }
            let wake = state
                .next_expiry()
                .map_or(deadline, |expiry| expiry.min(deadline));
            if wake > now {
                self.mailbox.wait_until(&mut state, wake);
            }
        }
    }

    fn destroy(self) -> pulse_transport::Result<()> {
        if let Some(dropped) = self.close() {
            info!(target: TARGET, addr = %self.addr, dropped, "context destroyed");
        }
        Ok(())
    }
}

impl Drop for LoopbackContext {
    fn drop(&mut self) {
        if let Some(dropped) = self.close() {
            debug!(target: TARGET, addr = %self.addr, dropped, "context dropped without destroy");
        }
    }
}
