use bytes::Bytes;
use pulse_transport::{IncomingCall, ProcedureId, TransportError, TransportErrorKind};
use tracing::{debug, trace};

use crate::node::WireEvent;
use crate::{LoopbackAddr, LoopbackFabric, TARGET};

/// 回环传输上的入站调用句柄。
///
/// # 契约说明（What）
/// - `respond` 把应答投递到发起方的网络队列，发起方已销毁时应答被静默丢弃；
/// - 第二次 `respond` 返回 `AlreadyResponded`；
/// - 未应答即 `destroy` 不会通知发起方，对方在 `call_timeout` 后观察到超时。
pub struct LoopbackCall {
    call: u64,
    procedure: ProcedureId,
    reply_to: LoopbackAddr,
    fabric: LoopbackFabric,
    responded: bool,
}

impl LoopbackCall {
    pub(crate) fn new(
        call: u64,
        procedure: ProcedureId,
        reply_to: LoopbackAddr,
        fabric: LoopbackFabric,
    ) -> Self {
        Self {
            call,
            procedure,
            reply_to,
            fabric,
            responded: false,
        }
    }

    /// 发起方地址。
    pub fn caller(&self) -> &LoopbackAddr {
        &self.reply_to
    }
}

impl IncomingCall for LoopbackCall {
    fn procedure(&self) -> ProcedureId {
        self.procedure
    }

    fn respond(&mut self, payload: Option<Bytes>) -> pulse_transport::Result<()> {
        if self.responded {
            return Err(TransportError::new(
                TransportErrorKind::AlreadyResponded,
                format!("call #{} from {} was already answered", self.call, self.reply_to),
            ));
        }
        self.responded = true;

        let delivered = self.fabric.lookup(&self.reply_to).is_some_and(|mailbox| {
            mailbox.deliver(WireEvent::Response {
                call: self.call,
                result: Ok(payload),
            })
        });
        if !delivered {
            debug!(target: TARGET, call = self.call, caller = %self.reply_to, "caller gone, response dropped");
        }
        Ok(())
    }

    fn destroy(self: Box<Self>) -> pulse_transport::Result<()> {
        if !self.responded {
            debug!(target: TARGET, call = self.call, caller = %self.reply_to, "call released without response");
        } else {
            trace!(target: TARGET, call = self.call, "call released");
        }
        Ok(())
    }
}
