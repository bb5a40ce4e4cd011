//! 可编排的传输替身。
//!
//! # 教案式说明
//! - **意图 (Why)**：轮询器与角色驱动的契约都是“调用顺序”层面的（先排空后阻塞、汇合后销毁），
//!   需要一个记录每次调用的传输实现才能断言；
//! - **逻辑 (How)**：`progress` 按脚本逐步执行（制造就绪完成 / 空闲超时 / 致命错误），脚本耗尽后退化为空闲；
//!   所有调用写入共享日志 [`Journal`]；
//! - **契约 (What)**：完成事件只在 `try_trigger` 中执行，且执行时不持有内部锁。
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use pulse_transport::{
    CallOutcome, ContextId, EndpointClass, IncomingCall, PollStatus, ProcedureId,
    ResponseCallback, RpcHandler, Transport, TransportContext, TransportError, TransportErrorKind,
    TriggerReport,
};

/// 日志条目。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    CreateContext(u8),
    Register(String),
    Forward(String),
    Trigger { delivered: u32 },
    Progress(PollStatus),
    Deliver,
    Respond,
    ReleaseCall,
    Destroy,
}

/// 共享调用日志。
#[derive(Clone, Debug, Default)]
pub struct Journal(Arc<Mutex<Vec<Event>>>);

impl Journal {
    pub fn record(&self, event: Event) {
        self.0.lock().push(event);
    }

    pub fn snapshot(&self) -> Vec<Event> {
        self.0.lock().clone()
    }

    pub fn count(&self, wanted: &Event) -> usize {
        self.0.lock().iter().filter(|event| *event == wanted).count()
    }

    pub fn position(&self, wanted: impl Fn(&Event) -> bool) -> Option<usize> {
        self.0.lock().iter().position(wanted)
    }
}

/// `progress` 的脚本步骤。
#[derive(Clone, Debug)]
pub enum Step {
    /// 推进期间有 `n` 个完成变为就绪。
    Ready(u32),
    /// 等满超时，没有活动。
    Idle,
    /// 致命错误。
    Fail(TransportError),
    /// 推进过程中 panic，模拟传输内部回调崩溃。
    Panic(&'static str),
}

type Completion = Box<dyn FnOnce() -> pulse_transport::Result<()> + Send>;

#[derive(Default)]
struct Inner {
    ready: VecDeque<Completion>,
    script: VecDeque<Step>,
    trigger_failure: Option<TransportError>,
    handler: Option<RpcHandler>,
}

/// 可编排的传输上下文。
pub struct ScriptedContext {
    id: u8,
    inner: Mutex<Inner>,
    journal: Journal,
    plan: ContextPlan,
}

impl ScriptedContext {
    pub fn new(script: impl IntoIterator<Item = Step>) -> Self {
        Self::with_plan(
            1,
            ContextPlan {
                script: script.into_iter().collect(),
                ..ContextPlan::default()
            },
            Journal::default(),
        )
    }

    /// 脚本为空，每次推进都等满超时。
    pub fn idle() -> Self {
        Self::new(Vec::new())
    }

    fn with_plan(id: u8, plan: ContextPlan, journal: Journal) -> Self {
        let inner = Inner {
            script: plan.script.iter().cloned().collect(),
            trigger_failure: plan.trigger_failure.clone(),
            ..Inner::default()
        };
        Self {
            id,
            inner: Mutex::new(inner),
            journal,
            plan,
        }
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// 让 `count` 个空完成立即就绪。
    pub fn make_ready(&self, count: u32) {
        let mut inner = self.inner.lock();
        for _ in 0..count {
            inner.ready.push_back(noop_completion(self.journal.clone()));
        }
    }

    pub fn fail_next_trigger(&self, err: TransportError) {
        self.inner.lock().trigger_failure = Some(err);
    }

    pub fn delivered(&self) -> usize {
        self.journal.count(&Event::Deliver)
    }

    pub fn script_exhausted(&self) -> bool {
        self.inner.lock().script.is_empty()
    }

    fn inject_call(&self, procedure: ProcedureId) {
        let mut inner = self.inner.lock();
        let Some(handler) = inner.handler.clone() else {
            return;
        };
        let journal = self.journal.clone();
        inner.ready.push_back(Box::new(move || {
            journal.record(Event::Deliver);
            handler(Box::new(ScriptedCall {
                procedure,
                responded: false,
                journal,
            }))
        }));
    }
}

fn noop_completion(journal: Journal) -> Completion {
    Box::new(move || {
        journal.record(Event::Deliver);
        Ok(())
    })
}

impl TransportContext for ScriptedContext {
    type Address = String;

    fn address(&self) -> String {
        format!("scripted#{}", self.id)
    }

    fn register_procedure(
        &self,
        name: &str,
        handler: Option<RpcHandler>,
    ) -> pulse_transport::Result<ProcedureId> {
        self.journal.record(Event::Register(name.to_owned()));
        if let Some(err) = &self.plan.register_failure {
            return Err(err.clone());
        }
        let procedure = ProcedureId::from_name(name);
        self.inner.lock().handler = handler;
        for _ in 0..self.plan.incoming_calls {
            self.inject_call(procedure);
        }
        Ok(procedure)
    }

    fn forward(
        &self,
        target: &String,
        _procedure: ProcedureId,
        on_complete: ResponseCallback,
    ) -> pulse_transport::Result<()> {
        self.journal.record(Event::Forward(target.clone()));
        if target == UNREACHABLE {
            return Err(TransportError::new(
                TransportErrorKind::Unreachable,
                "no route to scripted peer",
            ));
        }
        let journal = self.journal.clone();
        self.inner.lock().ready.push_back(Box::new(move || {
            journal.record(Event::Deliver);
            on_complete(CallOutcome::Responded { payload: None });
            Ok(())
        }));
        Ok(())
    }

    fn try_trigger(&self, max_count: u32) -> pulse_transport::Result<TriggerReport> {
        let mut batch = Vec::new();
        {
            let mut inner = self.inner.lock();
            if let Some(err) = inner.trigger_failure.take() {
                return Err(err);
            }
            while batch.len() < max_count as usize {
                match inner.ready.pop_front() {
                    Some(completion) => batch.push(completion),
                    None => break,
                }
            }
        }
        let delivered = batch.len() as u32;
        for completion in batch {
            completion()?;
        }
        self.journal.record(Event::Trigger { delivered });
        Ok(TriggerReport::delivered(delivered))
    }

    fn progress(&self, timeout: Duration) -> pulse_transport::Result<PollStatus> {
        let step = self.inner.lock().script.pop_front().unwrap_or(Step::Idle);
        let status = match step {
            Step::Ready(count) => {
                self.make_ready(count);
                PollStatus::Progressed
            }
            Step::Idle => {
                thread::sleep(timeout);
                PollStatus::TimedOut
            }
            Step::Fail(err) => return Err(err),
            Step::Panic(message) => panic!("{message}"),
        };
        self.journal.record(Event::Progress(status));
        Ok(status)
    }

    fn destroy(self) -> pulse_transport::Result<()> {
        self.journal.record(Event::Destroy);
        match self.plan.destroy_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// 入站调用替身。
struct ScriptedCall {
    procedure: ProcedureId,
    responded: bool,
    journal: Journal,
}

impl IncomingCall for ScriptedCall {
    fn procedure(&self) -> ProcedureId {
        self.procedure
    }

    fn respond(&mut self, _payload: Option<Bytes>) -> pulse_transport::Result<()> {
        if self.responded {
            return Err(TransportError::new(
                TransportErrorKind::AlreadyResponded,
                "scripted call answered twice",
            ));
        }
        self.responded = true;
        self.journal.record(Event::Respond);
        Ok(())
    }

    fn destroy(self: Box<Self>) -> pulse_transport::Result<()> {
        self.journal.record(Event::ReleaseCall);
        Ok(())
    }
}

/// 转发到该目标会同步失败。
pub const UNREACHABLE: &str = "unreachable";

/// 下一个上下文的行为编排。
#[derive(Clone, Debug, Default)]
pub struct ContextPlan {
    pub script: Vec<Step>,
    pub incoming_calls: u32,
    pub create_failure: Option<TransportError>,
    pub register_failure: Option<TransportError>,
    pub trigger_failure: Option<TransportError>,
    pub destroy_failure: Option<TransportError>,
}

/// 可编排的传输。
#[derive(Default)]
pub struct ScriptedTransport {
    journal: Journal,
    plan: Mutex<ContextPlan>,
}

impl ScriptedTransport {
    pub fn new(plan: ContextPlan) -> Self {
        Self {
            journal: Journal::default(),
            plan: Mutex::new(plan),
        }
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }
}

impl Transport for ScriptedTransport {
    type Context = ScriptedContext;

    fn create_context(
        &self,
        _class: &EndpointClass,
        id: ContextId,
    ) -> pulse_transport::Result<ScriptedContext> {
        self.journal.record(Event::CreateContext(id.0));
        let plan = self.plan.lock().clone();
        if let Some(err) = plan.create_failure {
            return Err(err);
        }
        Ok(ScriptedContext::with_plan(id.0, plan, self.journal.clone()))
    }
}

pub fn class() -> EndpointClass {
    EndpointClass::new("scripted", "node", true)
}

pub fn protocol_error(message: &'static str) -> TransportError {
    TransportError::new(TransportErrorKind::Protocol, message)
}

/// 轮询等待条件成立，至多 `limit`。
pub fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}
