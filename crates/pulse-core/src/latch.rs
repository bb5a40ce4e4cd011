use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// 宽限等待的结果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LatchWait {
    /// 已完成的工作量达到目标。
    Reached,
    /// 轮询线程失败，等待被提前唤醒。
    Aborted,
    /// 期限耗尽仍未达到目标。
    TimedOut,
}

/// “工作完成”计数闩：替代固定时长睡眠的同步手段。
///
/// # 教案级注释
/// - **意图 (Why)**：固定睡眠只是对网络活动耗时的猜测；驱动线程真正关心的是“角色工作是否已完成”，
///   因此由完成回调在轮询线程内 `arrive`，驱动线程据此尽早发起关闭；
/// - **逻辑 (How)**：`parking_lot::Mutex` 保护到达计数与中止标记，`Condvar` 负责唤醒等待者；
/// - **契约 (What)**：`wait_for(target, limit)` 在计数 `>= target`、闩被中止或期限耗尽三者之一发生时返回，
///   中止优先于达到目标；
/// - **风险 (Trade-offs)**：计数只增不减，同一个闩不适合复用到下一轮角色运行。
#[derive(Debug, Default)]
pub struct WorkLatch {
    state: Mutex<LatchState>,
    ready: Condvar,
}

#[derive(Debug, Default)]
struct LatchState {
    arrived: usize,
    aborted: bool,
}

impl WorkLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一个工作单元完成，返回累计数量。
    pub fn arrive(&self) -> usize {
        let mut state = self.state.lock();
        state.arrived += 1;
        let arrived = state.arrived;
        drop(state);
        self.ready.notify_all();
        arrived
    }

    /// 标记中止并唤醒所有等待者。
    pub fn abort(&self) {
        self.state.lock().aborted = true;
        self.ready.notify_all();
    }

    pub fn arrived(&self) -> usize {
        self.state.lock().arrived
    }

    pub fn is_aborted(&self) -> bool {
        self.state.lock().aborted
    }

    /// 等待累计完成量达到 `target`，至多 `limit`。
    pub fn wait_for(&self, target: usize, limit: Duration) -> LatchWait {
        let deadline = Instant::now().checked_add(limit);
        let mut state = self.state.lock();
        loop {
            if state.aborted {
                return LatchWait::Aborted;
            }
            if state.arrived >= target {
                return LatchWait::Reached;
            }
            match deadline {
                Some(deadline) => {
                    if self.ready.wait_until(&mut state, deadline).timed_out() {
                        return if state.aborted {
                            LatchWait::Aborted
                        } else if state.arrived >= target {
                            LatchWait::Reached
                        } else {
                            LatchWait::TimedOut
                        };
                    }
                }
                // 期限溢出 `Instant` 表示范围时视为无限等待。
                None => self.ready.wait(&mut state),
            }
        }
    }
}
