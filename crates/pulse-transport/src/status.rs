//! 推进与触发的状态码。

/// `progress`/`try_trigger` 的非错误返回。
///
/// # 契约说明（What）
/// - `Progressed`：推进期间出现了网络活动，或触发期间至少交付了一个完成事件；
/// - `TimedOut`：在给定时限内没有任何活动；对 `try_trigger` 而言表示“当前没有就绪完成”。
///
/// 对轮询循环而言两者等价：都意味着立即进入下一轮排空。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PollStatus {
    Progressed,
    TimedOut,
}

impl PollStatus {
    /// 是否为超时。
    pub fn is_timeout(self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

/// 一次 `try_trigger` 的结果。
///
/// # 契约说明（What）
/// - `completed`：本次调用实际执行的回调数量，不超过调用方给出的 `max_count`；
/// - `status`：`completed == 0` 时必须为 [`PollStatus::TimedOut`]，否则为 [`PollStatus::Progressed`]。
///   通过 [`TriggerReport::idle`] 与 [`TriggerReport::delivered`] 构造可以保证这一点。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TriggerReport {
    pub completed: u32,
    pub status: PollStatus,
}

impl TriggerReport {
    /// 没有任何就绪完成。
    pub const fn idle() -> Self {
        Self {
            completed: 0,
            status: PollStatus::TimedOut,
        }
    }

    /// 交付了 `completed` 个完成事件；`0` 退化为 [`TriggerReport::idle`]。
    pub const fn delivered(completed: u32) -> Self {
        if completed == 0 {
            Self::idle()
        } else {
            Self {
                completed,
                status: PollStatus::Progressed,
            }
        }
    }

    /// 是否没有交付任何完成。
    pub fn is_idle(&self) -> bool {
        self.completed == 0
    }
}
