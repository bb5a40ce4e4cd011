use std::fmt;
use std::sync::Arc;
//
// 教案级说明：为了让 Loom 在模型检查阶段能够捕获原子操作的所有调度交错，
// 当启用 `--cfg loom` 且打开 `loom-model` 时切换到它提供的原子类型；`Arc` 保持标准实现。
#[cfg(not(all(loom, feature = "loom-model")))]
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(all(loom, feature = "loom-model"))]
use loom::sync::atomic::{AtomicBool, Ordering};

/// 终止令牌：驱动线程单写一次，轮询线程反复读取。
///
/// # 设计背景（Why）
/// - 轮询线程必须在一个推进超时周期内观察到关闭请求，普通变量既有数据竞争也没有可见性保证；
/// - 令牌在派生轮询线程时显式传入，而不是进程级全局变量，因此同一进程里可以并存多个互不干扰的角色实例。
///
/// # 逻辑解析（How）
/// - 内部为 [`AtomicBool`]，`raise` 以 `AcqRel` 的比较交换从 `false` 置为 `true`，`is_raised` 以 `Acquire` 读取；
/// - 在 `raise` 之前发生的写入（例如某个完成事件变为就绪）对观察到令牌的线程可见，
///   这是轮询线程“收尾排空不丢完成”的依据。
///
/// # 契约说明（What）
/// - **后置条件**：一旦 `raise` 成功，令牌在进程生命周期内不会复位；
/// - `raise` 首次成功返回 `true`，重复调用返回 `false`。
#[derive(Clone)]
pub struct ShutdownSignal {
    raised: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// 创建处于“未触发”状态的令牌。
    pub fn new() -> Self {
        Self {
            raised: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 触发关闭。
    pub fn raise(&self) -> bool {
        self.raised
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 是否已触发。
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownSignal")
            .field("raised", &self.is_raised())
            .finish()
    }
}
