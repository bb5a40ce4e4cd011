//! 已绑定上下文的注册表。
//!
//! # 教案式注释
//! - **意图 (Why)**：发起方按地址投递请求、响应方按回信地址投递应答，双方都需要一个并发安全的地址簿；
//! - **契约 (What)**：同一地址至多绑定一个上下文；解绑后投递到该地址的事件被丢弃，调用方最终观察到超时；
//! - **风险 (Trade-offs)**：`DashMap` guard 持有期间会阻塞同分片写操作，查询只克隆出 `Arc` 后立即释放。

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use pulse_transport::{TransportError, TransportErrorKind};

use crate::LoopbackAddr;
use crate::node::Mailbox;

/// 进程内传输织网，可廉价克隆并在多个 [`crate::LoopbackTransport`] 之间共享。
#[derive(Clone, Debug, Default)]
pub struct LoopbackFabric {
    nodes: Arc<DashMap<LoopbackAddr, Arc<Mailbox>>>,
}

impl LoopbackFabric {
    pub fn new() -> Self {
        Self::default()
    }

    /// 地址当前是否已被绑定。
    pub fn is_bound(&self, addr: &LoopbackAddr) -> bool {
        self.nodes.contains_key(addr)
    }

    /// 已绑定上下文的数量。
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 等待地址被绑定，至多 `limit`；返回等待结束时是否已绑定。
    ///
    /// 织网不提供绑定通知，这里以毫秒粒度轮询，只适合启动阶段的一次性等待。
    pub fn wait_bound(&self, addr: &LoopbackAddr, limit: Duration) -> bool {
        let deadline = Instant::now().checked_add(limit);
        loop {
            if self.is_bound(addr) {
                return true;
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    pub(crate) fn bind(
        &self,
        addr: LoopbackAddr,
        mailbox: Arc<Mailbox>,
    ) -> Result<(), TransportError> {
        match self.nodes.entry(addr) {
            Entry::Occupied(occupied) => Err(TransportError::new(
                TransportErrorKind::AddressInUse,
                format!("{} is already bound", occupied.key()),
            )),
            Entry::Vacant(vacant) => {
                vacant.insert(mailbox);
                Ok(())
            }
        }
    }

    pub(crate) fn unbind(&self, addr: &LoopbackAddr) {
        self.nodes.remove(addr);
    }

    pub(crate) fn lookup(&self, addr: &LoopbackAddr) -> Option<Arc<Mailbox>> {
        self.nodes.get(addr).map(|entry| Arc::clone(entry.value()))
    }
}
