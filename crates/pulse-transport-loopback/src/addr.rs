use std::fmt;
use std::sync::Arc;

use pulse_transport::ContextId;

/// 回环上下文的地址：端点名 + 上下文编号。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LoopbackAddr {
    endpoint: Arc<str>,
    context: ContextId,
}

impl LoopbackAddr {
    pub fn new(endpoint: impl Into<Arc<str>>, context: ContextId) -> Self {
        Self {
            endpoint: endpoint.into(),
            context,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn context(&self) -> ContextId {
        self.context
    }
}

impl fmt::Display for LoopbackAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}#{}", crate::PROTOCOL, self.endpoint, self.context)
    }
}
