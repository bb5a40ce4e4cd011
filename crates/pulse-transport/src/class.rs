use std::borrow::Cow;
use std::fmt;

/// 端点类别：描述传输协议、本地地址以及是否接受入站调用。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 同一个传输实现可以承载多个上下文，类别负责说明“这些上下文挂在哪个协议/地址上”；
/// - 创建上下文时由实现方校验类别，非法类别属于致命的启动错误。
///
/// ## 契约（What）
/// - `protocol`：实现方识别的协议名，例如回环传输的 `"loopback"`；
/// - `address`：本地端点名，不得为空；
/// - `listening`：是否接受入站调用。发起方可以关闭它，响应方必须打开。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EndpointClass {
    protocol: Cow<'static, str>,
    address: Cow<'static, str>,
    listening: bool,
}

impl EndpointClass {
    /// 构造端点类别。
    pub fn new(
        protocol: impl Into<Cow<'static, str>>,
        address: impl Into<Cow<'static, str>>,
        listening: bool,
    ) -> Self {
        Self {
            protocol: protocol.into(),
            address: address.into(),
            listening,
        }
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }
}

impl fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol, self.address)?;
        if self.listening {
            f.write_str(" (listening)")?;
        }
        Ok(())
    }
}

/// 同一端点类别下区分多个上下文的编号。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u8);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
