//! 错误类型定义

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// 发生错误时所处的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// 地址解析
    Resolve,
    /// 绑定 / 监听
    Bind,
    /// 建立流连接
    Connect,
    /// 接受流连接
    Accept,
    /// 发送
    Send,
    /// 接收
    Receive,
    /// 读取本地输入
    Input,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Resolve => "resolve",
            Phase::Bind => "bind",
            Phase::Connect => "connect",
            Phase::Accept => "accept",
            Phase::Send => "send",
            Phase::Receive => "receive",
            Phase::Input => "local input",
        };
        f.write_str(name)
    }
}

/// 协议错误类型
///
/// 正常结束（结束标记、对端关闭）不属于错误，见 [`crate::Termination`]。
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// 套接字创建、绑定、监听或地址解析失败
    #[error("Setup failed during {phase}: {source}")]
    Setup {
        phase: Phase,
        #[source]
        source: std::io::Error,
    },

    /// 流连接失败
    #[error("Connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// 传输层收发失败
    #[error("Transfer failed during {phase}: {source}")]
    Transfer {
        phase: Phase,
        #[source]
        source: std::io::Error,
    },

    /// 读取本地输入失败
    #[error("Failed to read local input: {source}")]
    Input {
        #[source]
        source: std::io::Error,
    },

    /// 操作超时
    #[error("{phase} timed out after {after:?}")]
    Timeout { phase: Phase, after: Duration },

    /// 操作被取消
    #[error("{phase} cancelled")]
    Cancelled { phase: Phase },

    /// 不在本方回合时尝试收发
    #[error("Out of turn: cannot {attempted} while {state}")]
    OutOfTurn {
        attempted: Phase,
        state: crate::SessionState,
    },

    /// 会话已结束
    #[error("Session already terminated")]
    SessionTerminated,

    /// 回复来源与请求目标不符（仅在开启来源校验时出现）
    #[error("Reply from unexpected source {actual} (expected {expected})")]
    UnexpectedSource {
        expected: SocketAddr,
        actual: SocketAddr,
    },
}

impl ProtocolError {
    /// 错误发生的阶段
    pub fn phase(&self) -> Option<Phase> {
        match self {
            ProtocolError::Setup { phase, .. }
            | ProtocolError::Transfer { phase, .. }
            | ProtocolError::Timeout { phase, .. }
            | ProtocolError::Cancelled { phase } => Some(*phase),
            ProtocolError::Connect { .. } => Some(Phase::Connect),
            ProtocolError::Input { .. } => Some(Phase::Input),
            ProtocolError::OutOfTurn { attempted, .. } => Some(*attempted),
            ProtocolError::UnexpectedSource { .. } => Some(Phase::Receive),
            ProtocolError::SessionTerminated => None,
        }
    }

    pub(crate) fn setup(phase: Phase) -> impl FnOnce(std::io::Error) -> Self {
        move |source| ProtocolError::Setup { phase, source }
    }

    pub(crate) fn transfer(phase: Phase) -> impl FnOnce(std::io::Error) -> Self {
        move |source| ProtocolError::Transfer { phase, source }
    }
}

/// 协议操作结果类型
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_reports_phase() {
        let err = ProtocolError::transfer(Phase::Receive)(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert_eq!(err.phase(), Some(Phase::Receive));
        assert!(err.to_string().contains("receive"));

        let err = ProtocolError::Connect {
            addr: "127.0.0.1:8080".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        };
        assert_eq!(err.phase(), Some(Phase::Connect));
        assert!(err.to_string().contains("127.0.0.1:8080"));

        let err = ProtocolError::Input {
            source: std::io::Error::from(std::io::ErrorKind::BrokenPipe),
        };
        assert_eq!(err.phase(), Some(Phase::Input));
    }

    #[test]
    fn test_timeout_message() {
        let err = ProtocolError::Timeout {
            phase: Phase::Accept,
            after: Duration::from_secs(3),
        };
        assert_eq!(err.to_string(), "accept timed out after 3s");
    }
}
