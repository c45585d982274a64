//! 回合制会话状态机
//!
//! 一条流连接上恰好两方，严格轮流收发：
//!
//! ```text
//! Connecting → Established → AwaitingLocalTurn ⇄ AwaitingRemoteTurn → Terminated
//! ```
//!
//! - 发起方（Initiator）先说，响应方（Responder）先听；
//! - 发出或收到结束标记、对端关闭、收发失败都会进入 `Terminated`；
//! - `Terminated` 是吸收态，进入时释放连接且只释放一次。

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::cancel::{guarded, CallOptions};
use crate::codec::Inbound;
use crate::connection::Connection;
use crate::error::{Phase, ProtocolError, Result};
use crate::message::Message;
use crate::transport::{Transport, TransportConfig, TransportListener};
use crate::MAX_MESSAGE_LEN;

/// 会话中的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// 主动连接，先发言
    Initiator,
    /// 监听并接受连接，后发言
    Responder,
}

impl Role {
    /// 连接建立后的第一个状态
    fn first_turn(self) -> SessionState {
        match self {
            Role::Initiator => SessionState::AwaitingLocalTurn,
            Role::Responder => SessionState::AwaitingRemoteTurn,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Initiator => f.write_str("initiator"),
            Role::Responder => f.write_str("responder"),
        }
    }
}

/// 会话结束的原因
///
/// 三种信号互斥：结束标记、对端有序关闭、传输失败。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// 本方发出了结束标记
    SentinelSent,
    /// 收到了对端的结束标记
    SentinelReceived,
    /// 对端关闭了连接（读到 0 字节）
    PeerDisconnected,
    /// 在某个阶段失败（传输错误、超时或取消）
    Failed(Phase),
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::SentinelSent => f.write_str("sentinel sent"),
            Termination::SentinelReceived => f.write_str("sentinel received"),
            Termination::PeerDisconnected => f.write_str("peer disconnected"),
            Termination::Failed(phase) => write!(f, "{phase} failed"),
        }
    }
}

/// 会话状态
///
/// `Session` 值在连接建立后才被构造，并立即进入第一个回合，
/// 因此 `Connecting` 与 `Established` 只出现在日志与报告中，
/// [`Session::state`] 不会返回这两个状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// 正在建立连接（发起方连接中、响应方等待接入）
    Connecting,
    /// 连接已建立，尚未分配回合
    Established,
    AwaitingLocalTurn,
    AwaitingRemoteTurn,
    Terminated(Termination),
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Connecting => f.write_str("connecting"),
            SessionState::Established => f.write_str("established"),
            SessionState::AwaitingLocalTurn => f.write_str("awaiting local turn"),
            SessionState::AwaitingRemoteTurn => f.write_str("awaiting remote turn"),
            SessionState::Terminated(how) => write!(f, "terminated ({how})"),
        }
    }
}

/// 本方一次发送的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// 普通消息已发出，轮到对方
    Sent(Message),
    /// 发出的是结束标记，会话结束
    Sentinel(Message),
}

/// 本方一次接收的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// 普通消息，轮到本方
    Message(Message),
    /// 对方的结束标记，会话结束
    Sentinel(Message),
    /// 对方关闭了连接，会话结束
    PeerDisconnected,
}

/// 会话选项
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// 单条消息上限
    pub max_message_len: usize,
    /// 每次收发的超时与取消
    pub call: CallOptions,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_message_len: MAX_MESSAGE_LEN,
            call: CallOptions::default(),
        }
    }
}

/// 驱动会话的本地一方
///
/// [`Session::run`] 在本方回合调用 `compose` 取得要发送的消息，
/// 在收到消息后调用 `on_received`。
pub trait TurnHandler: Send {
    /// 本方下一条消息
    ///
    /// `Ok(None)` 表示本地输入已结束，会话随之发送结束标记；
    /// 读取本地输入出错时返回错误，会话以失败结束。
    fn compose(&mut self) -> impl Future<Output = Result<Option<Message>>> + Send;

    /// 收到对方消息（包括结束标记）
    fn on_received(&mut self, msg: &Message);

    /// 本方消息已发出
    fn on_sent(&mut self, _msg: &Message) {}

    /// 会话正常结束
    fn on_ended(&mut self, _how: Termination) {}
}

/// 回合制会话
///
/// 独占一条连接；连接在会话结束时释放，会话不可复用。
pub struct Session<R, W> {
    role: Role,
    state: SessionState,
    conn: Option<Connection<R, W>>,
    call: CallOptions,
    sent: usize,
    received: usize,
}

impl<R, W> Session<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// 以发起方身份连接并建立会话
    pub async fn initiate<T>(
        addr: &str,
        config: &TransportConfig,
        options: SessionOptions,
    ) -> Result<Self>
    where
        T: Transport<Reader = R, Writer = W>,
    {
        debug!(
            "Session {} {} to {}",
            Role::Initiator,
            SessionState::Connecting,
            addr
        );
        let transport = T::connect(addr, config).await?;
        let conn = Connection::new(transport, options.max_message_len);
        Ok(Self::new(Role::Initiator, conn, options.call))
    }

    /// 以响应方身份接受一个连接并建立会话
    pub async fn respond<L, T>(listener: &L, options: SessionOptions) -> Result<(Self, SocketAddr)>
    where
        L: TransportListener<Transport = T>,
        T: Transport<Reader = R, Writer = W>,
    {
        debug!("Session {} {}", Role::Responder, SessionState::Connecting);
        let (transport, peer) = listener.accept(&options.call).await?;
        let conn = Connection::new(transport, options.max_message_len);
        Ok((Self::new(Role::Responder, conn, options.call), peer))
    }

    /// 在已建立的连接上创建会话
    pub fn new(role: Role, conn: Connection<R, W>, call: CallOptions) -> Self {
        debug!("Session {} {}", role, SessionState::Established);
        Self {
            role,
            state: role.first_turn(),
            conn: Some(conn),
            call,
            sent: 0,
            received: 0,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// 结束原因，会话未结束时为 `None`
    pub fn termination(&self) -> Option<Termination> {
        match self.state {
            SessionState::Terminated(how) => Some(how),
            _ => None,
        }
    }

    /// 连接是否已释放
    pub fn is_released(&self) -> bool {
        self.conn.is_none()
    }

    /// 已完成的 (发送, 接收) 次数
    pub fn turns(&self) -> (usize, usize) {
        (self.sent, self.received)
    }

    /// 在本方回合发送一条消息
    pub async fn send(&mut self, msg: Message) -> Result<Outbound> {
        self.expect_state(Phase::Send, SessionState::AwaitingLocalTurn)?;
        let conn = self.conn.as_mut().ok_or(ProtocolError::SessionTerminated)?;

        let result = guarded(Phase::Send, &self.call, conn.send(msg)).await;
        match result {
            Ok(sent) => {
                self.sent += 1;
                if sent.is_sentinel() {
                    self.terminate(Termination::SentinelSent).await;
                    Ok(Outbound::Sentinel(sent))
                } else {
                    self.state = SessionState::AwaitingRemoteTurn;
                    Ok(Outbound::Sent(sent))
                }
            }
            Err(e) => {
                warn!("Session send failed: {}", e);
                self.terminate(Termination::Failed(Phase::Send)).await;
                Err(e)
            }
        }
    }

    /// 在对方回合接收一条消息
    pub async fn recv(&mut self) -> Result<Received> {
        self.expect_state(Phase::Receive, SessionState::AwaitingRemoteTurn)?;
        let conn = self.conn.as_mut().ok_or(ProtocolError::SessionTerminated)?;

        let result = guarded(Phase::Receive, &self.call, conn.recv()).await;
        match result {
            Ok(Inbound::Message(msg)) => {
                self.received += 1;
                if msg.is_sentinel() {
                    self.terminate(Termination::SentinelReceived).await;
                    Ok(Received::Sentinel(msg))
                } else {
                    self.state = SessionState::AwaitingLocalTurn;
                    Ok(Received::Message(msg))
                }
            }
            Ok(Inbound::Closed) => {
                self.terminate(Termination::PeerDisconnected).await;
                Ok(Received::PeerDisconnected)
            }
            Err(e) => {
                warn!("Session receive failed: {}", e);
                self.terminate(Termination::Failed(Phase::Receive)).await;
                Err(e)
            }
        }
    }

    /// 运行整个会话直到结束
    ///
    /// 正常结束返回结束原因；传输失败、超时或取消返回错误，此时连接同样已释放。
    pub async fn run<H: TurnHandler>(mut self, handler: &mut H) -> Result<Termination> {
        loop {
            match self.state {
                // 构造后不会停留在这两个状态
                SessionState::Connecting | SessionState::Established => {
                    self.state = self.role.first_turn();
                }
                SessionState::AwaitingLocalTurn => {
                    // 等待本地输入不受超时约束，但可以被取消
                    let local = CallOptions::default().with_cancel(self.call.cancel.clone());
                    let composed = guarded(Phase::Input, &local, handler.compose()).await;
                    let msg = match composed {
                        Ok(Some(msg)) => msg,
                        Ok(None) => {
                            debug!("Local input exhausted, sending sentinel");
                            Message::sentinel()
                        }
                        Err(e) => {
                            warn!("Session input failed: {}", e);
                            self.terminate(Termination::Failed(Phase::Input)).await;
                            return Err(e);
                        }
                    };

                    match self.send(msg).await? {
                        Outbound::Sent(sent) => handler.on_sent(&sent),
                        Outbound::Sentinel(sent) => {
                            handler.on_sent(&sent);
                            handler.on_ended(Termination::SentinelSent);
                            return Ok(Termination::SentinelSent);
                        }
                    }
                }
                SessionState::AwaitingRemoteTurn => match self.recv().await? {
                    Received::Message(msg) => handler.on_received(&msg),
                    Received::Sentinel(msg) => {
                        handler.on_received(&msg);
                        handler.on_ended(Termination::SentinelReceived);
                        return Ok(Termination::SentinelReceived);
                    }
                    Received::PeerDisconnected => {
                        handler.on_ended(Termination::PeerDisconnected);
                        return Ok(Termination::PeerDisconnected);
                    }
                },
                SessionState::Terminated(Termination::Failed(_)) => {
                    return Err(ProtocolError::SessionTerminated);
                }
                SessionState::Terminated(how) => return Ok(how),
            }
        }
    }

    fn expect_state(&self, attempted: Phase, expected: SessionState) -> Result<()> {
        match self.state {
            SessionState::Terminated(_) => Err(ProtocolError::SessionTerminated),
            state if state == expected => Ok(()),
            state => Err(ProtocolError::OutOfTurn { attempted, state }),
        }
    }

    /// 进入终止态并释放连接（只会发生一次）
    async fn terminate(&mut self, how: Termination) {
        if matches!(self.state, SessionState::Terminated(_)) {
            return;
        }
        self.state = SessionState::Terminated(how);

        match how {
            Termination::Failed(phase) => warn!("Session ended: {} failed", phase),
            how => info!(
                "Session ended: {} (sent={}, received={})",
                how, self.sent, self.received
            ),
        }

        if let Some(mut conn) = self.conn.take() {
            if let Err(e) = conn.shutdown().await {
                debug!("Shutdown on release failed: {}", e);
            }
        }
    }
}
