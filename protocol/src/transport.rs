//! 传输层抽象
//!
//! 提供流式（[`Transport`] / [`TransportListener`]）与数据报
//! （[`DatagramTransport`]）两类传输接口，使上层协议与具体套接字实现解耦。
//! 协议逻辑中不出现任何平台相关的分支。

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpStream, UdpSocket};
use tracing::debug;

use crate::cancel::{guarded, CallOptions};
use crate::error::{Phase, ProtocolError, Result};

/// 传输层配置
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// 连接超时与取消
    pub call: CallOptions,
    /// 是否禁用 Nagle 算法（TCP nodelay）
    pub nodelay: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            call: CallOptions::default(),
            nodelay: true, // 一问一答的回合制对延迟敏感
        }
    }
}

/// 流式传输 trait
///
/// 定义了客户端连接和读写分离的基本操作。
pub trait Transport: Send + Sync + Sized {
    /// 读取端类型
    type Reader: AsyncRead + Unpin + Send;
    /// 写入端类型
    type Writer: AsyncWrite + Unpin + Send;

    /// 建立连接（客户端使用）
    ///
    /// # Arguments
    /// * `addr` - 服务器地址，格式为 "host:port"
    /// * `config` - 传输配置
    fn connect(
        addr: &str,
        config: &TransportConfig,
    ) -> impl std::future::Future<Output = Result<Self>> + Send;

    /// 分离读写端
    fn split(self) -> (Self::Reader, Self::Writer);
}

/// 流式监听器 trait（服务端使用）
pub trait TransportListener: Send + Sync + Sized {
    /// 对应的传输类型
    type Transport: Transport;

    /// 绑定地址并开始监听
    fn bind(addr: &str) -> impl std::future::Future<Output = Result<Self>> + Send;

    /// 接受新连接
    fn accept(
        &self,
        call: &CallOptions,
    ) -> impl std::future::Future<Output = Result<(Self::Transport, SocketAddr)>> + Send;
}

/// 数据报传输 trait
///
/// 每次 `send_to` / `recv_from` 恰好对应一个操作系统层面的数据报。
pub trait DatagramTransport: Send + Sync + Sized {
    /// 绑定本地地址
    fn bind(addr: &str) -> impl std::future::Future<Output = Result<Self>> + Send;

    /// 发送一个数据报，不保证送达
    fn send_to(
        &self,
        bytes: &[u8],
        target: SocketAddr,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// 接收一个数据报，超过 `max_len` 的部分被丢弃
    fn recv_from(
        &self,
        max_len: usize,
    ) -> impl std::future::Future<Output = Result<(Vec<u8>, SocketAddr)>> + Send;

    /// 本地绑定地址
    fn local_addr(&self) -> Result<SocketAddr>;
}

/// 解析 "host:port" 为第一个可用的套接字地址
pub async fn resolve(addr: &str) -> Result<SocketAddr> {
    lookup_host(addr)
        .await
        .map_err(ProtocolError::setup(Phase::Resolve))?
        .next()
        .ok_or_else(|| ProtocolError::Setup {
            phase: Phase::Resolve,
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("no address found for {addr}"),
            ),
        })
}

// ============================================================================
// TCP 实现
// ============================================================================

/// TCP 传输实现
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
}

impl Transport for TcpTransport {
    type Reader = OwnedReadHalf;
    type Writer = OwnedWriteHalf;

    async fn connect(addr: &str, config: &TransportConfig) -> Result<Self> {
        let stream = guarded(Phase::Connect, &config.call, async {
            TcpStream::connect(addr)
                .await
                .map_err(|source| ProtocolError::Connect {
                    addr: addr.to_string(),
                    source,
                })
        })
        .await?;

        stream
            .set_nodelay(config.nodelay)
            .map_err(ProtocolError::setup(Phase::Connect))?;

        debug!("Connected to {}", addr);
        Ok(Self { stream })
    }

    fn split(self) -> (Self::Reader, Self::Writer) {
        self.stream.into_split()
    }
}

impl TcpTransport {
    /// 从已有的 TcpStream 创建（服务端 accept 后使用）
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        stream
            .set_nodelay(true)
            .map_err(ProtocolError::setup(Phase::Accept))?;
        Ok(Self { stream })
    }

    /// 对端地址
    pub fn peer_addr(&self) -> std::io::Result<SocketAddr> {
        self.stream.peer_addr()
    }
}

/// TCP 监听器实现
pub struct TcpListener {
    listener: tokio::net::TcpListener,
}

impl TransportListener for TcpListener {
    type Transport = TcpTransport;

    async fn bind(addr: &str) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(ProtocolError::setup(Phase::Bind))?;
        Ok(Self { listener })
    }

    async fn accept(&self, call: &CallOptions) -> Result<(TcpTransport, SocketAddr)> {
        let (stream, peer) = guarded(Phase::Accept, call, async {
            self.listener
                .accept()
                .await
                .map_err(ProtocolError::setup(Phase::Accept))
        })
        .await?;
        Ok((TcpTransport::from_stream(stream)?, peer))
    }
}

impl TcpListener {
    /// 获取本地绑定地址
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

// ============================================================================
// UDP 实现
// ============================================================================

/// UDP 传输实现
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl DatagramTransport for UdpTransport {
    async fn bind(addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(ProtocolError::setup(Phase::Bind))?;
        Ok(Self { socket })
    }

    async fn send_to(&self, bytes: &[u8], target: SocketAddr) -> Result<()> {
        self.socket
            .send_to(bytes, target)
            .await
            .map_err(ProtocolError::transfer(Phase::Send))?;
        Ok(())
    }

    async fn recv_from(&self, max_len: usize) -> Result<(Vec<u8>, SocketAddr)> {
        let mut buf = vec![0u8; max_len];
        let (n, source) = self
            .socket
            .recv_from(&mut buf)
            .await
            .map_err(ProtocolError::transfer(Phase::Receive))?;
        buf.truncate(n);
        Ok((buf, source))
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .map_err(ProtocolError::setup(Phase::Bind))
    }
}

/// 客户端绑定地址：与目标同一地址族的临时端口
pub fn ephemeral_bind_addr(target: &SocketAddr) -> &'static str {
    if target.is_ipv4() {
        "0.0.0.0:0"
    } else {
        "[::]:0"
    }
}
