//! 套接字通信模式共享库
//!
//! 包含:
//! - 消息与结束标记 (Message)
//! - 传输层抽象 (Transport / TransportListener / DatagramTransport)
//! - 原始字节编解码 (RawReader, RawWriter)
//! - 连接封装 (Connection)
//! - 回合制会话状态机 (Session)
//! - 数据报请求-应答 (Requester, Replier)
//! - 取消与超时 (CancelToken, CallOptions)
//! - 终端回合驱动 (Console, InputLines)
//! - 共用命令行参数 (EndpointArgs)

mod cancel;
mod cli;
mod codec;
mod connection;
mod console;
mod constants;
mod datagram;
mod error;
mod message;
mod session;
mod transport;

pub use cancel::{guarded, CallOptions, CancelHandle, CancelToken};
pub use cli::EndpointArgs;
pub use codec::{Inbound, RawReader, RawWriter};
pub use connection::Connection;
pub use console::{Console, InputLines};
pub use constants::*;
pub use datagram::{Exchange, ExchangeOptions, PendingReply, Replier, Reply, Requester};
pub use error::{Phase, ProtocolError, Result};
pub use message::Message;
pub use session::{
    Outbound, Received, Role, Session, SessionOptions, SessionState, Termination, TurnHandler,
};
pub use transport::{
    ephemeral_bind_addr, resolve, DatagramTransport, TcpListener, TcpTransport, Transport,
    TransportConfig, TransportListener, UdpTransport,
};
