//! 数据报请求-应答
//!
//! - [`Requester`]：发送一次（不重试），等待一次回复；
//! - [`Replier`]：接收一次，向来源地址回复一次，然后结束。
//!
//! 两者在使用时都会被消耗，因此同一个值上不可能发生第二次交换。

use std::net::SocketAddr;

use tracing::{debug, info, warn};

use crate::cancel::{guarded, CallOptions};
use crate::error::{Phase, ProtocolError, Result};
use crate::message::Message;
use crate::transport::DatagramTransport;
use crate::MAX_MESSAGE_LEN;

/// 交换选项
#[derive(Debug, Clone)]
pub struct ExchangeOptions {
    /// 单个数据报的载荷上限，超出部分被截断
    pub max_message_len: usize,
    /// 接收与发送的超时与取消
    pub call: CallOptions,
    /// 是否要求回复来自请求目标
    ///
    /// 默认关闭：接受任何来源的第一个数据报作为回复。
    pub verify_source: bool,
}

impl Default for ExchangeOptions {
    fn default() -> Self {
        Self {
            max_message_len: MAX_MESSAGE_LEN,
            call: CallOptions::default(),
            verify_source: false,
        }
    }
}

/// 请求方收到的回复
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub message: Message,
    pub source: SocketAddr,
}

/// 应答方完成的一次交换
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub request: Message,
    pub source: SocketAddr,
    pub reply: Message,
}

/// 请求方
pub struct Requester<T> {
    transport: T,
    target: SocketAddr,
    options: ExchangeOptions,
}

impl<T: DatagramTransport> Requester<T> {
    pub fn new(transport: T, target: SocketAddr, options: ExchangeOptions) -> Self {
        Self {
            transport,
            target,
            options,
        }
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// 发送请求（不保证送达，不重试）
    ///
    /// 返回等待回复的句柄；不关心回复时直接丢弃即可。
    pub async fn send(self, payload: Message) -> Result<PendingReply<T>> {
        let payload = Message::bounded(payload.into_bytes(), self.options.max_message_len);
        guarded(
            Phase::Send,
            &self.options.call,
            self.transport.send_to(payload.as_bytes(), self.target),
        )
        .await?;
        debug!("Sent {} bytes to {}", payload.len(), self.target);

        Ok(PendingReply { requester: self })
    }

    /// 发送请求并等待唯一的一次回复
    pub async fn request(self, payload: Message) -> Result<Reply> {
        self.send(payload).await?.wait().await
    }
}

/// 已发出请求、尚未收到回复
pub struct PendingReply<T> {
    requester: Requester<T>,
}

impl<T: DatagramTransport> PendingReply<T> {
    /// 等待一次回复
    pub async fn wait(self) -> Result<Reply> {
        let Requester {
            transport,
            target,
            options,
        } = self.requester;

        let (bytes, source) = guarded(
            Phase::Receive,
            &options.call,
            transport.recv_from(options.max_message_len),
        )
        .await?;

        if source != target {
            if options.verify_source {
                warn!("Rejected reply from {} (expected {})", source, target);
                return Err(ProtocolError::UnexpectedSource {
                    expected: target,
                    actual: source,
                });
            }
            debug!("Accepted reply from {} (request went to {})", source, target);
        }

        Ok(Reply {
            message: Message::bounded(bytes, options.max_message_len),
            source,
        })
    }
}

/// 应答方
pub struct Replier<T> {
    transport: T,
    options: ExchangeOptions,
}

impl<T: DatagramTransport> Replier<T> {
    pub fn new(transport: T, options: ExchangeOptions) -> Self {
        Self { transport, options }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// 接收一个请求，并用 `respond` 生成的内容回复一次
    pub async fn serve_once<F>(self, respond: F) -> Result<Exchange>
    where
        F: FnOnce(&Message, SocketAddr) -> Message,
    {
        let (bytes, source) = guarded(
            Phase::Receive,
            &self.options.call,
            self.transport.recv_from(self.options.max_message_len),
        )
        .await?;
        let request = Message::bounded(bytes, self.options.max_message_len);
        info!("Received {} bytes from {}", request.len(), source);

        let reply = Message::bounded(
            respond(&request, source).into_bytes(),
            self.options.max_message_len,
        );
        guarded(
            Phase::Send,
            &self.options.call,
            self.transport.send_to(reply.as_bytes(), source),
        )
        .await?;
        debug!("Replied {} bytes to {}", reply.len(), source);

        Ok(Exchange {
            request,
            source,
            reply,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::cancel::CancelToken;
    use crate::transport::UdpTransport;
    use crate::{DEFAULT_REPLY, DEFAULT_REQUEST};

    async fn replier() -> (Replier<UdpTransport>, SocketAddr) {
        let transport = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = transport.local_addr().unwrap();
        (Replier::new(transport, ExchangeOptions::default()), addr)
    }

    async fn requester(target: SocketAddr, options: ExchangeOptions) -> Requester<UdpTransport> {
        let transport = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        Requester::new(transport, target, options)
    }

    #[tokio::test]
    async fn test_request_reply() {
        let (replier, addr) = replier().await;
        let server = tokio::spawn(async move {
            replier
                .serve_once(|_, _| Message::from(DEFAULT_REPLY))
                .await
                .unwrap()
        });

        let requester = requester(addr, ExchangeOptions::default()).await;
        let reply = requester
            .request(Message::from(DEFAULT_REQUEST))
            .await
            .unwrap();
        assert_eq!(reply.message.as_bytes(), DEFAULT_REPLY.as_bytes());
        assert_eq!(reply.source, addr);

        let exchange = server.await.unwrap();
        assert_eq!(exchange.request.as_bytes(), DEFAULT_REQUEST.as_bytes());
        assert_eq!(exchange.reply.as_bytes(), DEFAULT_REPLY.as_bytes());
    }

    #[tokio::test]
    async fn test_oversized_request_is_truncated() {
        let transport = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = transport.local_addr().unwrap();
        let options = ExchangeOptions {
            max_message_len: 8,
            ..ExchangeOptions::default()
        };
        let replier = Replier::new(transport, options);
        let server = tokio::spawn(async move {
            replier
                .serve_once(|req, _| Message::from(format!("got {}", req.len())))
                .await
                .unwrap()
        });

        // 请求方不截断，直接发出 64 字节
        let sender = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(&[b'q'; 64], addr).await.unwrap();
        let (reply, _) = sender.recv_from(64).await.unwrap();
        assert_eq!(reply, b"got 8");

        let exchange = server.await.unwrap();
        assert_eq!(exchange.request.as_bytes(), &[b'q'; 8]);
    }

    #[tokio::test]
    async fn test_reply_from_other_source_accepted_by_default() {
        let requester_transport = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let requester_addr = requester_transport.local_addr().unwrap();
        let target = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let stranger = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let stranger_addr = stranger.local_addr().unwrap();

        let requester = Requester::new(
            requester_transport,
            target.local_addr().unwrap(),
            ExchangeOptions::default(),
        );
        let pending = requester.send(Message::from("ping")).await.unwrap();

        stranger
            .send_to(b"not from target", requester_addr)
            .await
            .unwrap();
        let reply = pending.wait().await.unwrap();
        assert_eq!(reply.source, stranger_addr);
        assert_eq!(reply.message.as_bytes(), b"not from target");
    }

    #[tokio::test]
    async fn test_verify_source_rejects_stranger() {
        let requester_transport = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let requester_addr = requester_transport.local_addr().unwrap();
        let target = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let stranger = UdpTransport::bind("127.0.0.1:0").await.unwrap();

        let options = ExchangeOptions {
            verify_source: true,
            ..ExchangeOptions::default()
        };
        let requester = Requester::new(requester_transport, target.local_addr().unwrap(), options);
        let pending = requester.send(Message::from("ping")).await.unwrap();

        stranger.send_to(b"spoof", requester_addr).await.unwrap();
        let err = pending.wait().await.unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedSource { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_reply_times_out() {
        let silent = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let options = ExchangeOptions {
            call: CallOptions::default().with_timeout(Some(Duration::from_secs(2))),
            ..ExchangeOptions::default()
        };
        let requester = requester(silent.local_addr().unwrap(), options).await;

        let err = requester.request(Message::from("hello?")).await.unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Timeout {
                phase: Phase::Receive,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_replier_cancelled() {
        let (handle, token) = CancelToken::new();
        let transport = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let options = ExchangeOptions {
            call: CallOptions::default().with_cancel(token),
            ..ExchangeOptions::default()
        };
        let replier = Replier::new(transport, options);

        let server =
            tokio::spawn(async move { replier.serve_once(|_, _| Message::from("never")).await });
        tokio::task::yield_now().await;
        handle.cancel();

        let err = server.await.unwrap().unwrap_err();
        assert!(matches!(err, ProtocolError::Cancelled { .. }));
    }
}
