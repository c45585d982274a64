//! 连接封装
//!
//! 将读写两端与消息上限封装在一起，提供按消息收发的接口。

use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::{Inbound, RawReader, RawWriter};
use crate::error::Result;
use crate::message::Message;
use crate::transport::Transport;

/// 连接封装
///
/// # Type Parameters
/// * `R` - 读取端类型
/// * `W` - 写入端类型
pub struct Connection<R, W> {
    reader: RawReader<R>,
    writer: RawWriter<W>,
    max_len: usize,
}

impl<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> Connection<R, W> {
    /// 从传输层创建连接
    pub fn new<T: Transport<Reader = R, Writer = W>>(transport: T, max_len: usize) -> Self {
        let (reader, writer) = transport.split();
        Self::from_parts(reader, writer, max_len)
    }

    /// 从读写端直接创建连接
    pub fn from_parts(reader: R, writer: W, max_len: usize) -> Self {
        Self {
            reader: RawReader::with_max_len(reader, max_len),
            writer: RawWriter::new(writer),
            max_len: max_len.max(1),
        }
    }

    /// 单条消息上限
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// 接收消息
    pub async fn recv(&mut self) -> Result<Inbound> {
        self.reader.read_message().await
    }

    /// 发送消息，超出上限的部分被截断
    ///
    /// 返回实际写出的消息。
    pub async fn send(&mut self, msg: Message) -> Result<Message> {
        let msg = if msg.len() > self.max_len {
            Message::bounded(msg.into_bytes(), self.max_len)
        } else {
            msg
        };
        self.writer.write_message(&msg).await?;
        Ok(msg)
    }

    /// 关闭写方向
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await
    }
}
