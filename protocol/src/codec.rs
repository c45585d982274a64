//! 原始字节编解码
//!
//! 线上没有长度前缀或版本头：
//! ```text
//! ┌──────────────────────────────────────────┐
//! │         Payload (最多 max_len 字节)       │
//! └──────────────────────────────────────────┘
//! ```
//! 读取端一次读取最多 `max_len` 字节，读到多少就算一条消息；
//! 读到 0 字节表示对端已关闭连接，而不是一条空消息。
//! 一次读取填满缓冲区时，已经到达的剩余字节被丢弃，不会成为下一条消息。

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::debug;

use crate::error::{Phase, ProtocolError, Result};
use crate::message::Message;
use crate::MAX_MESSAGE_LEN;

/// 丢弃超长消息剩余部分时每次读取的块大小
const DISCARD_CHUNK: usize = 4096;

/// 一次读取的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// 收到一条消息
    Message(Message),
    /// 对端有序关闭（读到 0 字节）
    Closed,
}

/// 原始消息读取器
pub struct RawReader<R> {
    reader: R,
    buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin> RawReader<R> {
    /// 使用默认上限创建读取器
    pub fn new(reader: R) -> Self {
        Self::with_max_len(reader, MAX_MESSAGE_LEN)
    }

    /// 使用指定单条消息上限创建读取器
    pub fn with_max_len(reader: R, max_len: usize) -> Self {
        Self {
            reader,
            buffer: vec![0u8; max_len.max(1)],
        }
    }

    /// 单条消息上限
    pub fn max_len(&self) -> usize {
        self.buffer.len()
    }

    /// 读取一条消息
    pub async fn read_message(&mut self) -> Result<Inbound> {
        let n = self
            .reader
            .read(&mut self.buffer)
            .await
            .map_err(ProtocolError::transfer(Phase::Receive))?;

        if n == 0 {
            return Ok(Inbound::Closed);
        }

        let msg = Message::bounded(&self.buffer[..n], self.buffer.len());
        if n == self.buffer.len() {
            let dropped = self.discard_pending().await;
            if dropped > 0 {
                debug!(
                    "Message exceeded {} bytes, discarded {} trailing bytes",
                    n, dropped
                );
            }
        }
        Ok(Inbound::Message(msg))
    }

    /// 丢弃当前已可读的字节，不等待新数据到达
    ///
    /// 读到 0 字节或出错时停止，留给下一次 `read_message` 报告。
    async fn discard_pending(&mut self) -> usize {
        let mut scratch = vec![0u8; DISCARD_CHUNK];
        let mut dropped = 0;
        loop {
            // 零时长超时：内部读取先被轮询一次，未就绪即返回 Elapsed
            match timeout(Duration::ZERO, self.reader.read(&mut scratch)).await {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(n)) => dropped += n,
                Ok(Err(e)) => {
                    debug!("Stopped discarding surplus bytes: {}", e);
                    break;
                }
            }
        }
        dropped
    }
}

/// 原始消息写入器
pub struct RawWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> RawWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// 原样写出一条消息
    pub async fn write_message(&mut self, msg: &Message) -> Result<()> {
        self.writer
            .write_all(msg.as_bytes())
            .await
            .map_err(ProtocolError::transfer(Phase::Send))?;
        self.writer
            .flush()
            .await
            .map_err(ProtocolError::transfer(Phase::Send))?;
        Ok(())
    }

    /// 关闭写方向，对端随后读到 0 字节
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer
            .shutdown()
            .await
            .map_err(ProtocolError::transfer(Phase::Send))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_read_whatever_arrives() {
        let mut reader = RawReader::new(Cursor::new(b"hello".to_vec()));
        let inbound = reader.read_message().await.unwrap();
        assert_eq!(inbound, Inbound::Message(Message::from("hello")));
    }

    #[tokio::test]
    async fn test_zero_length_read_is_closed() {
        let mut reader = RawReader::new(Cursor::new(Vec::new()));
        assert_eq!(reader.read_message().await.unwrap(), Inbound::Closed);
    }

    #[tokio::test]
    async fn test_read_caps_at_max_len() {
        let mut reader = RawReader::new(Cursor::new(vec![b'z'; 2000]));
        match reader.read_message().await.unwrap() {
            Inbound::Message(msg) => assert_eq!(msg.len(), MAX_MESSAGE_LEN),
            Inbound::Closed => panic!("expected a message"),
        }
    }

    #[tokio::test]
    async fn test_surplus_of_long_message_is_discarded() {
        let (mut peer, local) = tokio::io::duplex(8192);
        let mut reader = RawReader::new(local);

        peer.write_all(&[b'#'; 2000]).await.unwrap();
        match reader.read_message().await.unwrap() {
            Inbound::Message(msg) => assert_eq!(msg.len(), MAX_MESSAGE_LEN),
            Inbound::Closed => panic!("expected a message"),
        }

        peer.write_all(b"next").await.unwrap();
        assert_eq!(
            reader.read_message().await.unwrap(),
            Inbound::Message(Message::from("next"))
        );
    }

    #[tokio::test]
    async fn test_exact_fit_waits_for_next_message() {
        let (mut peer, local) = tokio::io::duplex(64);
        let mut reader = RawReader::with_max_len(local, 4);

        peer.write_all(b"abcd").await.unwrap();
        assert_eq!(
            reader.read_message().await.unwrap(),
            Inbound::Message(Message::from("abcd"))
        );

        peer.write_all(b"ef").await.unwrap();
        drop(peer);
        assert_eq!(
            reader.read_message().await.unwrap(),
            Inbound::Message(Message::from("ef"))
        );
        assert_eq!(reader.read_message().await.unwrap(), Inbound::Closed);
    }

    #[tokio::test]
    async fn test_writer_and_reader_over_duplex() {
        let (client, server) = tokio::io::duplex(4096);
        let mut writer = RawWriter::new(client);
        let mut reader = RawReader::with_max_len(server, 32);

        writer.write_message(&Message::from("ping")).await.unwrap();
        assert_eq!(
            reader.read_message().await.unwrap(),
            Inbound::Message(Message::from("ping"))
        );

        writer.shutdown().await.unwrap();
        assert_eq!(reader.read_message().await.unwrap(), Inbound::Closed);
    }
}
