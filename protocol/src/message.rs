//! 消息类型定义
//!
//! 线上没有任何帧格式：一条消息就是一次收发的原始字节。

use std::borrow::Cow;
use std::fmt;

use crate::{MAX_MESSAGE_LEN, SENTINEL};

/// 有长度上限的消息
///
/// 超过上限的部分在构造时直接截断，不会排队等待下一次发送。
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    bytes: Vec<u8>,
}

impl Message {
    /// 使用默认上限 [`MAX_MESSAGE_LEN`] 构造消息
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self::bounded(bytes, MAX_MESSAGE_LEN)
    }

    /// 使用指定上限构造消息，多余字节被丢弃
    pub fn bounded(bytes: impl Into<Vec<u8>>, max_len: usize) -> Self {
        let mut bytes = bytes.into();
        bytes.truncate(max_len);
        Self { bytes }
    }

    /// 结束标记消息
    pub fn sentinel() -> Self {
        Self {
            bytes: SENTINEL.to_vec(),
        }
    }

    /// 是否为结束标记
    ///
    /// 只比较前 4 个字节，所以 `"exited"` 或 `"exit now"` 同样会结束会话。
    pub fn is_sentinel(&self) -> bool {
        self.bytes.starts_with(SENTINEL)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// 以文本形式查看（非法 UTF-8 替换为 U+FFFD）
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::new(text.as_bytes())
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::new(text.into_bytes())
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Message").field(&self.text()).finish()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}
