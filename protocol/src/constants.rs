//! 协议常量定义

/// 默认端口（TCP 与 UDP 共用）
pub const DEFAULT_PORT: u16 = 8080;

/// 默认主机（回环地址）
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// 接收缓冲区大小
pub const BUFFER_SIZE: usize = 1024;

/// 单条消息最大长度
///
/// 缓冲区保留 1 字节作为结束符位置，因此有效载荷为 `BUFFER_SIZE - 1`。
pub const MAX_MESSAGE_LEN: usize = BUFFER_SIZE - 1;

/// 会话结束标记
///
/// 只比较前 4 个字节，见 [`crate::Message::is_sentinel`]。
pub const SENTINEL: &[u8; 4] = b"exit";

/// UDP 客户端默认请求内容
pub const DEFAULT_REQUEST: &str = "Hello from UDP Client!";

/// UDP 服务端默认回复内容
pub const DEFAULT_REPLY: &str = "Message received by server";

/// 由缓冲区大小推导单条消息的最大长度
///
/// 缓冲区至少需要 2 字节（1 字节载荷 + 1 字节结束符）。
pub const fn max_message_len(buffer_size: usize) -> usize {
    if buffer_size < 2 {
        1
    } else {
        buffer_size - 1
    }
}

/// 校验命令行给出的缓冲区大小（至少 2 字节）
///
/// 供 clap 的 `value_parser` 使用。
pub fn parse_buffer_size(raw: &str) -> Result<usize, String> {
    let size: usize = raw.parse().map_err(|e| format!("{e}"))?;
    if size < 2 {
        return Err("buffer size must be at least 2 bytes".to_string());
    }
    Ok(size)
}
