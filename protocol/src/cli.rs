//! 四个可执行程序共用的命令行参数

use std::time::Duration;

use clap::Args;

use crate::{max_message_len, parse_buffer_size, BUFFER_SIZE, DEFAULT_HOST, DEFAULT_PORT};

/// 端点参数：地址、超时与缓冲区大小
#[derive(Args, Debug, Clone)]
pub struct EndpointArgs {
    /// Host to bind (servers) or to reach (clients).
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to bind or reach. Servers accept 0 for an ephemeral port.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Seconds to wait at each accept, connect, send and receive. Waits forever when omitted.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Receive buffer size; one byte is reserved, so messages carry at most BYTES - 1.
    #[arg(long, value_name = "BYTES", default_value_t = BUFFER_SIZE, value_parser = parse_buffer_size)]
    pub buffer_size: usize,
}

impl EndpointArgs {
    /// `host:port` 形式的地址
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    pub fn max_message_len(&self) -> usize {
        max_message_len(self.buffer_size)
    }
}

impl Default for EndpointArgs {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeout: None,
            buffer_size: BUFFER_SIZE,
        }
    }
}
