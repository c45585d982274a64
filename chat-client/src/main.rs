//! 聊天客户端
//!
//! 回合制会话的发起方：连接服务器，先说后听，直到任一方发送 "exit"。

mod client;

use anyhow::Result;
use clap::Parser;
use client::ChatClient;
use protocol::{CancelToken, EndpointArgs};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Turn-based TCP chat client: connects to the server and speaks first.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    endpoint: EndpointArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志（输出到 stderr，不打断聊天内容）
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("chat_client=debug".parse()?)
                .add_directive("protocol=debug".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Ctrl+C 取消当前阻塞的操作
    let (cancel, token) = CancelToken::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, cancelling");
            cancel.cancel();
        }
    });

    ChatClient::new(&cli.endpoint, token).run().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();

        let cli = Cli::parse_from(["chat-client", "--port", "9000", "--buffer-size", "64"]);
        assert_eq!(cli.endpoint.addr(), "127.0.0.1:9000");
        assert_eq!(cli.endpoint.max_message_len(), 63);
        assert!(Cli::try_parse_from(["chat-client", "--buffer-size", "1"]).is_err());
    }
}
