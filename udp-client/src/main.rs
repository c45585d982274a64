//! UDP 客户端
//!
//! 数据报请求-应答的请求方：发送一次，等待一次回复，不重试。

use anyhow::{Context, Result};
use clap::Parser;
use protocol::{
    ephemeral_bind_addr, resolve, CallOptions, CancelToken, DatagramTransport, EndpointArgs,
    ExchangeOptions, Message, Reply, Requester, UdpTransport, DEFAULT_REQUEST,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// One-shot UDP client: sends a single datagram and waits for one reply.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    endpoint: EndpointArgs,

    /// Payload of the request datagram.
    #[arg(long, default_value = DEFAULT_REQUEST)]
    message: String,

    /// Only accept a reply that comes from the server address.
    #[arg(long)]
    verify_source: bool,
}

/// 发送请求并等待回复
///
/// `on_sent` 在请求发出后、等待回复前调用。
async fn exchange(cli: &Cli, cancel: CancelToken, on_sent: impl FnOnce()) -> Result<Reply> {
    let addr = cli.endpoint.addr();
    let target = resolve(&addr)
        .await
        .with_context(|| format!("invalid server address {addr}"))?;
    let transport = UdpTransport::bind(ephemeral_bind_addr(&target))
        .await
        .context("failed to create UDP socket")?;
    debug!("Bound to {}", transport.local_addr()?);

    let options = ExchangeOptions {
        max_message_len: cli.endpoint.max_message_len(),
        call: CallOptions::default()
            .with_timeout(cli.endpoint.timeout())
            .with_cancel(cancel),
        verify_source: cli.verify_source,
    };

    let pending = Requester::new(transport, target, options)
        .send(Message::from(cli.message.as_str()))
        .await
        .context("failed to send request")?;
    on_sent();

    let reply = pending.wait().await.context("no reply received")?;
    info!("Reply from {}", reply.source);
    Ok(reply)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("udp_client=debug".parse()?)
                .add_directive("protocol=debug".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let (cancel, token) = CancelToken::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let reply = exchange(&cli, token, || println!("Message sent to server.")).await?;
    println!("Server reply: {}", reply.message);
    Ok(())
}
