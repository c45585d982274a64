//! UDP 服务端
//!
//! 数据报请求-应答的应答方：接收一个数据报，向来源回复一次，然后退出。

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use protocol::{
    CallOptions, CancelToken, DatagramTransport, EndpointArgs, Exchange, ExchangeOptions, Message,
    Replier, UdpTransport, DEFAULT_REPLY,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// One-shot UDP server: receives a single datagram and replies once.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    endpoint: EndpointArgs,

    /// Reply sent back to the client.
    #[arg(long, default_value = DEFAULT_REPLY)]
    reply: String,
}

/// 绑定地址并构造应答方
async fn bind(cli: &Cli, cancel: CancelToken) -> Result<(Replier<UdpTransport>, SocketAddr)> {
    let addr = cli.endpoint.addr();
    let transport = UdpTransport::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let local = transport.local_addr()?;

    let options = ExchangeOptions {
        max_message_len: cli.endpoint.max_message_len(),
        call: CallOptions::default()
            .with_timeout(cli.endpoint.timeout())
            .with_cancel(cancel),
        verify_source: false,
    };
    Ok((Replier::new(transport, options), local))
}

/// 服务一次请求
async fn serve(replier: Replier<UdpTransport>, reply: Message) -> Result<Exchange> {
    let exchange = replier
        .serve_once(|request, source| {
            info!("Request from {}: {}", source, request);
            println!("Client says: {}", request);
            reply
        })
        .await
        .context("exchange failed")?;
    Ok(exchange)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("udp_server=debug".parse()?)
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

    let (replier, local) = bind(&cli, token).await?;
    println!("UDP Server listening on {}...", local);

    let exchange = serve(replier, Message::from(cli.reply.as_str())).await?;
    info!("Replied to {}", exchange.source);
    println!("Reply sent. Closing server.");
    Ok(())
}
