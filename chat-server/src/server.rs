//! 聊天服务端核心实现

use std::io::Write;

use anyhow::Context;
use protocol::{
    CallOptions, CancelToken, Console, EndpointArgs, InputLines, Session, SessionOptions,
    TcpListener, Termination, TransportListener,
};
use tracing::info;

/// 聊天服务端
///
/// 只接受一个客户端，会话结束后退出。
pub struct ChatServer {
    listener: TcpListener,
    options: SessionOptions,
}

impl ChatServer {
    /// 绑定监听地址
    pub async fn bind(args: &EndpointArgs, cancel: CancelToken) -> anyhow::Result<Self> {
        let addr = args.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to listen on {addr}"))?;

        let options = SessionOptions {
            max_message_len: args.max_message_len(),
            call: CallOptions::default()
                .with_timeout(args.timeout())
                .with_cancel(cancel),
        };
        Ok(Self { listener, options })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// 以标准输入输出进行聊天
    pub async fn run(self) -> anyhow::Result<Termination> {
        self.run_with(InputLines::stdin(), std::io::stdout()).await
    }

    /// 接受一个客户端并运行会话
    pub async fn run_with<O: Write + Send>(
        self,
        input: InputLines,
        mut output: O,
    ) -> anyhow::Result<Termination> {
        let Self { listener, options } = self;

        let (session, peer) = Session::respond(&listener, options)
            .await
            .context("failed to accept a client")?;
        // 只服务一个对端
        drop(listener);

        info!("Client connected from {}", peer);
        writeln!(output, "Client connected! Type 'exit' to end chat.")?;

        let mut console = Console::new(input, output, "Client");
        let how = session
            .run(&mut console)
            .await
            .context("chat session failed")?;

        info!("Chat with {} ended: {}", peer, how);
        writeln!(console.into_output(), "Chat ended.")?;
        Ok(how)
    }
}
