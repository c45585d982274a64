//! 聊天客户端核心实现

use std::io::Write;

use anyhow::Context;
use protocol::{
    CallOptions, CancelToken, Console, EndpointArgs, InputLines, Session, SessionOptions,
    TcpTransport, Termination, TransportConfig,
};
use tracing::info;

/// 聊天客户端
pub struct ChatClient {
    addr: String,
    config: TransportConfig,
    options: SessionOptions,
}

impl ChatClient {
    pub fn new(args: &EndpointArgs, cancel: CancelToken) -> Self {
        let call = CallOptions::default()
            .with_timeout(args.timeout())
            .with_cancel(cancel);
        Self {
            addr: args.addr(),
            config: TransportConfig {
                call: call.clone(),
                nodelay: true,
            },
            options: SessionOptions {
                max_message_len: args.max_message_len(),
                call,
            },
        }
    }

    /// 以标准输入输出进行聊天
    pub async fn run(self) -> anyhow::Result<Termination> {
        self.run_with(InputLines::stdin(), std::io::stdout()).await
    }

    /// 连接服务器并运行会话
    pub async fn run_with<O: Write + Send>(
        self,
        input: InputLines,
        mut output: O,
    ) -> anyhow::Result<Termination> {
        let session = Session::initiate::<TcpTransport>(&self.addr, &self.config, self.options)
            .await
            .with_context(|| format!("failed to connect to {}", self.addr))?;

        info!("Connected to {}", self.addr);
        writeln!(output, "Connected to server! Type 'exit' to end chat.")?;

        let mut console = Console::new(input, output, "Server");
        let how = session
            .run(&mut console)
            .await
            .context("chat session failed")?;

        info!("Chat with {} ended: {}", self.addr, how);
        writeln!(console.into_output(), "Chat ended.")?;
        Ok(how)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{Message, ProtocolError, Received, Role, TcpListener, TransportListener};
    use std::io::Cursor;

    async fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr.port())
    }

    fn args(port: u16) -> EndpointArgs {
        EndpointArgs {
            port,
            ..EndpointArgs::default()
        }
    }

    fn lines(bytes: &[u8]) -> InputLines {
        InputLines::spawn(Cursor::new(bytes.to_vec()))
    }

    #[tokio::test]
    async fn test_hi_yo_exit() {
        let (listener, port) = listener().await;
        let client = ChatClient::new(&args(port), CancelToken::never());

        let input = lines(b"hi\nexit\n");
        let client = tokio::spawn(async move { client.run_with(input, Vec::new()).await });

        let (mut server, _peer) = Session::respond(&listener, SessionOptions::default())
            .await
            .unwrap();
        assert_eq!(server.role(), Role::Responder);
        assert_eq!(
            server.recv().await.unwrap(),
            Received::Message(Message::from("hi"))
        );
        server.send(Message::from("yo")).await.unwrap();

        let how = client.await.unwrap().unwrap();
        assert_eq!(how, Termination::SentinelSent);

        assert!(matches!(
            server.recv().await.unwrap(),
            Received::Sentinel(_) | Received::PeerDisconnected
        ));
    }

    #[tokio::test]
    async fn test_server_exit_ends_client() {
        let (listener, port) = listener().await;
        let client = ChatClient::new(&args(port), CancelToken::never());

        let input = lines(b"bye?\n");
        let client = tokio::spawn(async move { client.run_with(input, Vec::new()).await });

        let (mut server, _peer) = Session::respond(&listener, SessionOptions::default())
            .await
            .unwrap();
        server.recv().await.unwrap();
        server.send(Message::from("exit")).await.unwrap();

        let how = client.await.unwrap().unwrap();
        assert_eq!(how, Termination::SentinelReceived);
    }

    #[tokio::test]
    async fn test_connect_refused_is_an_error() {
        let port = {
            let (listener, port) = listener().await;
            drop(listener);
            port
        };
        let client = ChatClient::new(&args(port), CancelToken::never());

        let err = client
            .run_with(lines(b""), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProtocolError>(),
            Some(ProtocolError::Connect { .. })
        ));
    }
}
