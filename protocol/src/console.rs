//! 终端回合驱动
//!
//! 从输入逐行读取本方消息，把对方消息打印到输出，用于聊天客户端与服务端。
//!
//! 标准输入的读取无法取消，因此放在独立线程里，通过通道交给异步侧；
//! 会话被取消后运行时可以直接退出，不必等待用户按下回车。

use std::io::{self, BufRead, Write};
use std::thread;

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{ProtocolError, Result};
use crate::message::Message;
use crate::session::{Termination, TurnHandler};

/// 读取线程与异步侧之间的行缓冲
const LINE_BACKLOG: usize = 1;

/// 在独立线程上逐行读取的输入
///
/// 每一行保留原始字节（不要求 UTF-8），不含行尾。
pub struct InputLines {
    rx: mpsc::Receiver<io::Result<Vec<u8>>>,
}

impl InputLines {
    /// 从标准输入读取
    pub fn stdin() -> Self {
        Self::spawn(io::BufReader::new(io::stdin()))
    }

    /// 启动读取线程
    ///
    /// 线程在输入结束、读取出错或接收端被丢弃后退出；
    /// 它从不被等待，进程退出时随之结束。
    pub fn spawn<R: BufRead + Send + 'static>(mut reader: R) -> Self {
        let (tx, rx) = mpsc::channel(LINE_BACKLOG);
        thread::spawn(move || loop {
            let mut line = Vec::new();
            let item = match reader.read_until(b'\n', &mut line) {
                Ok(0) => break,
                Ok(_) => Ok(strip_line_ending(line)),
                Err(e) => Err(e),
            };
            let failed = item.is_err();
            if tx.blocking_send(item).is_err() || failed {
                break;
            }
        });
        Self { rx }
    }

    /// 下一行，输入结束时为 `None`
    pub async fn next_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        self.rx.recv().await.transpose()
    }
}

fn strip_line_ending(mut line: Vec<u8>) -> Vec<u8> {
    while matches!(line.last(), Some(b'\n' | b'\r')) {
        line.pop();
    }
    line
}

/// 终端回合驱动
pub struct Console<O> {
    input: InputLines,
    output: O,
    /// 对方名称，用于打印 "<peer>: <text>"
    peer: String,
}

impl<O: Write + Send> Console<O> {
    pub fn new(input: InputLines, output: O, peer: impl Into<String>) -> Self {
        Self {
            input,
            output,
            peer: peer.into(),
        }
    }

    pub fn into_output(self) -> O {
        self.output
    }
}

impl<O: Write + Send> TurnHandler for Console<O> {
    async fn compose(&mut self) -> Result<Option<Message>> {
        let _ = write!(self.output, "You: ");
        let _ = self.output.flush();

        match self.input.next_line().await {
            // 长度上限由连接在发送时施加
            Ok(Some(line)) => Ok(Some(Message::bounded(line, usize::MAX))),
            Ok(None) => {
                debug!("Local input closed");
                Ok(None)
            }
            Err(source) => Err(ProtocolError::Input { source }),
        }
    }

    fn on_received(&mut self, msg: &Message) {
        let _ = writeln!(self.output, "{}: {}", self.peer, msg.text());
    }

    fn on_ended(&mut self, how: Termination) {
        if how == Termination::PeerDisconnected {
            let _ = writeln!(self.output, "{} disconnected.", self.peer);
        }
    }
}
