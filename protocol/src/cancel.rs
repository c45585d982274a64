//! 取消与超时控制
//!
//! 每个可能长时间阻塞的操作（connect、accept、send、receive）都经过
//! [`guarded`]，从而可以被超时或外部取消打断，而不必结束整个进程。

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::timeout;

use crate::error::{Phase, ProtocolError, Result};

/// 取消信号发送端
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// 触发取消，所有关联的 [`CancelToken`] 都会收到
    pub fn cancel(&self) {
        // send_replace 在没有接收端时也会更新值
        self.tx.send_replace(true);
    }

    /// 派生新的取消令牌
    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: Some(self.tx.subscribe()),
        }
    }
}

/// 取消信号接收端
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    /// `None` 表示永不取消
    rx: Option<watch::Receiver<bool>>,
}

impl CancelToken {
    /// 创建一对取消句柄与令牌
    pub fn new() -> (CancelHandle, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelToken { rx: Some(rx) })
    }

    /// 永不触发的令牌
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// 等待取消信号
    ///
    /// 发送端被丢弃而未触发取消时永远挂起。
    pub async fn cancelled(&mut self) {
        match self.rx.as_mut() {
            Some(rx) => {
                if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
            None => std::future::pending::<()>().await,
        }
    }
}

/// 阻塞操作的调用选项
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// 单次操作超时，`None` 表示无限等待
    pub timeout: Option<Duration>,
    /// 取消令牌
    pub cancel: CancelToken,
}

impl CallOptions {
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// 在超时与取消的约束下执行一个阻塞操作
pub async fn guarded<T, F>(phase: Phase, options: &CallOptions, op: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let mut cancel = options.cancel.clone();
    if cancel.is_cancelled() {
        return Err(ProtocolError::Cancelled { phase });
    }

    let bounded = async {
        match options.timeout {
            Some(after) => timeout(after, op)
                .await
                .map_err(|_| ProtocolError::Timeout { phase, after })?,
            None => op.await,
        }
    };

    tokio::select! {
        result = bounded => result,
        _ = cancel.cancelled() => Err(ProtocolError::Cancelled { phase }),
    }
}
