//! 优雅关闭
//!
//! Ctrl+C / SIGTERM 取消巡逻的根令牌；随后 PatrolShutdown 发送 Stop，并在超时内等待巡逻任务退出。

use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::{Command, PatrolError};

/// 关闭信号：持有巡逻的根取消令牌
#[derive(Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// 巡逻任务挂在这个令牌下（spawn_patrol_with_token）
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn trigger(&self, source: &str) {
        if !self.token.is_cancelled() {
            tracing::info!("Shutdown requested by {}", source);
            self.token.cancel();
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install(&self) {
        let signal = self.clone();
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                signal.trigger("Ctrl+C");
            }
        });

        #[cfg(unix)]
        {
            let signal = self.clone();
            tokio::spawn(async move {
                use tokio::signal::unix::{signal as unix_signal, SignalKind};
                if let Ok(mut sigterm) = unix_signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    signal.trigger("SIGTERM");
                }
            });
        }
    }
}

/// 巡逻任务的停止流程：发送 Stop，等待任务结束并取回最终结果
pub struct PatrolShutdown {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<Result<(), PatrolError>>,
    timeout: Duration,
}

impl PatrolShutdown {
    pub fn new(
        commands: mpsc::UnboundedSender<Command>,
        task: JoinHandle<Result<(), PatrolError>>,
    ) -> Self {
        Self {
            commands,
            task,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 巡逻以不可恢复错误结束、任务崩溃或超时未退出时返回 Err
    pub async fn stop(self) -> anyhow::Result<()> {
        // 任务可能已经结束，命令通道关闭时忽略发送失败
        let _ = self.commands.send(Command::Stop);
        match tokio::time::timeout(self.timeout, self.task).await {
            Ok(joined) => {
                joined.context("Patrol task panicked")??;
                tracing::info!("Patrol task stopped");
                Ok(())
            }
            Err(_) => anyhow::bail!("Patrol task did not stop within {:?}", self.timeout),
        }
    }
}

/// 运行 app 直到其结束或收到关闭信号
pub async fn run_until_shutdown<F>(signal: &ShutdownSignal, app: F)
where
    F: Future<Output = ()>,
{
    signal.install();
    tokio::select! {
        _ = app => tracing::info!("Patrol finished"),
        _ = signal.token.cancelled() => tracing::info!("Shutdown signal received"),
    }
}
