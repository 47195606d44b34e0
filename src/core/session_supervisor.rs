//! 会话监管：生命周期、中断管理
//!
//! 持有 CancellationToken，Stop / Ctrl+C 时取消巡逻；支持暂停与子 token（单个会话取消）。
//! 所有等待（轮间延迟、节流、退避冷却）都经过这里，保证任何挂起点都能及时响应停止。

use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::core::PatrolError;

/// 可取消的休眠：取消时返回 `PatrolError::Cancelled`
pub async fn sleep_cancellable(delay: Duration, token: &CancellationToken) -> Result<(), PatrolError> {
    if token.is_cancelled() {
        return Err(PatrolError::Cancelled);
    }
    if delay.is_zero() {
        return Ok(());
    }
    tokio::select! {
        _ = token.cancelled() => Err(PatrolError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// 会话级生命周期管理：取消令牌与暂停状态
#[derive(Debug)]
pub struct SessionSupervisor {
    cancel_token: CancellationToken,
    paused_tx: watch::Sender<bool>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    /// 挂到已有 token 下（如 ShutdownSignal 的 token）
    pub fn with_token(cancel_token: CancellationToken) -> Self {
        let (paused_tx, _) = watch::channel(false);
        Self {
            cancel_token,
            paused_tx,
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 触发取消
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    pub fn is_paused(&self) -> bool {
        *self.paused_tx.borrow()
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused_tx.send_replace(paused);
    }

    /// 挂起点：先休眠 delay，再在暂停期间阻塞；两者都可被取消
    pub async fn checkpoint(&self, delay: Duration) -> Result<(), PatrolError> {
        sleep_cancellable(delay, &self.cancel_token).await?;
        let mut paused_rx = self.paused_tx.subscribe();
        if *paused_rx.borrow() {
            tracing::info!("Patrol paused, waiting for resume");
            tokio::select! {
                _ = self.cancel_token.cancelled() => return Err(PatrolError::Cancelled),
                res = paused_rx.wait_for(|paused| !*paused) => {
                    if res.is_err() {
                        return Err(PatrolError::Internal("pause channel closed".to_string()));
                    }
                }
            }
            tracing::info!("Patrol resumed");
        }
        Ok(())
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
