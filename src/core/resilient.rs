//! 弹性会话：监管循环
//!
//! 反复执行一个 UnitOfWork（通常是一轮巡逻）。出错时交给 RecoveryEngine 分类：
//! 可恢复的故障走「冷却 + 重新认证」，外部停止正常返回，程序缺陷上抛给调用方。
//! 冷却按指数退避增长，成功完成一个单元后回到下限。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, watch};

use crate::core::state::{Backoff, PatrolSnapshot, SessionPhase, SessionState};
use crate::core::{sleep_cancellable, PatrolError, RecoveryAction, RecoveryEngine, SessionSupervisor};
use crate::patrol::{send_event, PatrolEvent};
use crate::session::{Authenticator, SessionHandle};

/// 可被监管循环反复执行的工作单元
#[async_trait]
pub trait UnitOfWork: Send {
    async fn run_unit(
        &mut self,
        session: &SessionHandle,
        supervisor: &SessionSupervisor,
    ) -> Result<(), PatrolError>;
}

/// 监管循环：持有会话状态与退避冷却
pub struct ResilientSession {
    state: SessionState,
    recovery: RecoveryEngine,
    authenticator: Arc<dyn Authenticator>,
    event_tx: Option<broadcast::Sender<PatrolEvent>>,
    snapshot_tx: Option<Arc<watch::Sender<PatrolSnapshot>>>,
    max_units: Option<u64>,
    completed: u64,
    faults: u64,
    /// 当前阶段正在等待的冷却；只在 Recovering 期间非零
    active_cooldown_ms: u64,
}

impl ResilientSession {
    pub fn new(handle: SessionHandle, cooldown: Backoff, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            state: SessionState::new(handle, cooldown),
            recovery: RecoveryEngine::new(),
            authenticator,
            event_tx: None,
            snapshot_tx: None,
            max_units: None,
            completed: 0,
            faults: 0,
            active_cooldown_ms: 0,
        }
    }

    pub fn with_event_tx(mut self, tx: broadcast::Sender<PatrolEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// 状态快照通道；只改写本结构拥有的字段（paused 由控制面维护）
    pub fn with_snapshot_tx(mut self, tx: Arc<watch::Sender<PatrolSnapshot>>) -> Self {
        self.snapshot_tx = Some(tx);
        self
    }

    /// 成功完成 n 个单元后正常返回；不设置则一直运行到被取消
    pub fn with_max_units(mut self, n: u64) -> Self {
        self.max_units = Some(n);
        self
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.state.handle
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn faults(&self) -> u64 {
        self.faults
    }

    fn publish(&self, last_error: Option<&PatrolError>) {
        let Some(tx) = &self.snapshot_tx else {
            return;
        };
        let session_id = self.state.handle.session_id();
        tx.send_modify(|s| {
            s.phase = self.state.phase;
            s.session_id = session_id;
            s.cooldown_ms = self.active_cooldown_ms;
            s.cycles_completed = self.completed;
            s.faults = self.faults;
            if let Some(err) = last_error {
                s.last_error = Some(err.to_string());
                s.last_fault_at = Some(Utc::now());
            }
        });
    }

    fn transition(&mut self, to: SessionPhase, cooldown_ms: u64) {
        let from = self.state.phase;
        self.state.phase = to;
        self.active_cooldown_ms = cooldown_ms;
        tracing::debug!("Session {:?} -> {:?} (cooldown {}ms)", from, to, cooldown_ms);
        send_event(
            self.event_tx.as_ref(),
            PatrolEvent::SessionTransition {
                from,
                to,
                cooldown_ms,
            },
        );
        self.publish(None);
    }

    fn record_fault(&mut self, err: &PatrolError) {
        self.faults += 1;
        send_event(
            self.event_tx.as_ref(),
            PatrolEvent::Fault {
                kind: err.kind().to_string(),
                detail: err.to_string(),
            },
        );
        self.publish(Some(err));
    }

    /// 运行直到被取消（Ok）、达到单元上限（Ok）或遇到不可恢复的错误（Err）
    pub async fn run<U>(&mut self, unit: &mut U, supervisor: &SessionSupervisor) -> Result<(), PatrolError>
    where
        U: UnitOfWork + ?Sized,
    {
        self.publish(None);
        loop {
            if supervisor.is_cancelled() {
                tracing::info!("Patrol stopped");
                return Ok(());
            }
            if self.max_units.is_some_and(|max| self.completed >= max) {
                tracing::info!("Completed {} unit(s), stopping", self.completed);
                return Ok(());
            }

            let handle = self.state.handle.clone();
            let err = match unit.run_unit(&handle, supervisor).await {
                Ok(()) => {
                    self.completed += 1;
                    self.state.cooldown.reset();
                    self.publish(None);
                    continue;
                }
                Err(err) => err,
            };

            match self.recovery.handle(&err) {
                RecoveryAction::Stop => {
                    tracing::info!("Patrol stopped");
                    return Ok(());
                }
                RecoveryAction::Abort => {
                    tracing::error!("Unrecoverable {}: {}", err.kind(), err);
                    self.record_fault(&err);
                    self.transition(SessionPhase::Faulted, 0);
                    return Err(err);
                }
                RecoveryAction::Reauthenticate => {
                    tracing::warn!("Session fault ({}): {}", err.kind(), err);
                    self.record_fault(&err);
                    self.transition(SessionPhase::Faulted, 0);
                    match self.recover(supervisor).await {
                        Ok(()) => {}
                        Err(PatrolError::Cancelled) => {
                            tracing::info!("Patrol stopped during recovery");
                            return Ok(());
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }
    }

    /// 冷却 + 重新认证，直到拿到新会话或被取消
    async fn recover(&mut self, supervisor: &SessionSupervisor) -> Result<(), PatrolError> {
        let token = supervisor.cancel_token();
        loop {
            let cooldown = self.state.cooldown.advance();
            self.transition(SessionPhase::Recovering, cooldown.as_millis() as u64);

            let result = self.authenticator.reauthenticate(&self.state.handle).await;
            sleep_cancellable(cooldown, &token).await?;

            match result {
                Ok(handle) => {
                    tracing::info!(
                        "Re-authenticated: {} -> {}",
                        self.state.handle.session_id(),
                        handle.session_id()
                    );
                    self.state.handle = handle;
                    self.transition(SessionPhase::Running, 0);
                    return Ok(());
                }
                Err(e) => {
                    let err = PatrolError::from(e);
                    tracing::warn!("Re-authentication failed: {}", err);
                    self.record_fault(&err);
                }
            }
        }
    }
}
