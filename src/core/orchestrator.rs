//! 巡逻控制面：在后台任务中启动受监管的巡逻循环
//!
//! 建立三条通道：调用方 -> 核心的命令（Pause/Resume/Stop）；核心 -> 调用方的状态快照（watch）；
//! 核心 -> 调用方的过程事件（broadcast）。

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::capture::{CaptureConfig, CaptureNegotiator};
use crate::config::AppConfig;
use crate::core::state::{Backoff, PatrolSnapshot};
use crate::core::{PatrolError, ResilientSession, SessionSupervisor};
use crate::patrol::{Hatchery, Housekeeper, PatrolConfig, PatrolEvent, PatrolOrchestrator};
use crate::session::{Authenticator, SessionHandle};

/// 发往巡逻任务的命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// 在下一个挂起点暂停
    Pause,
    Resume,
    /// 停止巡逻（任意挂起点立即返回）
    Stop,
}

/// spawn_patrol 返回的句柄
pub struct PatrolHandle {
    pub commands: mpsc::UnboundedSender<Command>,
    pub state: watch::Receiver<PatrolSnapshot>,
    pub events: broadcast::Receiver<PatrolEvent>,
    pub task: JoinHandle<Result<(), PatrolError>>,
}

/// 按配置组装巡逻编排器
pub fn build_orchestrator(
    cfg: &AppConfig,
    event_tx: broadcast::Sender<PatrolEvent>,
) -> Result<PatrolOrchestrator, PatrolError> {
    let capture = CaptureConfig::try_from(&cfg.capture)?;
    let negotiator = CaptureNegotiator::new(capture).with_event_tx(event_tx.clone());
    let mut orchestrator =
        PatrolOrchestrator::new(PatrolConfig::from(&cfg.patrol), negotiator).with_event_tx(event_tx);
    if let Some(housekeeper) = Housekeeper::from_section(&cfg.housekeeping) {
        orchestrator = orchestrator.with_housekeeper(housekeeper);
    }
    if let Some(hatchery) = Hatchery::from_section(&cfg.incubation) {
        orchestrator = orchestrator.with_hatchery(hatchery);
    }
    Ok(orchestrator)
}

/// 启动巡逻任务（独立的根取消令牌）
pub fn spawn_patrol(
    cfg: AppConfig,
    authenticator: Arc<dyn Authenticator>,
    handle: SessionHandle,
) -> Result<PatrolHandle, PatrolError> {
    spawn_patrol_with_token(cfg, authenticator, handle, CancellationToken::new())
}

/// 启动巡逻任务；parent 被取消（如进程关闭）时巡逻随之停止，Stop 命令不影响 parent
pub fn spawn_patrol_with_token(
    cfg: AppConfig,
    authenticator: Arc<dyn Authenticator>,
    handle: SessionHandle,
    parent: CancellationToken,
) -> Result<PatrolHandle, PatrolError> {
    cfg.validate()?;

    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Command>();
    let (state_tx, state_rx) = watch::channel(PatrolSnapshot::default());
    let (event_tx, event_rx) = broadcast::channel::<PatrolEvent>(256);
    let state_tx = Arc::new(state_tx);

    let mut orchestrator = build_orchestrator(&cfg, event_tx.clone())?;
    let mut resilient = ResilientSession::new(handle, Backoff::from(&cfg.resilience), authenticator)
        .with_event_tx(event_tx)
        .with_snapshot_tx(Arc::clone(&state_tx));
    if let Some(n) = cfg.patrol.max_cycles {
        resilient = resilient.with_max_units(n);
    }

    let supervisor = Arc::new(SessionSupervisor::with_token(parent.child_token()));

    // 命令循环：巡逻结束或通道关闭时退出
    let control = Arc::clone(&supervisor);
    let control_state = Arc::clone(&state_tx);
    let token = supervisor.cancel_token();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    tracing::info!("Command: {:?}", cmd);
                    match cmd {
                        Command::Pause | Command::Resume => {
                            let paused = cmd == Command::Pause;
                            control.set_paused(paused);
                            control_state.send_modify(|s| s.paused = paused);
                        }
                        Command::Stop => {
                            control.cancel();
                            break;
                        }
                    }
                }
            }
        }
    });

    let task = tokio::spawn(async move {
        let result = resilient.run(&mut orchestrator, &supervisor).await;
        // 结束命令循环
        supervisor.cancel();
        result
    });

    Ok(PatrolHandle {
        commands: cmd_tx,
        state: state_rx,
        events: event_rx,
        task,
    })
}
