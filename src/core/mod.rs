//! 核心层：错误与恢复、状态与退避、会话监管、弹性循环、控制面、优雅关闭

pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod resilient;
pub mod session_supervisor;
pub mod shutdown;
pub mod state;

pub use error::{PatrolError, RecoveryAction};
pub use orchestrator::{
    build_orchestrator, spawn_patrol, spawn_patrol_with_token, Command, PatrolHandle,
};
pub use recovery::RecoveryEngine;
pub use resilient::{ResilientSession, UnitOfWork};
pub use session_supervisor::{sleep_cancellable, SessionSupervisor};
pub use shutdown::{run_until_shutdown, PatrolShutdown, ShutdownSignal};
pub use state::{Backoff, PatrolSnapshot, SessionPhase, SessionState};
