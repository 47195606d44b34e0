//! 巡逻错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 PatrolError 决定 Reauthenticate / Stop / Abort。

use thiserror::Error;

use crate::session::SessionError;

/// 巡逻运行过程中可能出现的错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PatrolError {
    /// 网络或服务端错误，退避并重新认证后恢复
    #[error("Transport fault: {0}")]
    Transport(String),

    /// 没有可用的捕捉装置或辅助道具
    #[error("No usable capture resources (species {species_id})")]
    ResourceExhausted { species_id: u32 },

    /// 捕捉在自身轮数上限内放弃
    #[error("Capture attempts exhausted (species {species_id})")]
    AttemptsExhausted { species_id: u32 },

    /// 重新认证失败
    #[error("Auth fault: {0}")]
    AuthFault(String),

    /// 外部停止（Ctrl+C / Stop 命令）
    #[error("Cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    Config(String),

    /// 程序缺陷，不应被当作瞬时故障掩盖
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<SessionError> for PatrolError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Transport(msg) => PatrolError::Transport(msg),
            SessionError::Auth(msg) => PatrolError::AuthFault(msg),
            // 无法解析的响应按瞬时故障处理
            SessionError::Protocol(msg) => PatrolError::Transport(format!("protocol: {msg}")),
        }
    }
}

impl PatrolError {
    /// 日志与事件中使用的错误类别
    pub fn kind(&self) -> &'static str {
        match self {
            PatrolError::Transport(_) => "transport_fault",
            PatrolError::ResourceExhausted { .. } => "resource_exhausted",
            PatrolError::AttemptsExhausted { .. } => "attempts_exhausted",
            PatrolError::AuthFault(_) => "auth_fault",
            PatrolError::Cancelled => "cancelled",
            PatrolError::Config(_) => "config",
            PatrolError::Internal(_) => "internal",
        }
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 冷却后重新认证，然后继续巡逻
    Reauthenticate,
    /// 外部要求停止，正常退出
    Stop,
    /// 不可恢复（配置或程序缺陷），向调用方上抛
    Abort,
}
