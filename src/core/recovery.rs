//! 错误恢复引擎
//!
//! 根据 PatrolError 类型返回 RecoveryAction，供 ResilientSession 决定是重新认证、正常停止还是上抛。

use crate::core::{PatrolError, RecoveryAction};

/// 故障分类：将错误映射为可执行动作
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &PatrolError) -> RecoveryAction {
        match err {
            PatrolError::Transport(_)
            | PatrolError::ResourceExhausted { .. }
            | PatrolError::AttemptsExhausted { .. }
            | PatrolError::AuthFault(_) => RecoveryAction::Reauthenticate,
            PatrolError::Cancelled => RecoveryAction::Stop,
            PatrolError::Config(_) | PatrolError::Internal(_) => RecoveryAction::Abort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_transport_fault() {
        let engine = RecoveryEngine::new();
        let action = engine.handle(&PatrolError::Transport("connection reset".to_string()));
        assert_eq!(action, RecoveryAction::Reauthenticate);
    }

    #[test]
    fn test_recovery_resource_exhausted() {
        let engine = RecoveryEngine::new();
        let action = engine.handle(&PatrolError::ResourceExhausted { species_id: 16 });
        assert_eq!(action, RecoveryAction::Reauthenticate);
    }

    #[test]
    fn test_recovery_auth_fault() {
        let engine = RecoveryEngine::new();
        let action = engine.handle(&PatrolError::AuthFault("bad token".to_string()));
        assert_eq!(action, RecoveryAction::Reauthenticate);
    }

    #[test]
    fn test_recovery_cancelled() {
        let engine = RecoveryEngine::new();
        assert_eq!(engine.handle(&PatrolError::Cancelled), RecoveryAction::Stop);
    }

    #[test]
    fn test_recovery_defects_abort() {
        let engine = RecoveryEngine::new();
        assert_eq!(
            engine.handle(&PatrolError::Internal("index out of range".to_string())),
            RecoveryAction::Abort
        );
        assert_eq!(
            engine.handle(&PatrolError::Config("threshold".to_string())),
            RecoveryAction::Abort
        );
    }
}
