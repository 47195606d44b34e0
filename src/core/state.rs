//! 状态定义：会话阶段、退避冷却、会话状态与对外快照
//!
//! SessionState 只由 ResilientSession 持有和修改；外部只看到投影出来的 PatrolSnapshot。

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::ResilienceSection;
use crate::session::SessionHandle;

/// 会话监管阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Running,
    Faulted,
    Recovering,
}

/// 指数退避：连续故障时冷却翻倍（封顶），成功运行一轮后回到下限
#[derive(Clone, Debug, PartialEq)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        let max = max.max(min);
        Self {
            min,
            max,
            current: min,
        }
    }

    /// 本次故障使用的冷却；同时把下一次冷却翻倍（不超过上限）
    pub fn advance(&mut self) -> Duration {
        let cooldown = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        cooldown
    }

    pub fn reset(&mut self) {
        self.current = self.min;
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }
}

impl From<&ResilienceSection> for Backoff {
    fn from(section: &ResilienceSection) -> Self {
        Self::new(
            Duration::from_millis(section.min_cooldown_ms),
            Duration::from_millis(section.max_cooldown_ms),
        )
    }
}

/// ResilientSession 独占的会话状态
pub struct SessionState {
    pub phase: SessionPhase,
    pub cooldown: Backoff,
    pub handle: SessionHandle,
}

impl SessionState {
    pub fn new(handle: SessionHandle, cooldown: Backoff) -> Self {
        Self {
            phase: SessionPhase::Running,
            cooldown,
            handle,
        }
    }
}

/// 对外暴露的只读快照（watch 通道推送）
#[derive(Clone, Debug, Serialize)]
pub struct PatrolSnapshot {
    pub phase: SessionPhase,
    pub session_id: String,
    pub cooldown_ms: u64,
    pub cycles_completed: u64,
    pub faults: u64,
    pub last_error: Option<String>,
    pub last_fault_at: Option<DateTime<Utc>>,
    pub paused: bool,
}

impl Default for PatrolSnapshot {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Running,
            session_id: String::new(),
            cooldown_ms: 0,
            cycles_completed: 0,
            faults: 0,
            last_error: None,
            last_fault_at: None,
            paused: false,
        }
    }
}
