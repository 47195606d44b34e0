//! 捕捉谈判：对单个目标执行有界的多轮捕捉协议
//!
//! 每轮：重新查询捕获概率与背包 -> 选装置（首个超过阈值者，否则最强可用者）->
//! 无达标装置时先尝试一次辅助道具 -> 投掷 -> 按状态结束或继续。
//! 结局恰为 Captured / Fled / AttemptsExhausted / ResourceExhausted 之一。

use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::CaptureSection;
use crate::core::{sleep_cancellable, PatrolError};
use crate::patrol::{send_event, PatrolEvent};
use crate::session::GameSession;
use crate::world::{
    CaptureStatus, ConsumableKind, Creature, DeviceKind, DeviceProbability, InventorySnapshot,
};

/// 谈判参数
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    /// 装置捕获概率需严格超过该值才算「达标」
    pub threshold: f64,
    /// 投掷次数上限（辅助道具不计入）
    pub max_attempts: u32,
    /// 每次投掷 / 使用道具后的等待
    pub inter_round_delay: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            max_attempts: 5,
            inter_round_delay: Duration::from_secs(2),
        }
    }
}

impl TryFrom<&CaptureSection> for CaptureConfig {
    type Error = PatrolError;

    fn try_from(section: &CaptureSection) -> Result<Self, Self::Error> {
        if !(0.0..=1.0).contains(&section.threshold) {
            return Err(PatrolError::Config(format!(
                "capture.threshold must be within [0, 1], got {}",
                section.threshold
            )));
        }
        Ok(Self {
            threshold: section.threshold,
            max_attempts: section.max_attempts.max(1),
            inter_round_delay: Duration::from_millis(section.inter_round_delay_ms),
        })
    }
}

/// 谈判结局
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureOutcome {
    Captured,
    /// 逃跑或疑似软封禁；调用方应考虑放缓后续动作
    Fled,
    AttemptsExhausted,
    ResourceExhausted,
}

/// 一轮记录：投掷轮 device/status 有值，辅助道具轮只有 consumable
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureAttempt {
    pub round: u32,
    pub device: Option<DeviceKind>,
    pub consumable: Option<ConsumableKind>,
    pub status: Option<CaptureStatus>,
}

/// 一次谈判的完整结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Negotiation {
    pub attempts: Vec<CaptureAttempt>,
    pub outcome: CaptureOutcome,
    pub assist_used: bool,
}

impl Negotiation {
    /// 实际投掷次数
    pub fn throws(&self) -> u32 {
        self.attempts.iter().filter(|a| a.device.is_some()).count() as u32
    }
}

/// 装置选择结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceChoice {
    /// 服务端顺序中首个超过阈值的可用装置
    Best(DeviceKind),
    /// 无达标装置时的最强可用装置
    Fallback(DeviceKind),
}

impl DeviceChoice {
    pub fn device(&self) -> DeviceKind {
        match self {
            DeviceChoice::Best(d) | DeviceChoice::Fallback(d) => *d,
        }
    }
}

/// 选择投掷装置（纯函数）
///
/// 只考虑背包数量大于 0 的装置；没有任何可用装置时返回 None。
pub fn select_device(
    probabilities: &[DeviceProbability],
    inventory: &InventorySnapshot,
    threshold: f64,
) -> Option<DeviceChoice> {
    let available = || {
        probabilities
            .iter()
            .filter(|p| inventory.device_count(p.device) > 0)
    };

    if let Some(best) = available().find(|p| p.probability > threshold) {
        return Some(DeviceChoice::Best(best.device));
    }
    available()
        .map(|p| p.device)
        .max()
        .map(DeviceChoice::Fallback)
}

/// 捕捉谈判器
pub struct CaptureNegotiator {
    config: CaptureConfig,
    event_tx: Option<broadcast::Sender<PatrolEvent>>,
}

impl CaptureNegotiator {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            event_tx: None,
        }
    }

    /// 设置事件推送通道
    pub fn with_event_tx(mut self, tx: broadcast::Sender<PatrolEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    fn record(&self, creature: &Creature, attempts: &mut Vec<CaptureAttempt>, attempt: CaptureAttempt) {
        send_event(
            self.event_tx.as_ref(),
            PatrolEvent::CaptureAttempted {
                species_id: creature.species_id,
                round: attempt.round,
                device: attempt.device,
                consumable: attempt.consumable,
                status: attempt.status,
            },
        );
        attempts.push(attempt);
    }

    fn finish(
        &self,
        creature: &Creature,
        attempts: Vec<CaptureAttempt>,
        outcome: CaptureOutcome,
        assist_used: bool,
    ) -> Negotiation {
        let negotiation = Negotiation {
            attempts,
            outcome,
            assist_used,
        };
        tracing::info!(
            "Negotiation with {} finished: {:?} after {} throw(s)",
            creature.label(),
            outcome,
            negotiation.throws()
        );
        send_event(
            self.event_tx.as_ref(),
            PatrolEvent::NegotiationFinished {
                species_id: creature.species_id,
                outcome,
                throws: negotiation.throws(),
            },
        );
        negotiation
    }

    /// 对单个目标执行捕捉协议
    ///
    /// 传输错误直接上抛；ResourceExhausted / AttemptsExhausted 作为结局返回，由调用方决定后续。
    pub async fn negotiate(
        &self,
        session: &dyn GameSession,
        creature: &Creature,
        cancel: &CancellationToken,
    ) -> Result<Negotiation, PatrolError> {
        let max_attempts = self.config.max_attempts.max(1);
        let delay = self.config.inter_round_delay;

        let mut probabilities = session.begin_encounter(creature).await?;
        let mut fresh = true;
        let mut attempts = Vec::new();
        let mut assist_used = false;
        let mut throws = 0u32;
        let mut round = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(PatrolError::Cancelled);
            }
            round += 1;

            if !fresh {
                probabilities = session.capture_probabilities(creature).await?;
            }
            fresh = false;
            let inventory = session.get_inventory().await?;

            let device = match select_device(&probabilities, &inventory, self.config.threshold) {
                Some(DeviceChoice::Best(device)) => device,
                fallback => {
                    let assist = ConsumableKind::AssistBerry;
                    if !assist_used && inventory.consumable_count(assist) > 0 {
                        tracing::info!("Using {:?} on {}", assist, creature.label());
                        session.use_consumable(assist, creature).await?;
                        assist_used = true;
                        self.record(
                            creature,
                            &mut attempts,
                            CaptureAttempt {
                                round,
                                device: None,
                                consumable: Some(assist),
                                status: None,
                            },
                        );
                        sleep_cancellable(delay, cancel).await?;
                        continue;
                    }
                    match fallback {
                        Some(choice) => choice.device(),
                        None => {
                            tracing::warn!("Out of usable devices for {}", creature.label());
                            return Ok(self.finish(
                                creature,
                                attempts,
                                CaptureOutcome::ResourceExhausted,
                                assist_used,
                            ));
                        }
                    }
                }
            };

            tracing::info!("Throwing {:?} at {} (round {})", device, creature.label(), round);
            let status = session.attempt_capture(creature, device).await?;
            throws += 1;
            self.record(
                creature,
                &mut attempts,
                CaptureAttempt {
                    round,
                    device: Some(device),
                    consumable: None,
                    status: Some(status),
                },
            );

            // 终局状态先于等待处理，取消不会吞掉已发生的结果
            match status {
                CaptureStatus::Captured => {
                    return Ok(self.finish(creature, attempts, CaptureOutcome::Captured, assist_used));
                }
                CaptureStatus::Fled => {
                    tracing::warn!("{} fled, possible soft ban", creature.label());
                    return Ok(self.finish(creature, attempts, CaptureOutcome::Fled, assist_used));
                }
                CaptureStatus::Missed if throws >= max_attempts => {
                    tracing::info!("Over capture limit ({}) for {}", max_attempts, creature.label());
                    return Ok(self.finish(
                        creature,
                        attempts,
                        CaptureOutcome::AttemptsExhausted,
                        assist_used,
                    ));
                }
                CaptureStatus::Missed => sleep_cancellable(delay, cancel).await?,
            }
        }
    }
}
