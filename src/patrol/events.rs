//! 巡逻过程事件：用于日志流/前端展示每次捕捉尝试与会话状态迁移

use serde::Serialize;
use tokio::sync::broadcast;

use crate::capture::CaptureOutcome;
use crate::core::SessionPhase;
use crate::patrol::PatrolPhase;
use crate::world::{ActivationResult, CaptureStatus, ConsumableKind, DeviceKind, ItemKind};

/// 单个过程事件（可序列化为 JSON）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PatrolEvent {
    /// 新一轮巡逻开始
    CycleStarted { cycle: u64, waypoints: usize },
    /// 巡逻阶段切换
    PhaseChanged { phase: PatrolPhase },
    /// 一次投掷或一次辅助道具使用
    CaptureAttempted {
        species_id: u32,
        round: u32,
        device: Option<DeviceKind>,
        consumable: Option<ConsumableKind>,
        status: Option<CaptureStatus>,
    },
    /// 一次谈判结束
    NegotiationFinished {
        species_id: u32,
        outcome: CaptureOutcome,
        throws: u32,
    },
    /// 路点激活结果（失败时 result 为 None）
    WaypointActivated {
        waypoint_id: String,
        result: Option<ActivationResult>,
    },
    /// 整理背包丢弃的道具
    ItemsRecycled { item: ItemKind, count: u32 },
    /// 蛋放入孵化器
    EggIncubated { incubator_id: String, egg_id: u64 },
    /// 故障（记录类别与详情）
    Fault { kind: String, detail: String },
    /// 会话状态迁移
    SessionTransition {
        from: SessionPhase,
        to: SessionPhase,
        cooldown_ms: u64,
    },
    /// 一轮巡逻完成
    CycleFinished {
        cycle: u64,
        captured: u32,
        activated: u32,
    },
}

/// 推送事件；没有订阅者时静默丢弃
pub fn send_event(tx: Option<&broadcast::Sender<PatrolEvent>>, ev: PatrolEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_serialize_with_type_tag() {
        let ev = PatrolEvent::CaptureAttempted {
            species_id: 25,
            round: 2,
            device: Some(DeviceKind::Great),
            consumable: None,
            status: Some(CaptureStatus::Missed),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "capture_attempted");
        assert_eq!(json["device"], "great");
        assert_eq!(json["status"], "missed");

        let ev = PatrolEvent::SessionTransition {
            from: SessionPhase::Faulted,
            to: SessionPhase::Recovering,
            cooldown_ms: 2000,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "session_transition");
        assert_eq!(json["to"], "recovering");
    }

    #[test]
    fn test_send_without_subscribers_is_silent() {
        let (tx, rx) = broadcast::channel(4);
        drop(rx);
        send_event(Some(&tx), PatrolEvent::CycleStarted { cycle: 1, waypoints: 0 });
        send_event(None, PatrolEvent::CycleStarted { cycle: 2, waypoints: 0 });
    }
}
