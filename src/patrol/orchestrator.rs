//! 巡逻编排器：一轮巡逻的状态机
//!
//! Idle -> Traveling -> Encountering* -> Activating -> Idle，对每个路点重复。
//! 路点按距离排序；到达后遭遇附近生物（按稀有度排序），最后激活路点。
//! 任意两次实体交互之间都经过 SessionSupervisor::checkpoint 节流。

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::capture::{CaptureNegotiator, CaptureOutcome};
use crate::config::{PatrolSection, ResourcePolicy};
use crate::core::{PatrolError, SessionSupervisor, UnitOfWork};
use crate::geo::{distance, walk_path};
use crate::patrol::{send_event, Hatchery, Housekeeper, PatrolEvent};
use crate::ranking::{rank_creatures, rank_waypoints};
use crate::session::{GameSession, SessionError, SessionHandle};
use crate::world::{ActivationResult, Coordinate, Waypoint, WaypointKind};

/// 巡逻阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatrolPhase {
    Idle,
    Traveling,
    Encountering,
    Activating,
}

/// 巡逻节奏与策略（由 [patrol] 段转换而来）
#[derive(Debug, Clone, PartialEq)]
pub struct PatrolConfig {
    pub encounter_creatures: bool,
    pub interaction_delay: Duration,
    pub waypoint_delay: Duration,
    pub walk_step_m: f64,
    pub creature_step_m: f64,
    pub step_delay: Duration,
    pub soft_ban_pause: Duration,
    pub resource_policy: ResourcePolicy,
}

impl Default for PatrolConfig {
    fn default() -> Self {
        Self::from(&PatrolSection::default())
    }
}

impl From<&PatrolSection> for PatrolConfig {
    fn from(section: &PatrolSection) -> Self {
        Self {
            encounter_creatures: section.encounter_creatures,
            interaction_delay: Duration::from_millis(section.interaction_delay_ms),
            waypoint_delay: Duration::from_millis(section.waypoint_delay_ms),
            walk_step_m: section.walk_step_m,
            creature_step_m: section.creature_step_m,
            step_delay: Duration::from_millis(section.step_delay_ms),
            soft_ban_pause: Duration::from_millis(section.soft_ban_pause_ms),
            resource_policy: section.resource_policy,
        }
    }
}

/// 一轮巡逻的统计
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub waypoints_visited: u32,
    pub waypoints_activated: u32,
    pub creatures_encountered: u32,
    pub captured: u32,
    pub fled: u32,
    pub abandoned: u32,
    pub items_recycled: u32,
    pub eggs_incubated: u32,
    /// 本轮因资源耗尽而停止遭遇（SkipCreatures 策略）
    pub resources_exhausted: bool,
}

/// 单个路点上遭遇结束的原因
enum EncounterEnd {
    Done,
    OutOfResources,
}

/// 巡逻编排器
pub struct PatrolOrchestrator {
    config: PatrolConfig,
    negotiator: CaptureNegotiator,
    housekeeper: Option<Housekeeper>,
    hatchery: Option<Hatchery>,
    event_tx: Option<broadcast::Sender<PatrolEvent>>,
    phase: PatrolPhase,
    cycles: u64,
}

impl PatrolOrchestrator {
    pub fn new(config: PatrolConfig, negotiator: CaptureNegotiator) -> Self {
        Self {
            config,
            negotiator,
            housekeeper: None,
            hatchery: None,
            event_tx: None,
            phase: PatrolPhase::Idle,
            cycles: 0,
        }
    }

    pub fn with_housekeeper(mut self, housekeeper: Housekeeper) -> Self {
        self.housekeeper = Some(housekeeper);
        self
    }

    pub fn with_hatchery(mut self, hatchery: Hatchery) -> Self {
        self.hatchery = Some(hatchery);
        self
    }

    /// 设置事件推送通道（谈判器的事件需另行通过 CaptureNegotiator::with_event_tx 设置）
    pub fn with_event_tx(mut self, tx: broadcast::Sender<PatrolEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn phase(&self) -> PatrolPhase {
        self.phase
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    fn set_phase(&mut self, phase: PatrolPhase) {
        if self.phase != phase {
            tracing::debug!("Patrol phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
            send_event(self.event_tx.as_ref(), PatrolEvent::PhaseChanged { phase });
        }
    }

    /// 分步走到目标点，步与步之间节流；position 随之更新
    async fn walk_to(
        &self,
        session: &dyn GameSession,
        position: &mut Coordinate,
        target: &Coordinate,
        step_m: f64,
        supervisor: &SessionSupervisor,
    ) -> Result<(), PatrolError> {
        if distance(position, target) < 0.01 {
            return Ok(());
        }
        for (i, step) in walk_path(position, target, step_m).into_iter().enumerate() {
            if i > 0 {
                supervisor.checkpoint(self.config.step_delay).await?;
            }
            session.move_to(step).await?;
            *position = step;
        }
        Ok(())
    }

    /// 遭遇当前位置附近的生物，按排序逐个谈判
    async fn encounter_nearby(
        &mut self,
        session: &dyn GameSession,
        position: &mut Coordinate,
        supervisor: &SessionSupervisor,
        report: &mut CycleReport,
    ) -> Result<EncounterEnd, PatrolError> {
        *position = session.current_position().await?;
        let creatures = rank_creatures(session.nearby_creatures().await?, position);
        if creatures.is_empty() {
            return Ok(EncounterEnd::Done);
        }
        self.set_phase(PatrolPhase::Encountering);
        tracing::info!("{} creature(s) nearby", creatures.len());

        let token = supervisor.cancel_token();
        for creature in &creatures {
            self.walk_to(
                session,
                position,
                &creature.position,
                self.config.creature_step_m,
                supervisor,
            )
            .await?;
            report.creatures_encountered += 1;
            tracing::info!("Encountering {} (rarity {})", creature.label(), creature.rarity_score);

            let negotiation = self.negotiator.negotiate(session, creature, &token).await?;
            supervisor.checkpoint(self.config.interaction_delay).await?;

            match negotiation.outcome {
                CaptureOutcome::Captured => report.captured += 1,
                CaptureOutcome::AttemptsExhausted => report.abandoned += 1,
                CaptureOutcome::Fled => {
                    report.fled += 1;
                    tracing::warn!(
                        "Possible soft ban, pausing encounters for {:?}",
                        self.config.soft_ban_pause
                    );
                    supervisor.checkpoint(self.config.soft_ban_pause).await?;
                    return Ok(EncounterEnd::Done);
                }
                CaptureOutcome::ResourceExhausted => match self.config.resource_policy {
                    ResourcePolicy::Escalate => {
                        return Err(PatrolError::ResourceExhausted {
                            species_id: creature.species_id,
                        });
                    }
                    ResourcePolicy::SkipCreatures => {
                        tracing::warn!("Out of capture resources, skipping creatures this cycle");
                        return Ok(EncounterEnd::OutOfResources);
                    }
                },
            }
        }
        Ok(EncounterEnd::Done)
    }

    /// 激活路点：传输失败或非成功结果只记录，不在本轮重试；认证失败上抛
    async fn activate(
        &mut self,
        session: &dyn GameSession,
        waypoint: &Waypoint,
        report: &mut CycleReport,
    ) -> Result<(), PatrolError> {
        self.set_phase(PatrolPhase::Activating);
        let result = match session.activate_waypoint(waypoint).await {
            Ok(result) => Some(result),
            Err(SessionError::Auth(msg)) => return Err(PatrolError::AuthFault(msg)),
            Err(e) => {
                tracing::warn!("Activating waypoint {} failed: {}", waypoint.id, e);
                None
            }
        };
        match result {
            Some(ActivationResult::Success) => {
                report.waypoints_activated += 1;
                tracing::info!("Activated waypoint {}", waypoint.id);
            }
            Some(other) => tracing::info!("Waypoint {} not activated: {:?}", waypoint.id, other),
            None => {}
        }
        send_event(
            self.event_tx.as_ref(),
            PatrolEvent::WaypointActivated {
                waypoint_id: waypoint.id.clone(),
                result,
            },
        );
        Ok(())
    }

    /// 执行一轮巡逻
    pub async fn run_cycle(
        &mut self,
        session: &dyn GameSession,
        supervisor: &SessionSupervisor,
    ) -> Result<CycleReport, PatrolError> {
        self.cycles += 1;
        let mut report = CycleReport {
            cycle: self.cycles,
            ..CycleReport::default()
        };
        self.set_phase(PatrolPhase::Idle);

        if let Some(housekeeper) = &self.housekeeper {
            let recycled = housekeeper.run(session, self.event_tx.as_ref()).await?;
            report.items_recycled = recycled.iter().map(|(_, n)| *n).sum();
        }
        if let Some(hatchery) = &self.hatchery {
            let placed = hatchery.run(session, self.event_tx.as_ref()).await?;
            report.eggs_incubated = placed.len() as u32;
        }

        let mut position = session.current_position().await?;
        let stops: Vec<Waypoint> = session
            .nearby_waypoints()
            .await?
            .into_iter()
            .filter(|w| w.kind == WaypointKind::Stop)
            .collect();
        let waypoints = rank_waypoints(stops, &position);
        tracing::info!("Cycle {}: {} waypoint(s) to visit", self.cycles, waypoints.len());
        send_event(
            self.event_tx.as_ref(),
            PatrolEvent::CycleStarted {
                cycle: self.cycles,
                waypoints: waypoints.len(),
            },
        );

        let mut encounter = self.config.encounter_creatures;
        for waypoint in &waypoints {
            self.set_phase(PatrolPhase::Traveling);
            self.walk_to(
                session,
                &mut position,
                &waypoint.position,
                self.config.walk_step_m,
                supervisor,
            )
            .await?;
            report.waypoints_visited += 1;

            if encounter {
                let end = self
                    .encounter_nearby(session, &mut position, supervisor, &mut report)
                    .await?;
                if matches!(end, EncounterEnd::OutOfResources) {
                    report.resources_exhausted = true;
                    encounter = false;
                }
                // 遭遇时可能离开了路点，先走回去
                self.walk_to(
                    session,
                    &mut position,
                    &waypoint.position,
                    self.config.walk_step_m,
                    supervisor,
                )
                .await?;
            }

            self.activate(session, waypoint, &mut report).await?;
            self.set_phase(PatrolPhase::Idle);
            supervisor.checkpoint(self.config.waypoint_delay).await?;
        }

        send_event(
            self.event_tx.as_ref(),
            PatrolEvent::CycleFinished {
                cycle: self.cycles,
                captured: report.captured,
                activated: report.waypoints_activated,
            },
        );
        tracing::info!(
            "Cycle {} done: {} captured, {} fled, {} abandoned, {}/{} waypoint(s) activated",
            report.cycle,
            report.captured,
            report.fled,
            report.abandoned,
            report.waypoints_activated,
            report.waypoints_visited
        );
        Ok(report)
    }
}

#[async_trait]
impl UnitOfWork for PatrolOrchestrator {
    async fn run_unit(
        &mut self,
        session: &SessionHandle,
        supervisor: &SessionSupervisor,
    ) -> Result<(), PatrolError> {
        self.run_cycle(session.as_ref(), supervisor).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureConfig;
    use crate::config::HousekeepingSection;
    use crate::session::{SessionOp, SimulatedSession, SimulatedWorld};
    use crate::world::{CaptureStatus, ConsumableKind, Creature, DeviceKind, DeviceProbability};

    fn origin() -> Coordinate {
        Coordinate::new(40.0, -74.0)
    }

    fn at(dlat: f64) -> Coordinate {
        Coordinate::new(40.0 + dlat, -74.0)
    }

    fn stop(id: &str, dlat: f64) -> Waypoint {
        Waypoint {
            id: id.to_string(),
            position: at(dlat),
            kind: WaypointKind::Stop,
        }
    }

    fn creature(id: u32, rarity: f64, dlat: f64) -> Creature {
        Creature {
            species_id: id,
            name: None,
            rarity_score: rarity,
            position: at(dlat),
            encounter_id: Some(id as u64),
        }
    }

    fn fast_config() -> PatrolConfig {
        PatrolConfig {
            encounter_creatures: true,
            interaction_delay: Duration::ZERO,
            waypoint_delay: Duration::ZERO,
            walk_step_m: 0.0,
            creature_step_m: 0.0,
            step_delay: Duration::ZERO,
            soft_ban_pause: Duration::ZERO,
            resource_policy: ResourcePolicy::Escalate,
        }
    }

    fn orchestrator(config: PatrolConfig) -> PatrolOrchestrator {
        let negotiator = CaptureNegotiator::new(CaptureConfig {
            inter_round_delay: Duration::ZERO,
            ..CaptureConfig::default()
        });
        PatrolOrchestrator::new(config, negotiator)
    }

    fn world() -> SimulatedWorld {
        SimulatedSession::builder(origin())
            .with_waypoint(stop("far", 0.002))
            .with_waypoint(stop("near", 0.0005))
            .with_waypoint(Waypoint {
                id: "arena".to_string(),
                position: at(0.0001),
                kind: WaypointKind::Arena,
            })
    }

    #[tokio::test]
    async fn test_visits_stops_nearest_first_and_skips_arenas() {
        let session = world().build();
        let mut patrol = orchestrator(fast_config());
        let report = patrol
            .run_cycle(&session, &SessionSupervisor::new())
            .await
            .unwrap();

        assert_eq!(session.activated().await, vec!["near", "far"]);
        assert_eq!(report.waypoints_visited, 2);
        assert_eq!(report.waypoints_activated, 2);
        assert_eq!(session.position().await, at(0.002));
        assert_eq!(patrol.phase(), PatrolPhase::Idle);
    }

    #[tokio::test]
    async fn test_captures_in_rarity_order() {
        let session = world()
            .with_creature(creature(16, 1.0, 0.0005))
            .with_creature(creature(147, 8.0, 0.0006))
            .with_device(DeviceKind::Ultra, 10)
            .build();
        let (tx, mut rx) = broadcast::channel(64);
        let mut patrol = orchestrator(fast_config()).with_event_tx(tx);

        let report = patrol
            .run_cycle(&session, &SessionSupervisor::new())
            .await
            .unwrap();
        assert_eq!(report.captured, 2);
        assert_eq!(report.creatures_encountered, 2);

        let mut phases = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if let PatrolEvent::PhaseChanged { phase } = ev {
                phases.push(phase);
            }
        }
        assert_eq!(
            phases[..4],
            [
                PatrolPhase::Traveling,
                PatrolPhase::Encountering,
                PatrolPhase::Activating,
                PatrolPhase::Idle,
            ]
        );
    }

    #[tokio::test]
    async fn test_walks_in_steps() {
        let session = SimulatedSession::builder(origin())
            .with_waypoint(stop("s", 0.0001))
            .build();
        let config = PatrolConfig {
            walk_step_m: 3.2,
            ..fast_config()
        };
        orchestrator(config)
            .run_cycle(&session, &SessionSupervisor::new())
            .await
            .unwrap();

        // 约 11.1 米，3.2 米一步 -> 4 步
        assert_eq!(session.call_count(SessionOp::Move).await, 4);
        assert_eq!(session.position().await, at(0.0001));
    }

    #[tokio::test]
    async fn test_activation_failure_does_not_abort_cycle() {
        let session = world().build();
        session
            .fail_next(SessionOp::Activate, SessionError::Transport("503".to_string()))
            .await;

        let report = orchestrator(fast_config())
            .run_cycle(&session, &SessionSupervisor::new())
            .await
            .unwrap();
        assert_eq!(report.waypoints_visited, 2);
        assert_eq!(report.waypoints_activated, 1);
        assert_eq!(session.activated().await, vec!["far"]);
        assert_eq!(session.call_count(SessionOp::Activate).await, 2);
    }

    #[tokio::test]
    async fn test_activation_auth_failure_propagates() {
        let session = world().build();
        session
            .fail_next(SessionOp::Activate, SessionError::Auth("expired".to_string()))
            .await;

        let err = orchestrator(fast_config())
            .run_cycle(&session, &SessionSupervisor::new())
            .await
            .unwrap_err();
        assert_eq!(err, PatrolError::AuthFault("expired".to_string()));
    }

    #[tokio::test]
    async fn test_non_success_activation_is_reported() {
        let session = world()
            .with_activation_result(ActivationResult::InCooldown)
            .build();
        let report = orchestrator(fast_config())
            .run_cycle(&session, &SessionSupervisor::new())
            .await
            .unwrap();
        assert_eq!(report.waypoints_activated, 0);
        assert_eq!(report.waypoints_visited, 2);
    }

    #[tokio::test]
    async fn test_resource_exhausted_escalates_by_default() {
        let session = world().with_creature(creature(19, 1.0, 0.0005)).build();
        let err = orchestrator(fast_config())
            .run_cycle(&session, &SessionSupervisor::new())
            .await
            .unwrap_err();
        assert_eq!(err, PatrolError::ResourceExhausted { species_id: 19 });
    }

    #[tokio::test]
    async fn test_resource_exhausted_skip_keeps_activating() {
        let session = world().with_creature(creature(19, 1.0, 0.0005)).build();
        let config = PatrolConfig {
            resource_policy: ResourcePolicy::SkipCreatures,
            ..fast_config()
        };
        let report = orchestrator(config)
            .run_cycle(&session, &SessionSupervisor::new())
            .await
            .unwrap();
        assert!(report.resources_exhausted);
        assert_eq!(report.waypoints_activated, 2);
        // 第二个路点不再遭遇
        assert_eq!(session.call_count(SessionOp::Creatures).await, 1);
    }

    #[tokio::test]
    async fn test_fled_skips_remaining_creatures_at_waypoint() {
        let session = SimulatedSession::builder(origin())
            .with_waypoint(stop("only", 0.0005))
            .with_creature(creature(1, 5.0, 0.0005))
            .with_creature(creature(2, 3.0, 0.0005))
            .with_device(DeviceKind::Ultra, 10)
            .with_capture_script([CaptureStatus::Fled])
            .build();

        let report = orchestrator(fast_config())
            .run_cycle(&session, &SessionSupervisor::new())
            .await
            .unwrap();
        assert_eq!(report.fled, 1);
        assert_eq!(report.creatures_encountered, 1);
        assert_eq!(report.waypoints_activated, 1);
    }

    #[tokio::test]
    async fn test_attempts_exhausted_abandons_target() {
        let session = SimulatedSession::builder(origin())
            .with_waypoint(stop("only", 0.0005))
            .with_creature(creature(1, 5.0, 0.0005))
            .with_probabilities(vec![DeviceProbability {
                device: DeviceKind::Basic,
                probability: 0.9,
            }])
            .with_device(DeviceKind::Basic, 10)
            .with_consumable(ConsumableKind::AssistBerry, 1)
            .with_default_status(CaptureStatus::Missed)
            .build();

        let report = orchestrator(fast_config())
            .run_cycle(&session, &SessionSupervisor::new())
            .await
            .unwrap();
        assert_eq!(report.abandoned, 1);
        assert_eq!(session.throws().await.len(), 5);
    }

    #[tokio::test]
    async fn test_transport_fault_propagates() {
        let session = world().build();
        session
            .fail_next(SessionOp::Waypoints, SessionError::Transport("reset".to_string()))
            .await;
        let err = orchestrator(fast_config())
            .run_cycle(&session, &SessionSupervisor::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PatrolError::Transport(_)));
    }

    #[tokio::test]
    async fn test_housekeeping_runs_before_cycle() {
        let session = world().with_device(DeviceKind::Basic, 70).build();
        let mut section = HousekeepingSection::default();
        section.enabled = true;
        let mut patrol = orchestrator(fast_config())
            .with_housekeeper(Housekeeper::from_section(&section).unwrap());

        let report = patrol
            .run_cycle(&session, &SessionSupervisor::new())
            .await
            .unwrap();
        assert_eq!(report.items_recycled, 20);
        assert_eq!(session.inventory().await.device_count(DeviceKind::Basic), 50);
    }

    #[tokio::test]
    async fn test_eggs_incubated_before_cycle() {
        let session = world()
            .with_incubator("inc-1")
            .with_egg(3, 5.0)
            .with_egg(4, 2.0)
            .build();
        let mut patrol = orchestrator(fast_config()).with_hatchery(Hatchery);

        let report = patrol
            .run_cycle(&session, &SessionSupervisor::new())
            .await
            .unwrap();
        assert_eq!(report.eggs_incubated, 1);
        assert_eq!(session.incubated().await, vec![("inc-1".to_string(), 3)]);

        // 孵化器已占用，下一轮不再放蛋
        let report = patrol
            .run_cycle(&session, &SessionSupervisor::new())
            .await
            .unwrap();
        assert_eq!(report.eggs_incubated, 0);
    }

    #[tokio::test]
    async fn test_cancel_stops_between_waypoints() {
        let session = world().build();
        let config = PatrolConfig {
            waypoint_delay: Duration::from_secs(60),
            ..fast_config()
        };
        let supervisor = SessionSupervisor::new();
        let token = supervisor.cancel_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let res = tokio::time::timeout(
            Duration::from_secs(5),
            orchestrator(config).run_cycle(&session, &supervisor),
        )
        .await
        .expect("cycle should stop promptly");
        assert_eq!(res, Err(PatrolError::Cancelled));
        assert_eq!(session.activated().await, vec!["near"]);
    }
}
