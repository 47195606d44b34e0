//! 孵蛋：把还没放进孵化器的蛋放进空闲孵化器

use tokio::sync::broadcast;

use crate::config::IncubationSection;
use crate::core::PatrolError;
use crate::patrol::{send_event, PatrolEvent};
use crate::session::GameSession;
use crate::world::{Egg, IncubationResult, Incubator, InventorySnapshot};

#[derive(Debug, Clone, Default)]
pub struct Hatchery;

impl Hatchery {
    /// 配置未启用时返回 None
    pub fn from_section(section: &IncubationSection) -> Option<Self> {
        section.enabled.then_some(Self)
    }

    /// 空闲孵化器与待孵的蛋按背包顺序一一配对
    pub fn plan(&self, inventory: &InventorySnapshot) -> Vec<(Incubator, Egg)> {
        let free = inventory.incubators.iter().filter(|i| i.is_free());
        let waiting = inventory.eggs.iter().filter(|e| e.incubator_id.is_none());
        free.zip(waiting)
            .map(|(i, e)| (i.clone(), e.clone()))
            .collect()
    }

    /// 按计划放蛋，返回成功放入的 (孵化器, 蛋) 对
    pub async fn run(
        &self,
        session: &dyn GameSession,
        event_tx: Option<&broadcast::Sender<PatrolEvent>>,
    ) -> Result<Vec<(String, u64)>, PatrolError> {
        let inventory = session.get_inventory().await?;
        let mut placed = Vec::new();
        for (incubator, egg) in self.plan(&inventory) {
            match session.assign_egg(&incubator, &egg).await? {
                IncubationResult::Success => {
                    tracing::info!(
                        "Egg {} ({}km) placed in {}",
                        egg.id,
                        egg.km_target,
                        incubator.id
                    );
                    send_event(
                        event_tx,
                        PatrolEvent::EggIncubated {
                            incubator_id: incubator.id.clone(),
                            egg_id: egg.id,
                        },
                    );
                    placed.push((incubator.id, egg.id));
                }
                // 快照过期：孵化器或蛋已被占用，下一轮重新配对
                other => tracing::debug!("Egg {} not placed in {}: {:?}", egg.id, incubator.id, other),
            }
        }
        Ok(placed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionError, SessionOp, SimulatedSession};
    use crate::world::Coordinate;

    fn egg(id: u64, incubator_id: Option<&str>) -> Egg {
        Egg {
            id,
            km_target: 2.0,
            incubator_id: incubator_id.map(str::to_string),
        }
    }

    fn incubator(id: &str, egg_id: Option<u64>) -> Incubator {
        Incubator {
            id: id.to_string(),
            egg_id,
        }
    }

    #[test]
    fn test_disabled_section_yields_none() {
        let section = IncubationSection { enabled: false };
        assert!(Hatchery::from_section(&section).is_none());
        assert!(Hatchery::from_section(&IncubationSection::default()).is_some());
    }

    #[test]
    fn test_plan_pairs_free_incubators_with_waiting_eggs() {
        let mut inv = InventorySnapshot::default();
        inv.incubators = vec![
            incubator("busy", Some(1)),
            incubator("a", None),
            incubator("b", None),
        ];
        inv.eggs = vec![egg(1, Some("busy")), egg(2, None)];

        let plan = Hatchery.plan(&inv);
        assert_eq!(plan, vec![(incubator("a", None), egg(2, None))]);
    }

    #[test]
    fn test_plan_empty_without_incubators() {
        let mut inv = InventorySnapshot::default();
        inv.eggs = vec![egg(1, None)];
        assert!(Hatchery.plan(&inv).is_empty());
    }

    #[tokio::test]
    async fn test_run_places_eggs_and_emits_events() {
        let session = SimulatedSession::builder(Coordinate::new(0.0, 0.0))
            .with_incubator("inc-1")
            .with_incubator("inc-2")
            .with_egg(7, 5.0)
            .with_egg(8, 10.0)
            .with_egg(9, 2.0)
            .build();
        let (tx, mut rx) = broadcast::channel(16);

        let placed = Hatchery.run(&session, Some(&tx)).await.unwrap();
        assert_eq!(
            placed,
            vec![("inc-1".to_string(), 7), ("inc-2".to_string(), 8)]
        );
        assert_eq!(session.incubated().await, placed);

        let inv = session.inventory().await;
        assert!(inv.incubators.iter().all(|i| !i.is_free()));
        assert_eq!(inv.eggs[2].incubator_id, None);

        let mut seen = Vec::new();
        while let Ok(PatrolEvent::EggIncubated { egg_id, .. }) = rx.try_recv() {
            seen.push(egg_id);
        }
        assert_eq!(seen, vec![7, 8]);

        // 孵化器都满了，再跑一次什么也不做
        assert!(Hatchery.run(&session, None).await.unwrap().is_empty());
        assert_eq!(session.call_count(SessionOp::Incubate).await, 2);
    }

    #[tokio::test]
    async fn test_occupied_incubator_is_reported() {
        let session = SimulatedSession::builder(Coordinate::new(0.0, 0.0))
            .with_incubator("inc-1")
            .with_egg(1, 2.0)
            .with_egg(2, 5.0)
            .build();
        let slot = incubator("inc-1", None);
        let first = session.assign_egg(&slot, &egg(1, None)).await.unwrap();
        let second = session.assign_egg(&slot, &egg(2, None)).await.unwrap();
        assert_eq!(first, IncubationResult::Success);
        assert_eq!(second, IncubationResult::IncubatorInUse);
    }

    #[tokio::test]
    async fn test_run_propagates_session_errors() {
        let session = SimulatedSession::builder(Coordinate::new(0.0, 0.0))
            .with_incubator("inc-1")
            .with_egg(1, 2.0)
            .build();
        session
            .fail_next(SessionOp::Incubate, SessionError::Auth("expired".to_string()))
            .await;

        let err = Hatchery.run(&session, None).await.unwrap_err();
        assert!(matches!(err, PatrolError::AuthFault(_)));
        assert!(session.incubated().await.is_empty());
    }
}
