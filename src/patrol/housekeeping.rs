//! 背包整理：丢弃不需要的消耗品，并把装置/辅助道具削减到保留上限

use std::collections::BTreeMap;

use tokio::sync::broadcast;

use crate::config::HousekeepingSection;
use crate::core::PatrolError;
use crate::patrol::{send_event, PatrolEvent};
use crate::session::GameSession;
use crate::world::{ConsumableKind, DeviceKind, InventorySnapshot, ItemKind};

/// 背包整理策略
#[derive(Debug, Clone, Default)]
pub struct Housekeeper {
    discard: Vec<ConsumableKind>,
    device_limits: BTreeMap<DeviceKind, u32>,
    consumable_limits: BTreeMap<ConsumableKind, u32>,
}

impl Housekeeper {
    /// 配置未启用时返回 None
    pub fn from_section(section: &HousekeepingSection) -> Option<Self> {
        section.enabled.then(|| Self {
            discard: section.discard.clone(),
            device_limits: section.device_limits.clone(),
            consumable_limits: section.consumable_limits.clone(),
        })
    }

    /// 计算需要丢弃的道具与数量（纯函数）
    pub fn plan(&self, inventory: &InventorySnapshot) -> Vec<(ItemKind, u32)> {
        inventory
            .items()
            .filter_map(|(item, count)| {
                let keep = match item {
                    ItemKind::Consumable(c) if self.discard.contains(&c) => 0,
                    ItemKind::Consumable(c) => *self.consumable_limits.get(&c)?,
                    ItemKind::Device(d) => *self.device_limits.get(&d)?,
                };
                (count > keep).then(|| (item, count - keep))
            })
            .collect()
    }

    /// 按计划丢弃，返回实际丢弃的道具
    pub async fn run(
        &self,
        session: &dyn GameSession,
        event_tx: Option<&broadcast::Sender<PatrolEvent>>,
    ) -> Result<Vec<(ItemKind, u32)>, PatrolError> {
        let inventory = session.get_inventory().await?;
        let plan = self.plan(&inventory);
        for (item, count) in &plan {
            tracing::info!("Recycling {} x {:?}", count, item);
            session.recycle_item(*item, *count).await?;
            send_event(
                event_tx,
                PatrolEvent::ItemsRecycled {
                    item: *item,
                    count: *count,
                },
            );
        }
        Ok(plan)
    }
}
