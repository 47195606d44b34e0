//! 模拟会话（用于测试与演示，无需真实服务）
//!
//! 内存中维护位置、路点、生物、背包与捕获概率；可脚本化投掷结果，并按操作注入故障。
//! 重新认证后的新句柄共享同一个世界状态，只更换会话 ID。

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::session::{Authenticator, GameSession, SessionError, SessionHandle};
use crate::world::{
    ActivationResult, CaptureStatus, ConsumableKind, Coordinate, Creature, DeviceKind,
    DeviceProbability, Egg, IncubationResult, Incubator, InventorySnapshot, ItemKind, Waypoint,
    WaypointKind,
};

/// 会话操作类型（故障注入与调用统计的键）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionOp {
    Position,
    Move,
    Waypoints,
    Creatures,
    Encounter,
    Probabilities,
    Capture,
    Consumable,
    Activate,
    Inventory,
    Recycle,
    Incubate,
}

#[derive(Debug)]
struct WorldState {
    position: Coordinate,
    waypoints: Vec<Waypoint>,
    creatures: Vec<Creature>,
    inventory: InventorySnapshot,
    probabilities: Vec<DeviceProbability>,
    /// 每个辅助道具带来的概率加成
    assist_bonus: f64,
    /// 当前遭遇已累计的加成
    boost: f64,
    capture_script: VecDeque<CaptureStatus>,
    default_status: CaptureStatus,
    activation_result: ActivationResult,
    stop_reward: Vec<(DeviceKind, u32)>,
    faults: HashMap<SessionOp, VecDeque<SessionError>>,
    calls: HashMap<SessionOp, usize>,
    throws: Vec<DeviceKind>,
    consumables_used: Vec<ConsumableKind>,
    activated: Vec<String>,
    recycled: Vec<(ItemKind, u32)>,
    incubated: Vec<(String, u64)>,
}

impl WorldState {
    fn enter(&mut self, op: SessionOp) -> Result<(), SessionError> {
        *self.calls.entry(op).or_insert(0) += 1;
        match self.faults.get_mut(&op).and_then(|q| q.pop_front()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn boosted_probabilities(&self) -> Vec<DeviceProbability> {
        self.probabilities
            .iter()
            .map(|p| DeviceProbability {
                device: p.device,
                probability: (p.probability + self.boost).min(1.0),
            })
            .collect()
    }
}

/// 内存模拟的游戏会话
#[derive(Clone)]
pub struct SimulatedSession {
    id: String,
    world: Arc<Mutex<WorldState>>,
}

/// 模拟世界构建器：在共享之前设置初始状态
pub struct SimulatedWorld {
    state: WorldState,
}

impl SimulatedWorld {
    pub fn with_waypoint(mut self, waypoint: Waypoint) -> Self {
        self.state.waypoints.push(waypoint);
        self
    }

    pub fn with_creature(mut self, creature: Creature) -> Self {
        self.state.creatures.push(creature);
        self
    }

    pub fn with_device(mut self, kind: DeviceKind, count: u32) -> Self {
        self.state.inventory.devices.insert(kind, count);
        self
    }

    pub fn with_consumable(mut self, kind: ConsumableKind, count: u32) -> Self {
        self.state.inventory.consumables.insert(kind, count);
        self
    }

    /// 覆盖服务端返回的装置概率（顺序即服务端顺序）
    pub fn with_probabilities(mut self, probabilities: Vec<DeviceProbability>) -> Self {
        self.state.probabilities = probabilities;
        self
    }

    pub fn with_assist_bonus(mut self, bonus: f64) -> Self {
        self.state.assist_bonus = bonus;
        self
    }

    pub fn with_egg(mut self, id: u64, km_target: f64) -> Self {
        self.state.inventory.eggs.push(Egg {
            id,
            km_target,
            incubator_id: None,
        });
        self
    }

    pub fn with_incubator(mut self, id: &str) -> Self {
        self.state.inventory.incubators.push(Incubator {
            id: id.to_string(),
            egg_id: None,
        });
        self
    }

    /// 依次返回的投掷结果；脚本耗尽后返回 default_status
    pub fn with_capture_script(mut self, statuses: impl IntoIterator<Item = CaptureStatus>) -> Self {
        self.state.capture_script.extend(statuses);
        self
    }

    pub fn with_default_status(mut self, status: CaptureStatus) -> Self {
        self.state.default_status = status;
        self
    }

    pub fn with_activation_result(mut self, result: ActivationResult) -> Self {
        self.state.activation_result = result;
        self
    }

    /// 激活补给站成功时获得的装置
    pub fn with_stop_reward(mut self, kind: DeviceKind, count: u32) -> Self {
        self.state.stop_reward.push((kind, count));
        self
    }

    pub fn build(self) -> SimulatedSession {
        SimulatedSession {
            id: Uuid::new_v4().to_string(),
            world: Arc::new(Mutex::new(self.state)),
        }
    }
}

impl SimulatedSession {
    pub fn builder(position: Coordinate) -> SimulatedWorld {
        SimulatedWorld {
            state: WorldState {
                position,
                waypoints: Vec::new(),
                creatures: Vec::new(),
                inventory: InventorySnapshot::default(),
                probabilities: vec![
                    DeviceProbability { device: DeviceKind::Basic, probability: 0.3 },
                    DeviceProbability { device: DeviceKind::Great, probability: 0.5 },
                    DeviceProbability { device: DeviceKind::Ultra, probability: 0.7 },
                ],
                assist_bonus: 0.1,
                boost: 0.0,
                capture_script: VecDeque::new(),
                default_status: CaptureStatus::Captured,
                activation_result: ActivationResult::Success,
                stop_reward: Vec::new(),
                faults: HashMap::new(),
                calls: HashMap::new(),
                throws: Vec::new(),
                consumables_used: Vec::new(),
                activated: Vec::new(),
                recycled: Vec::new(),
                incubated: Vec::new(),
            },
        }
    }

    /// 演示世界：起点附近的若干补给站与生物
    pub fn demo(origin: Coordinate) -> Self {
        let offset =
            |dlat: f64, dlng: f64| Coordinate::new(origin.latitude + dlat, origin.longitude + dlng);
        let species: [(u32, &str, f64); 5] = [
            (16, "Pidgey", 1.0),
            (19, "Rattata", 1.0),
            (25, "Pikachu", 6.0),
            (133, "Eevee", 5.0),
            (147, "Dratini", 8.0),
        ];

        let mut world = Self::builder(origin)
            .with_device(DeviceKind::Basic, 20)
            .with_device(DeviceKind::Great, 5)
            .with_consumable(ConsumableKind::AssistBerry, 3)
            .with_consumable(ConsumableKind::Potion, 4)
            .with_stop_reward(DeviceKind::Basic, 3)
            .with_incubator("incubator-unlimited")
            .with_egg(1, 2.0)
            .with_egg(2, 5.0)
            .with_capture_script([CaptureStatus::Missed, CaptureStatus::Captured]);

        for (i, (dlat, dlng)) in [(0.0004, 0.0002), (-0.0003, 0.0005), (0.0007, -0.0004)]
            .into_iter()
            .enumerate()
        {
            world = world.with_waypoint(Waypoint {
                id: format!("stop-{}", i + 1),
                position: offset(dlat, dlng),
                kind: WaypointKind::Stop,
            });
        }
        world = world.with_waypoint(Waypoint {
            id: "arena-1".to_string(),
            position: offset(0.0001, 0.0001),
            kind: WaypointKind::Arena,
        });

        for (i, (id, name, rarity)) in species.into_iter().enumerate() {
            let step = i as f64 * 0.0001;
            world = world.with_creature(Creature {
                species_id: id,
                name: Some(name.to_string()),
                rarity_score: rarity,
                position: offset(step, -step),
                encounter_id: Some(1000 + i as u64),
            });
        }
        world.build()
    }

    /// 让某个操作的下一次调用失败（可多次调用排队）
    pub async fn fail_next(&self, op: SessionOp, err: SessionError) {
        self.world
            .lock()
            .await
            .faults
            .entry(op)
            .or_default()
            .push_back(err);
    }

    pub async fn call_count(&self, op: SessionOp) -> usize {
        self.world.lock().await.calls.get(&op).copied().unwrap_or(0)
    }

    pub async fn throws(&self) -> Vec<DeviceKind> {
        self.world.lock().await.throws.clone()
    }

    pub async fn consumables_used(&self) -> Vec<ConsumableKind> {
        self.world.lock().await.consumables_used.clone()
    }

    pub async fn activated(&self) -> Vec<String> {
        self.world.lock().await.activated.clone()
    }

    pub async fn recycled(&self) -> Vec<(ItemKind, u32)> {
        self.world.lock().await.recycled.clone()
    }

    /// 成功放入的 (孵化器, 蛋)
    pub async fn incubated(&self) -> Vec<(String, u64)> {
        self.world.lock().await.incubated.clone()
    }

    pub async fn position(&self) -> Coordinate {
        self.world.lock().await.position
    }

    pub async fn inventory(&self) -> InventorySnapshot {
        self.world.lock().await.inventory.clone()
    }

    /// 同一世界的新会话（模拟重新登录）
    fn relogin(&self) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            world: Arc::clone(&self.world),
        }
    }
}

#[async_trait]
impl GameSession for SimulatedSession {
    fn session_id(&self) -> String {
        self.id.clone()
    }

    async fn current_position(&self) -> Result<Coordinate, SessionError> {
        let mut w = self.world.lock().await;
        w.enter(SessionOp::Position)?;
        Ok(w.position)
    }

    async fn move_to(&self, position: Coordinate) -> Result<(), SessionError> {
        let mut w = self.world.lock().await;
        w.enter(SessionOp::Move)?;
        w.position = position;
        Ok(())
    }

    async fn nearby_waypoints(&self) -> Result<Vec<Waypoint>, SessionError> {
        let mut w = self.world.lock().await;
        w.enter(SessionOp::Waypoints)?;
        Ok(w.waypoints.clone())
    }

    async fn nearby_creatures(&self) -> Result<Vec<Creature>, SessionError> {
        let mut w = self.world.lock().await;
        w.enter(SessionOp::Creatures)?;
        Ok(w.creatures.clone())
    }

    async fn begin_encounter(
        &self,
        creature: &Creature,
    ) -> Result<Vec<DeviceProbability>, SessionError> {
        let mut w = self.world.lock().await;
        w.enter(SessionOp::Encounter)?;
        if !w.creatures.iter().any(|c| c == creature) {
            return Err(SessionError::Protocol(format!(
                "encounter {} not found",
                creature.label()
            )));
        }
        w.boost = 0.0;
        Ok(w.boosted_probabilities())
    }

    async fn capture_probabilities(
        &self,
        _creature: &Creature,
    ) -> Result<Vec<DeviceProbability>, SessionError> {
        let mut w = self.world.lock().await;
        w.enter(SessionOp::Probabilities)?;
        Ok(w.boosted_probabilities())
    }

    async fn attempt_capture(
        &self,
        creature: &Creature,
        device: DeviceKind,
    ) -> Result<CaptureStatus, SessionError> {
        let mut w = self.world.lock().await;
        w.enter(SessionOp::Capture)?;
        let count = w.inventory.devices.entry(device).or_insert(0);
        if *count == 0 {
            return Err(SessionError::Protocol(format!("no {device:?} left")));
        }
        *count -= 1;
        w.throws.push(device);

        let status = match w.capture_script.pop_front() {
            Some(s) => s,
            None => w.default_status,
        };
        if status != CaptureStatus::Missed {
            w.creatures.retain(|c| c != creature);
        }
        Ok(status)
    }

    async fn use_consumable(
        &self,
        kind: ConsumableKind,
        _creature: &Creature,
    ) -> Result<(), SessionError> {
        let mut w = self.world.lock().await;
        w.enter(SessionOp::Consumable)?;
        let count = w.inventory.consumables.entry(kind).or_insert(0);
        if *count == 0 {
            return Err(SessionError::Protocol(format!("no {kind:?} left")));
        }
        *count -= 1;
        w.consumables_used.push(kind);
        if kind.is_assist() {
            w.boost += w.assist_bonus;
        }
        Ok(())
    }

    async fn activate_waypoint(
        &self,
        waypoint: &Waypoint,
    ) -> Result<ActivationResult, SessionError> {
        let mut w = self.world.lock().await;
        w.enter(SessionOp::Activate)?;
        let result = w.activation_result;
        if result == ActivationResult::Success {
            w.activated.push(waypoint.id.clone());
            let reward = w.stop_reward.clone();
            for (kind, n) in reward {
                *w.inventory.devices.entry(kind).or_insert(0) += n;
            }
        }
        Ok(result)
    }

    async fn get_inventory(&self) -> Result<InventorySnapshot, SessionError> {
        let mut w = self.world.lock().await;
        w.enter(SessionOp::Inventory)?;
        Ok(w.inventory.clone())
    }

    async fn recycle_item(&self, item: ItemKind, count: u32) -> Result<(), SessionError> {
        let mut w = self.world.lock().await;
        w.enter(SessionOp::Recycle)?;
        let slot = match item {
            ItemKind::Device(d) => w.inventory.devices.entry(d).or_insert(0),
            ItemKind::Consumable(c) => w.inventory.consumables.entry(c).or_insert(0),
        };
        *slot = slot.saturating_sub(count);
        w.recycled.push((item, count));
        Ok(())
    }

    async fn assign_egg(
        &self,
        incubator: &Incubator,
        egg: &Egg,
    ) -> Result<IncubationResult, SessionError> {
        let mut w = self.world.lock().await;
        w.enter(SessionOp::Incubate)?;
        let inv = &mut w.inventory;
        let slot = inv
            .incubators
            .iter()
            .position(|i| i.id == incubator.id)
            .ok_or_else(|| SessionError::Protocol(format!("incubator {} not found", incubator.id)))?;
        let held = inv
            .eggs
            .iter()
            .position(|e| e.id == egg.id)
            .ok_or_else(|| SessionError::Protocol(format!("egg {} not found", egg.id)))?;

        if !inv.incubators[slot].is_free() {
            return Ok(IncubationResult::IncubatorInUse);
        }
        if inv.eggs[held].incubator_id.is_some() {
            return Ok(IncubationResult::EggAlreadyIncubating);
        }
        inv.incubators[slot].egg_id = Some(egg.id);
        inv.eggs[held].incubator_id = Some(incubator.id.clone());
        w.incubated.push((incubator.id.clone(), egg.id));
        Ok(IncubationResult::Success)
    }
}

/// 模拟认证器：返回共享同一世界的新会话；可排队若干次失败
pub struct SimulatedAuthenticator {
    session: SimulatedSession,
    failures: Mutex<VecDeque<SessionError>>,
    attempts: Mutex<usize>,
}

impl SimulatedAuthenticator {
    pub fn new(session: &SimulatedSession) -> Self {
        Self {
            session: session.clone(),
            failures: Mutex::new(VecDeque::new()),
            attempts: Mutex::new(0),
        }
    }

    /// 接下来的 n 次重新认证失败
    pub fn failing_times(self, n: usize) -> Self {
        let failures = (0..n)
            .map(|i| SessionError::Auth(format!("login rejected ({})", i + 1)))
            .collect();
        Self {
            failures: Mutex::new(failures),
            ..self
        }
    }

    pub async fn attempts(&self) -> usize {
        *self.attempts.lock().await
    }
}

#[async_trait]
impl Authenticator for SimulatedAuthenticator {
    async fn reauthenticate(
        &self,
        previous: &SessionHandle,
    ) -> Result<SessionHandle, SessionError> {
        *self.attempts.lock().await += 1;
        if let Some(err) = self.failures.lock().await.pop_front() {
            return Err(err);
        }
        let next = self.session.relogin();
        tracing::debug!(
            "Simulated re-login: {} -> {}",
            previous.session_id(),
            next.session_id()
        );
        Ok(Arc::new(next))
    }
}
