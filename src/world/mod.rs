//! 领域模型：坐标、生物、路点、道具与背包快照
//!
//! 服务端消息在接入层一次性解析为这里的强类型值；之后各模块只读这些快照，不做字段探测。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 经纬度坐标（海拔可选，距离计算忽略海拔）
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub altitude: Option<f64>,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
        }
    }
}

/// 野生生物快照
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Creature {
    pub species_id: u32,
    pub name: Option<String>,
    /// 静态稀有度权重，仅用于相对比较
    pub rarity_score: f64,
    pub position: Coordinate,
    pub encounter_id: Option<u64>,
}

impl Creature {
    /// 日志用名称：有名称用名称，否则用 `#<species_id>`
    pub fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("#{}", self.species_id))
    }
}

/// 路点类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaypointKind {
    /// 可激活的补给站
    Stop,
    /// 道馆，巡逻不处理
    Arena,
}

/// 路点快照
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Waypoint {
    pub id: String,
    pub position: Coordinate,
    pub kind: WaypointKind,
}

/// 地图查询得到的实体（生物或路点）
#[derive(Clone, Debug, PartialEq)]
pub enum DiscoveredEntity {
    Creature(Creature),
    Waypoint(Waypoint),
}

/// 捕捉装置，派生顺序即强度顺序（Basic 最弱）
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Basic,
    Great,
    Ultra,
    Master,
}

/// 消耗品
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumableKind {
    /// 捕捉辅助（提升当前目标的捕获概率）
    AssistBerry,
    Potion,
    SuperPotion,
    Revive,
}

impl ConsumableKind {
    pub fn is_assist(&self) -> bool {
        matches!(self, ConsumableKind::AssistBerry)
    }
}

/// 背包中的任意道具
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Device(DeviceKind),
    Consumable(ConsumableKind),
}

/// 背包中的蛋
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Egg {
    pub id: u64,
    /// 孵化所需步行距离（公里）
    pub km_target: f64,
    /// 已放入的孵化器
    pub incubator_id: Option<String>,
}

/// 孵化器
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Incubator {
    pub id: String,
    pub egg_id: Option<u64>,
}

impl Incubator {
    pub fn is_free(&self) -> bool {
        self.egg_id.is_none()
    }
}

/// 背包只读快照：一次谈判中每轮重新拉取
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InventorySnapshot {
    pub devices: BTreeMap<DeviceKind, u32>,
    pub consumables: BTreeMap<ConsumableKind, u32>,
    pub eggs: Vec<Egg>,
    pub incubators: Vec<Incubator>,
}

impl InventorySnapshot {
    pub fn device_count(&self, kind: DeviceKind) -> u32 {
        self.devices.get(&kind).copied().unwrap_or(0)
    }

    pub fn consumable_count(&self, kind: ConsumableKind) -> u32 {
        self.consumables.get(&kind).copied().unwrap_or(0)
    }

    /// 所有数量大于 0 的道具
    pub fn items(&self) -> impl Iterator<Item = (ItemKind, u32)> + '_ {
        let devices = self
            .devices
            .iter()
            .map(|(k, n)| (ItemKind::Device(*k), *n));
        let consumables = self
            .consumables
            .iter()
            .map(|(k, n)| (ItemKind::Consumable(*k), *n));
        devices.chain(consumables).filter(|(_, n)| *n > 0)
    }
}

/// 服务端给出的单个装置捕获概率（按服务端顺序，视为由弱到强）
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DeviceProbability {
    pub device: DeviceKind,
    pub probability: f64,
}

/// 单次投掷的服务端状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStatus {
    Captured,
    Missed,
    /// 逃跑，也可能是软封禁信号
    Fled,
}

impl CaptureStatus {
    /// 服务端原始状态码：1 = 捕获，3 = 逃跑，其余（挣脱、未命中、未设置）一律视为未命中
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => CaptureStatus::Captured,
            3 => CaptureStatus::Fled,
            _ => CaptureStatus::Missed,
        }
    }
}

/// 放蛋结果
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncubationResult {
    Success,
    /// 孵化器已被占用
    IncubatorInUse,
    /// 蛋已在别的孵化器里
    EggAlreadyIncubating,
}

/// 路点激活结果
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationResult {
    Success,
    OutOfRange,
    InCooldown,
    InventoryFull,
}
