//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `PATROL__*` 覆盖（双下划线表示嵌套，如 `PATROL__CAPTURE__THRESHOLD=0.7`）。

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::core::PatrolError;
use crate::geo::MIN_STEP_M;
use crate::world::{ConsumableKind, DeviceKind};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub capture: CaptureSection,
    pub patrol: PatrolSection,
    pub resilience: ResilienceSection,
    pub housekeeping: HousekeepingSection,
    pub incubation: IncubationSection,
}

/// [capture] 段：捕捉谈判参数
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureSection {
    /// 装置达标阈值，取值 [0, 1]
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// 单个目标最多投掷次数
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_inter_round_delay_ms")]
    pub inter_round_delay_ms: u64,
}

fn default_threshold() -> f64 {
    0.5
}

fn default_max_attempts() -> u32 {
    5
}

fn default_inter_round_delay_ms() -> u64 {
    2000
}

impl Default for CaptureSection {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            max_attempts: default_max_attempts(),
            inter_round_delay_ms: default_inter_round_delay_ms(),
        }
    }
}

/// 没有可用捕捉资源时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourcePolicy {
    /// 上抛给 ResilientSession（冷却 + 重新认证）
    Escalate,
    /// 本轮剩余时间只激活路点补给，不再遭遇生物
    SkipCreatures,
}

/// [patrol] 段：节流、行走与软封禁处理
#[derive(Debug, Clone, Deserialize)]
pub struct PatrolSection {
    /// 是否遭遇生物（关闭时只巡路点）
    #[serde(default = "default_true")]
    pub encounter_creatures: bool,
    /// 相邻两次实体交互之间的最小间隔
    #[serde(default = "default_interaction_delay_ms")]
    pub interaction_delay_ms: u64,
    /// 离开一个路点前的等待
    #[serde(default = "default_waypoint_delay_ms")]
    pub waypoint_delay_ms: u64,
    /// 走向路点的步长（米），<= 0 表示瞬移
    #[serde(default = "default_walk_step_m")]
    pub walk_step_m: f64,
    /// 走向生物的步长（米）
    #[serde(default = "default_creature_step_m")]
    pub creature_step_m: f64,
    /// 每步之间的等待
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
    /// 生物逃跑（疑似软封禁）后的暂停
    #[serde(default = "default_soft_ban_pause_ms")]
    pub soft_ban_pause_ms: u64,
    #[serde(default = "default_resource_policy")]
    pub resource_policy: ResourcePolicy,
    /// 完成多少轮后退出；不设置表示一直巡逻
    #[serde(default)]
    pub max_cycles: Option<u64>,
}

fn default_true() -> bool {
    true
}

fn default_interaction_delay_ms() -> u64 {
    1000
}

fn default_waypoint_delay_ms() -> u64 {
    2000
}

fn default_walk_step_m() -> f64 {
    3.2
}

fn default_creature_step_m() -> f64 {
    2.8
}

fn default_step_delay_ms() -> u64 {
    200
}

fn default_soft_ban_pause_ms() -> u64 {
    60_000
}

fn default_resource_policy() -> ResourcePolicy {
    ResourcePolicy::Escalate
}

impl Default for PatrolSection {
    fn default() -> Self {
        Self {
            encounter_creatures: default_true(),
            interaction_delay_ms: default_interaction_delay_ms(),
            waypoint_delay_ms: default_waypoint_delay_ms(),
            walk_step_m: default_walk_step_m(),
            creature_step_m: default_creature_step_m(),
            step_delay_ms: default_step_delay_ms(),
            soft_ban_pause_ms: default_soft_ban_pause_ms(),
            resource_policy: default_resource_policy(),
            max_cycles: None,
        }
    }
}

/// [resilience] 段：故障冷却（指数退避）的下限与上限
#[derive(Debug, Clone, Deserialize)]
pub struct ResilienceSection {
    #[serde(default = "default_min_cooldown_ms")]
    pub min_cooldown_ms: u64,
    #[serde(default = "default_max_cooldown_ms")]
    pub max_cooldown_ms: u64,
}

fn default_min_cooldown_ms() -> u64 {
    1000
}

fn default_max_cooldown_ms() -> u64 {
    300_000
}

impl Default for ResilienceSection {
    fn default() -> Self {
        Self {
            min_cooldown_ms: default_min_cooldown_ms(),
            max_cooldown_ms: default_max_cooldown_ms(),
        }
    }
}

/// [housekeeping] 段：每轮开始前丢弃多余道具
#[derive(Debug, Clone, Deserialize)]
pub struct HousekeepingSection {
    #[serde(default)]
    pub enabled: bool,
    /// 全部丢弃的消耗品
    #[serde(default = "default_discard")]
    pub discard: Vec<ConsumableKind>,
    /// 装置保留上限，超出部分丢弃
    #[serde(default = "default_device_limits")]
    pub device_limits: BTreeMap<DeviceKind, u32>,
    /// 消耗品保留上限
    #[serde(default = "default_consumable_limits")]
    pub consumable_limits: BTreeMap<ConsumableKind, u32>,
}

fn default_discard() -> Vec<ConsumableKind> {
    vec![
        ConsumableKind::Potion,
        ConsumableKind::SuperPotion,
        ConsumableKind::Revive,
    ]
}

fn default_device_limits() -> BTreeMap<DeviceKind, u32> {
    BTreeMap::from([
        (DeviceKind::Basic, 50),
        (DeviceKind::Great, 100),
        (DeviceKind::Ultra, 150),
    ])
}

fn default_consumable_limits() -> BTreeMap<ConsumableKind, u32> {
    BTreeMap::from([(ConsumableKind::AssistBerry, 25)])
}

impl Default for HousekeepingSection {
    fn default() -> Self {
        Self {
            enabled: false,
            discard: default_discard(),
            device_limits: default_device_limits(),
            consumable_limits: default_consumable_limits(),
        }
    }
}

/// [incubation] 段：每轮开始前把空闲孵化器装满
#[derive(Debug, Clone, Deserialize)]
pub struct IncubationSection {
    #[serde(default = "default_incubation_enabled")]
    pub enabled: bool,
}

fn default_incubation_enabled() -> bool {
    true
}

impl Default for IncubationSection {
    fn default() -> Self {
        Self {
            enabled: default_incubation_enabled(),
        }
    }
}

impl AppConfig {
    /// 检查取值范围；错误统一映射为 PatrolError::Config
    pub fn validate(&self) -> Result<(), PatrolError> {
        if !(0.0..=1.0).contains(&self.capture.threshold) {
            return Err(PatrolError::Config(format!(
                "capture.threshold must be within [0, 1], got {}",
                self.capture.threshold
            )));
        }
        if self.resilience.min_cooldown_ms == 0 {
            return Err(PatrolError::Config(
                "resilience.min_cooldown_ms must be positive".to_string(),
            ));
        }
        if self.resilience.min_cooldown_ms > self.resilience.max_cooldown_ms {
            return Err(PatrolError::Config(format!(
                "resilience.min_cooldown_ms ({}) exceeds max_cooldown_ms ({})",
                self.resilience.min_cooldown_ms, self.resilience.max_cooldown_ms
            )));
        }
        for (name, step) in [
            ("walk_step_m", self.patrol.walk_step_m),
            ("creature_step_m", self.patrol.creature_step_m),
        ] {
            if !step.is_finite() || (step > 0.0 && step < MIN_STEP_M) {
                return Err(PatrolError::Config(format!(
                    "patrol.{} must be finite and either <= 0 or >= {}, got {}",
                    name, MIN_STEP_M, step
                )));
            }
        }
        Ok(())
    }
}

/// 从 config 目录加载配置，环境变量 PATROL__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 PATROL__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("PATROL")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
