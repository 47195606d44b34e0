//! 游戏会话抽象
//!
//! 传输层（认证、请求、地图/背包快照）是外部协作者；核心只依赖 GameSession 与 Authenticator 两个 trait。

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::world::{
    ActivationResult, CaptureStatus, ConsumableKind, Coordinate, Creature, DeviceKind,
    DeviceProbability, Egg, IncubationResult, Incubator, InventorySnapshot, ItemKind, Waypoint,
};

/// 会话层错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// 网络或服务端错误，可通过退避 + 重新认证恢复
    #[error("Transport error: {0}")]
    Transport(String),

    /// 认证失败或会话过期
    #[error("Auth error: {0}")]
    Auth(String),

    /// 服务端返回无法解析的消息
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// 已认证的会话句柄；重新认证时整体替换
pub type SessionHandle = Arc<dyn GameSession>;

/// 游戏会话：地图查询、遭遇、捕捉、路点与背包操作
#[async_trait]
pub trait GameSession: Send + Sync {
    /// 会话标识（日志用）
    fn session_id(&self) -> String;

    async fn current_position(&self) -> Result<Coordinate, SessionError>;

    /// 将玩家位置更新到给定坐标（行走的一步）
    async fn move_to(&self, position: Coordinate) -> Result<(), SessionError>;

    async fn nearby_waypoints(&self) -> Result<Vec<Waypoint>, SessionError>;

    async fn nearby_creatures(&self) -> Result<Vec<Creature>, SessionError>;

    /// 开启遭遇，返回各装置的捕获概率（服务端顺序）
    async fn begin_encounter(
        &self,
        creature: &Creature,
    ) -> Result<Vec<DeviceProbability>, SessionError>;

    /// 遭遇进行中重新查询捕获概率（使用辅助道具后概率会变化）
    async fn capture_probabilities(
        &self,
        creature: &Creature,
    ) -> Result<Vec<DeviceProbability>, SessionError>;

    async fn attempt_capture(
        &self,
        creature: &Creature,
        device: DeviceKind,
    ) -> Result<CaptureStatus, SessionError>;

    async fn use_consumable(
        &self,
        kind: ConsumableKind,
        creature: &Creature,
    ) -> Result<(), SessionError>;

    /// 激活路点（幂等）
    async fn activate_waypoint(&self, waypoint: &Waypoint)
        -> Result<ActivationResult, SessionError>;

    async fn get_inventory(&self) -> Result<InventorySnapshot, SessionError>;

    /// 丢弃 count 个道具
    async fn recycle_item(&self, item: ItemKind, count: u32) -> Result<(), SessionError>;

    /// 把蛋放入孵化器
    async fn assign_egg(
        &self,
        incubator: &Incubator,
        egg: &Egg,
    ) -> Result<IncubationResult, SessionError>;
}

/// 认证器：基于旧句柄换取新句柄
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn reauthenticate(&self, previous: &SessionHandle)
        -> Result<SessionHandle, SessionError>;
}
