//! Patrol - 位置类游戏巡逻机器人核心
//!
//! 模块划分：
//! - **geo**: 大圆距离与分步行走
//! - **world**: 领域模型（坐标、生物、路点、装置、背包）
//! - **session**: 游戏会话与认证抽象，以及内存模拟实现
//! - **ranking**: 目标排序（生物按稀有度，路点按距离）
//! - **capture**: 多轮捕捉谈判
//! - **patrol**: 巡逻状态机、过程事件、背包整理
//! - **core**: 错误与恢复、退避、会话监管、弹性循环、控制面、优雅关闭
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **observability**: 日志初始化

pub mod capture;
pub mod config;
pub mod core;
pub mod geo;
pub mod observability;
pub mod patrol;
pub mod ranking;
pub mod session;
pub mod world;

pub use crate::core::{spawn_patrol, Command, PatrolError, PatrolHandle};
