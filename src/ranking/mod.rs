//! 目标排序
//!
//! - 生物：稀有度降序，同稀有度按距离升序（贪心，不回溯）
//! - 路点：按距离升序（最近邻启发，不求最优路线；每轮位置变化后重新排序）
//!
//! 排序稳定，输出恒为输入的一个排列。

use std::cmp::Ordering;

use crate::geo::distance;
use crate::world::{Coordinate, Creature, DiscoveredEntity, Waypoint};

/// 按优先级排好的实体列表（下标越小优先级越高）
pub type RankedList = Vec<DiscoveredEntity>;

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// 生物排序：稀有度降序，距离升序
pub fn rank_creatures(creatures: Vec<Creature>, origin: &Coordinate) -> Vec<Creature> {
    let mut keyed: Vec<(f64, Creature)> = creatures
        .into_iter()
        .map(|c| (distance(origin, &c.position), c))
        .collect();
    keyed.sort_by(|(da, a), (db, b)| {
        cmp_f64(b.rarity_score, a.rarity_score).then_with(|| cmp_f64(*da, *db))
    });
    keyed.into_iter().map(|(_, c)| c).collect()
}

/// 路点排序：距离升序
pub fn rank_waypoints(waypoints: Vec<Waypoint>, origin: &Coordinate) -> Vec<Waypoint> {
    let mut keyed: Vec<(f64, Waypoint)> = waypoints
        .into_iter()
        .map(|w| (distance(origin, &w.position), w))
        .collect();
    keyed.sort_by(|(da, _), (db, _)| cmp_f64(*da, *db));
    keyed.into_iter().map(|(_, w)| w).collect()
}

/// 混合实体排序：生物在前（按生物规则），路点在后（按距离）
pub fn rank(entities: Vec<DiscoveredEntity>, origin: &Coordinate) -> RankedList {
    let (mut creatures, mut waypoints) = (Vec::new(), Vec::new());
    for entity in entities {
        match entity {
            DiscoveredEntity::Creature(c) => creatures.push(c),
            DiscoveredEntity::Waypoint(w) => waypoints.push(w),
        }
    }
    rank_creatures(creatures, origin)
        .into_iter()
        .map(DiscoveredEntity::Creature)
        .chain(
            rank_waypoints(waypoints, origin)
                .into_iter()
                .map(DiscoveredEntity::Waypoint),
        )
        .collect()
}
