//! 地理计算：大圆距离与分步行走路径
//!
//! 距离使用 haversine 公式（忽略海拔）；行走路径在经纬度上线性插值，每步不超过给定米数。

use crate::world::Coordinate;

/// 地球平均半径（米）
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// 配置允许的最小正步长（米）
pub const MIN_STEP_M: f64 = 0.1;

/// 单段路径的最多步数；超过时步长按比例放大
pub const MAX_WALK_STEPS: usize = 10_000;

/// 两点间大圆距离（米），海拔不参与计算
pub fn distance(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lng = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// 从 from 向 to 前进至多 step_m 米；剩余距离不足一步时直接返回 to
pub fn step_toward(from: &Coordinate, to: &Coordinate, step_m: f64) -> Coordinate {
    let total = distance(from, to);
    if step_m <= 0.0 || total <= step_m {
        return *to;
    }
    let ratio = step_m / total;
    Coordinate {
        latitude: from.latitude + (to.latitude - from.latitude) * ratio,
        longitude: from.longitude + (to.longitude - from.longitude) * ratio,
        altitude: to.altitude.or(from.altitude),
    }
}

/// 生成从 from 走到 to 的逐步坐标序列（不含起点，最后一个元素恒为 to）
///
/// step_m <= 0 视为瞬移，只返回 `[to]`。步数不超过 MAX_WALK_STEPS。
pub fn walk_path(from: &Coordinate, to: &Coordinate, step_m: f64) -> Vec<Coordinate> {
    if step_m <= 0.0 {
        return vec![*to];
    }
    let total = distance(from, to);
    let steps = (total / step_m).ceil().max(1.0).min(MAX_WALK_STEPS as f64) as usize;
    (1..=steps)
        .map(|i| {
            if i == steps {
                *to
            } else {
                let ratio = i as f64 / steps as f64;
                Coordinate {
                    latitude: from.latitude + (to.latitude - from.latitude) * ratio,
                    longitude: from.longitude + (to.longitude - from.longitude) * ratio,
                    altitude: to.altitude.or(from.altitude),
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(lat: f64, lng: f64) -> Coordinate {
        Coordinate::new(lat, lng)
    }

    #[test]
    fn test_distance_same_point_is_zero() {
        let p = c(40.7580, -73.9855);
        assert_eq!(distance(&p, &p), 0.0);
    }

    #[test]
    fn test_distance_one_degree_latitude() {
        // 1° 纬度约 111.19 km
        let d = distance(&c(0.0, 0.0), &c(1.0, 0.0));
        assert!((d - 111_195.0).abs() < 50.0, "got {d}");
    }

    #[test]
    fn test_distance_ignores_altitude() {
        let a = c(51.5007, -0.1246);
        let b = Coordinate { altitude: Some(300.0), ..c(51.5014, -0.1419) };
        let flat = distance(&a, &c(51.5014, -0.1419));
        assert_eq!(distance(&a, &b), flat);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = c(48.8584, 2.2945);
        let b = c(48.8606, 2.3376);
        assert!((distance(&a, &b) - distance(&b, &a)).abs() < 1e-9);
    }

    #[test]
    fn test_step_toward_short_hop_reaches_target() {
        let a = c(10.0, 10.0);
        let b = c(10.00001, 10.0);
        assert_eq!(step_toward(&a, &b, 5.0), b);
    }

    #[test]
    fn test_step_toward_moves_at_most_step() {
        let a = c(10.0, 10.0);
        let b = c(10.01, 10.0);
        let next = step_toward(&a, &b, 100.0);
        let moved = distance(&a, &next);
        assert!((moved - 100.0).abs() < 1.0, "moved {moved}");
    }

    #[test]
    fn test_walk_path_ends_at_target_with_bounded_steps() {
        let a = c(10.0, 10.0);
        let b = c(10.001, 10.0);
        let path = walk_path(&a, &b, 3.2);
        assert_eq!(*path.last().unwrap(), b);
        let mut prev = a;
        for p in &path {
            assert!(distance(&prev, p) <= 3.2 + 1e-6);
            prev = *p;
        }
    }

    #[test]
    fn test_walk_path_tiny_step_is_capped() {
        let a = c(40.0, -74.0);
        let b = c(40.01, -74.0);
        let path = walk_path(&a, &b, 1e-17);
        assert_eq!(path.len(), MAX_WALK_STEPS);
        assert_eq!(*path.last().unwrap(), b);
    }

    #[test]
    fn test_walk_path_zero_step_teleports() {
        let a = c(1.0, 1.0);
        let b = c(2.0, 2.0);
        assert_eq!(walk_path(&a, &b, 0.0), vec![b]);
    }
}
