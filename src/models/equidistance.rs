use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{
    common::{ensure_non_negative, ensure_positive, math_utils, ConfigError, VelocityCommand},
    lidar::{Scan, Sector},
    traits::INavigator,
};

/// 積分項の上限（絶対値）
const INTEGRAL_LIMIT: f64 = 1.0;

/// 等距離走行（PID）の設定
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EquidistanceConfig {
    pub stop_distance: f64,
    pub max_detection_dist: f64,
    pub max_linear_speed: f64,
    pub max_angular_speed: f64,
    /// 左側セクター（度）
    pub left_sector: Sector,
    /// 右側セクター（度）
    pub right_sector: Sector,
    /// 正面セクターの幅（度、0度を中心とする）
    pub front_sector_size_deg: f64,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for EquidistanceConfig {
    fn default() -> Self {
        Self {
            stop_distance: 0.5,
            max_detection_dist: 3.0,
            max_linear_speed: 1.0,
            max_angular_speed: 2.0,
            left_sector: Sector::new(60.0, 120.0),
            right_sector: Sector::new(240.0, 300.0),
            front_sector_size_deg: 30.0,
            kp: 1.0,
            ki: 0.1,
            kd: 0.2,
        }
    }
}

impl EquidistanceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive("stop_distance", self.stop_distance)?;
        ensure_positive("max_detection_dist", self.max_detection_dist)?;
        ensure_positive("max_linear_speed", self.max_linear_speed)?;
        ensure_positive("max_angular_speed", self.max_angular_speed)?;
        ensure_positive("front_sector_size_deg", self.front_sector_size_deg)?;
        if self.front_sector_size_deg > 360.0 {
            return Err(ConfigError::InvalidSector {
                name: "front_sector",
                start_deg: -self.front_sector_size_deg / 2.0,
                end_deg: self.front_sector_size_deg / 2.0,
            });
        }
        self.left_sector.validate("left_sector")?;
        self.right_sector.validate("right_sector")?;
        ensure_non_negative("kp", self.kp)?;
        ensure_non_negative("ki", self.ki)?;
        ensure_non_negative("kd", self.kd)?;
        Ok(())
    }
}

/// 等距離走行戦略
///
/// 左右の壁までの平均距離を揃えるようにPID制御で操舵し、
/// 正面の空き距離に応じて減速・停止します。
#[derive(Debug, Clone)]
pub struct EquidistancePid {
    config: EquidistanceConfig,
    /// 誤差の積分値（[-1, 1]に制限）
    integral: f64,
    /// 前回の誤差
    last_error: f64,
}

impl EquidistancePid {
    pub fn new(config: EquidistanceConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            integral: 0.0,
            last_error: 0.0,
        })
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn last_error(&self) -> f64 {
        self.last_error
    }

    /// インデックス列の平均距離
    ///
    /// `max_detection_dist` 未満のヒットのみを対象とし、1つもなければ
    /// `max_detection_dist` を返します。
    fn mean_range(&self, scan: &Scan, indices: impl Iterator<Item = usize>) -> f64 {
        let limit = self.config.max_detection_dist;
        let (sum, count) = indices
            .filter_map(|i| scan.range(i))
            .filter(|&r| r < limit)
            .fold((0.0, 0usize), |(sum, count), r| (sum + r, count + 1));

        if count == 0 { limit } else { sum / count as f64 }
    }

    /// 正面セクターの平均距離（インデックス N − k/2 .. N + k/2 をNで折り返し）
    pub fn front_distance(&self, scan: &Scan) -> f64 {
        let len = scan.len();
        if len == 0 {
            return self.config.max_detection_dist;
        }
        let half = scan.degrees_to_index(self.config.front_sector_size_deg) / 2;
        let n = len as i64;
        let indices = (n - half..n + half).map(|i| math_utils::wrap_index(i, len));
        self.mean_range(scan, indices)
    }

    /// 正面距離に応じた線速度
    fn linear_speed(&self, front: f64) -> f64 {
        let stop = self.config.stop_distance;
        if front < 2.0 * stop {
            0.0
        } else if front < 4.0 * stop {
            self.config.max_linear_speed * (front - 2.0 * stop) / (2.0 * stop)
        } else {
            self.config.max_linear_speed
        }
    }
}

impl INavigator for EquidistancePid {
    fn plan(&mut self, scan: &Scan) -> VelocityCommand {
        let left = self.mean_range(scan, self.config.left_sector.indices(scan));
        let right = self.mean_range(scan, self.config.right_sector.indices(scan));
        let front = self.front_distance(scan);

        let error = right - left;
        self.integral = (self.integral + error).clamp(-INTEGRAL_LIMIT, INTEGRAL_LIMIT);
        let derivative = error - self.last_error;
        self.last_error = error;

        let max_angular = self.config.max_angular_speed;
        let angular = (self.config.kp * error + self.config.ki * self.integral + self.config.kd * derivative)
            .clamp(-max_angular, max_angular);
        let linear = self.linear_speed(front);

        debug!(
            "等距離PID: 左{:.2}m 右{:.2}m 正面{:.2}m 誤差{:.3} 積分{:.3}",
            left, right, front, error, self.integral
        );

        VelocityCommand::new(linear, angular)
    }

    fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = 0.0;
    }

    fn get_name(&self) -> &'static str {
        "equidistance_pid"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    /// 左右・正面の距離を指定した合成スキャン
    fn corridor_scan(left: f64, right: f64, front: f64) -> Scan {
        let ranges: Vec<Option<f64>> = (0..360)
            .map(|i| match i {
                60..120 => Some(left),
                240..300 => Some(right),
                0..15 | 345..360 => Some(front),
                _ => None,
            })
            .collect();
        Scan::from_ranges(&ranges)
    }

    fn pid() -> EquidistancePid {
        EquidistancePid::new(EquidistanceConfig::default()).unwrap()
    }

    #[test]
    fn test_balanced_corridor_has_no_steering() {
        let mut nav = pid();
        let command = nav.plan(&corridor_scan(1.0, 1.0, 2.5));

        assert_approx_eq!(nav.last_error(), 0.0, 1e-12);
        assert_approx_eq!(command.angular, 0.0, 1e-12);
        assert_approx_eq!(command.linear, 1.0);
    }

    #[test]
    fn test_pid_terms_and_integral_clamp() {
        let mut nav = pid();
        // error = 2.0 - 1.0 = 1.0
        let command = nav.plan(&corridor_scan(1.0, 2.0, 2.5));
        // kp*1 + ki*1 + kd*1 = 1.3
        assert_approx_eq!(command.angular, 1.3, 1e-9);
        assert_approx_eq!(nav.integral(), 1.0, 1e-9);

        // 積分は1を超えない、微分は0
        let command = nav.plan(&corridor_scan(1.0, 2.0, 2.5));
        assert_approx_eq!(nav.integral(), 1.0, 1e-9);
        assert_approx_eq!(command.angular, 1.1, 1e-9);
    }

    #[test]
    fn test_angular_is_clamped() {
        let mut nav = pid();
        let command = nav.plan(&corridor_scan(0.2, 2.9, 2.5));
        assert_approx_eq!(command.angular, 2.0);
    }

    #[test]
    fn test_linear_speed_ramp() {
        let mut nav = pid();
        // 正面 < 2*stop で停止
        assert_eq!(nav.plan(&corridor_scan(1.0, 1.0, 0.9)).linear, 0.0);
        // 2*stop <= 正面 < 4*stop で線形に加速
        assert_approx_eq!(nav.plan(&corridor_scan(1.0, 1.0, 1.5)).linear, 0.5, 1e-9);
        assert_approx_eq!(nav.plan(&corridor_scan(1.0, 1.0, 2.0)).linear, 1.0, 1e-9);
    }

    #[test]
    fn test_empty_sectors_fall_back_to_max_distance() {
        let mut nav = pid();
        let scan = Scan::from_ranges(&vec![None; 360]);
        let command = nav.plan(&scan);

        assert_approx_eq!(nav.front_distance(&scan), 3.0);
        assert_approx_eq!(command.angular, 0.0);
        assert_approx_eq!(command.linear, 1.0);
        assert!(command.is_finite());
    }

    #[test]
    fn test_front_sector_wraps_around_zero() {
        let mut ranges = vec![None; 360];
        ranges[350] = Some(1.0);
        ranges[5] = Some(2.0);
        // 20度は正面セクター外
        ranges[20] = Some(0.1);
        assert_approx_eq!(pid().front_distance(&Scan::from_ranges(&ranges)), 1.5, 1e-9);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut nav = pid();
        nav.plan(&corridor_scan(1.0, 2.0, 2.5));
        nav.reset();
        assert_eq!(nav.integral(), 0.0);
        assert_eq!(nav.last_error(), 0.0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EquidistanceConfig { front_sector_size_deg: 400.0, ..Default::default() };
        assert!(EquidistancePid::new(config).is_err());
        let config = EquidistanceConfig { kp: -1.0, ..Default::default() };
        assert!(EquidistancePid::new(config).is_err());
    }
}
