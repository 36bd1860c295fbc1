use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{
    common::{ensure_non_negative, ensure_positive, ConfigError, VelocityCommand},
    gap::{find_gaps, widest_gap, GapParams, MIN_FORWARD_SPEED, REVERSE_SPEED},
    lidar::{Scan, Sector},
    traits::INavigator,
};

/// 直接回避のゲイン（ギャップ方向に対する角速度倍率）
const STEERING_GAIN: f64 = 2.0;

/// ギャップなし時の旋回角速度（rad/s）
const ESCAPE_TURN_RATE: f64 = 1.0;

/// 直接回避の設定
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectAvoidanceConfig {
    /// 障害物フラグを立てる距離（メートル）
    pub stop_distance: f64,
    /// 左前方セクター（度）
    pub left_sector: Sector,
    /// 右前方セクター（度）
    pub right_sector: Sector,
    /// 正面を向いている時の線速度（m/s）
    pub normal_linear_speed: f64,
    pub min_gap_width: f64,
    pub max_detection_dist: f64,
    pub safety_margin: f64,
}

impl Default for DirectAvoidanceConfig {
    fn default() -> Self {
        Self {
            stop_distance: 0.5,
            left_sector: Sector::new(315.0, 340.0),
            right_sector: Sector::new(20.0, 45.0),
            normal_linear_speed: 2.0,
            min_gap_width: 0.6,
            max_detection_dist: 3.0,
            safety_margin: 0.3,
        }
    }
}

impl DirectAvoidanceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive("stop_distance", self.stop_distance)?;
        ensure_positive("normal_linear_speed", self.normal_linear_speed)?;
        ensure_positive("max_detection_dist", self.max_detection_dist)?;
        ensure_non_negative("min_gap_width", self.min_gap_width)?;
        ensure_non_negative("safety_margin", self.safety_margin)?;
        self.left_sector.validate("left_sector")?;
        self.right_sector.validate("right_sector")?;
        Ok(())
    }

    pub fn gap_params(&self) -> GapParams {
        GapParams {
            stop_distance: self.stop_distance,
            safety_margin: self.safety_margin,
            min_gap_width: self.min_gap_width,
            max_detection_dist: self.max_detection_dist,
        }
    }
}

/// 直接回避戦略
///
/// 最も幅の広いギャップの中心方向へ比例操舵します。
/// 左右セクターの障害物フラグは診断用で、指令には影響しません。
#[derive(Debug, Clone)]
pub struct DirectAvoidance {
    config: DirectAvoidanceConfig,
    obstacle_left: bool,
    obstacle_right: bool,
}

impl DirectAvoidance {
    pub fn new(config: DirectAvoidanceConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            obstacle_left: false,
            obstacle_right: false,
        })
    }

    /// 直近のスキャンで左セクターに障害物があったか
    pub fn obstacle_left(&self) -> bool {
        self.obstacle_left
    }

    /// 直近のスキャンで右セクターに障害物があったか
    pub fn obstacle_right(&self) -> bool {
        self.obstacle_right
    }
}

impl INavigator for DirectAvoidance {
    fn plan(&mut self, scan: &Scan) -> VelocityCommand {
        let left_min = self.config.left_sector.min_range(scan);
        let right_min = self.config.right_sector.min_range(scan);
        self.obstacle_left = left_min < self.config.stop_distance;
        self.obstacle_right = right_min < self.config.stop_distance;

        let gaps = find_gaps(scan, &self.config.gap_params());
        let Some(gap) = widest_gap(&gaps) else {
            warn!("直接回避: 通過可能なギャップなし、後退旋回します");
            return VelocityCommand::new(REVERSE_SPEED, ESCAPE_TURN_RATE);
        };

        let gap_angle = gap.center_angle;
        let angular = STEERING_GAIN * gap_angle;
        let linear = (self.config.normal_linear_speed
            * (1.0 - gap_angle.abs() / std::f64::consts::PI))
            .max(MIN_FORWARD_SPEED);

        debug!(
            "直接回避: ギャップ[{}..{}) 幅{:.2}m 方向{:.3}rad 左障害物={} 右障害物={}",
            gap.start_idx, gap.end_idx, gap.width, gap_angle, self.obstacle_left, self.obstacle_right
        );

        VelocityCommand::new(linear, angular)
    }

    fn reset(&mut self) {
        self.obstacle_left = false;
        self.obstacle_right = false;
    }

    fn get_name(&self) -> &'static str {
        "direct_avoidance"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::f64::consts::PI;

    fn navigator() -> DirectAvoidance {
        DirectAvoidance::new(DirectAvoidanceConfig::default()).unwrap()
    }

    #[test]
    fn test_steers_toward_widest_gap() {
        let ranges: Vec<Option<f64>> = (0..360)
            .map(|i| if (100..=140).contains(&i) { Some(0.1) } else { Some(3.0) })
            .collect();
        let command = navigator().plan(&Scan::from_ranges(&ranges));

        // 中心250度 = -110度
        let gap_angle = -110.0 * PI / 180.0;
        assert_approx_eq!(command.angular, 2.0 * gap_angle, 1e-9);
        assert_approx_eq!(command.linear, 2.0 * (1.0 - 110.0 / 180.0), 1e-9);
    }

    #[test]
    fn test_trailing_gap_is_followed() {
        // 340〜359度だけが開いている
        let ranges: Vec<Option<f64>> = (0..360)
            .map(|i| if i >= 340 { Some(3.0) } else { Some(0.7) })
            .collect();
        let command = navigator().plan(&Scan::from_ranges(&ranges));

        assert_approx_eq!(command.angular, 2.0 * (-10.0 * PI / 180.0), 1e-9);
        assert_approx_eq!(command.linear, 2.0 * (1.0 - 10.0 / 180.0), 1e-9);
    }

    #[test]
    fn test_open_field_keeps_minimum_speed() {
        // 折り返し結合なし: 全周1つのギャップ、中心は真後ろ
        let command = navigator().plan(&Scan::from_ranges(&vec![None; 360]));
        assert_approx_eq!(command.angular, 2.0 * PI, 1e-9);
        assert_approx_eq!(command.linear, 0.2, 1e-9);
    }

    #[test]
    fn test_boxed_in_reverses_and_turns() {
        let command = navigator().plan(&Scan::from_ranges(&vec![Some(0.3); 360]));
        assert_eq!(command, VelocityCommand::new(-0.2, 1.0));
        assert!(command.is_finite());
    }

    #[test]
    fn test_obstacle_flags() {
        let mut ranges = vec![Some(3.0); 360];
        ranges[330] = Some(0.3);
        ranges[30] = Some(0.6);
        let mut nav = navigator();
        nav.plan(&Scan::from_ranges(&ranges));

        assert!(nav.obstacle_left());
        assert!(!nav.obstacle_right());

        nav.reset();
        assert!(!nav.obstacle_left());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = DirectAvoidanceConfig { stop_distance: 0.0, ..Default::default() };
        assert!(DirectAvoidance::new(config).is_err());

        let config = DirectAvoidanceConfig {
            left_sector: Sector::new(340.0, 315.0),
            ..Default::default()
        };
        assert!(matches!(
            DirectAvoidance::new(config),
            Err(ConfigError::InvalidSector { name: "left_sector", .. })
        ));
    }
}
