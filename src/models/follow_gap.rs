//! ギャップ追従戦略
//!
//! 最大ギャップ追従と重み付きギャップ追従は同じ抽出・操舵則を共有し、
//! ギャップの評価式だけが異なります。

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{
    common::{ensure_non_negative, ensure_positive, ConfigError, VelocityCommand},
    gap::{find_gaps, Gap, GapParams, MIN_FORWARD_SPEED, REVERSE_SPEED},
    lidar::Scan,
    traits::INavigator,
};

/// ギャップの評価方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapScoring {
    /// 幅のみで評価（gap_weight=1, angle_weight=0）
    Largest,
    /// 幅と正面からのずれを重み付けして評価
    Weighted,
}

/// ギャップ追従の設定
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowGapConfig {
    pub stop_distance: f64,
    pub min_gap_width: f64,
    pub max_detection_dist: f64,
    pub safety_margin: f64,
    /// 最大線速度（m/s）
    pub max_linear_speed: f64,
    /// 最大角速度（rad/s）
    pub max_angular_speed: f64,
    /// 幅の重み（重み付き評価のみ）
    pub gap_weight: f64,
    /// 正面性の重み（重み付き評価のみ）
    pub angle_weight: f64,
}

impl Default for FollowGapConfig {
    fn default() -> Self {
        Self {
            stop_distance: 0.5,
            min_gap_width: 0.6,
            max_detection_dist: 3.0,
            safety_margin: 0.3,
            max_linear_speed: 2.0,
            max_angular_speed: 4.0,
            gap_weight: 1.0,
            angle_weight: 0.5,
        }
    }
}

impl FollowGapConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive("stop_distance", self.stop_distance)?;
        ensure_positive("max_detection_dist", self.max_detection_dist)?;
        ensure_positive("max_linear_speed", self.max_linear_speed)?;
        ensure_positive("max_angular_speed", self.max_angular_speed)?;
        ensure_non_negative("min_gap_width", self.min_gap_width)?;
        ensure_non_negative("safety_margin", self.safety_margin)?;
        ensure_non_negative("gap_weight", self.gap_weight)?;
        ensure_non_negative("angle_weight", self.angle_weight)?;
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

/// ギャップ追従戦略
#[derive(Debug, Clone)]
pub struct FollowGap {
    config: FollowGapConfig,
    scoring: GapScoring,
    /// 直近に選択したギャップ（診断用）
    selected: Option<Gap>,
}

impl FollowGap {
    pub fn new(config: FollowGapConfig, scoring: GapScoring) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            scoring,
            selected: None,
        })
    }

    pub fn selected_gap(&self) -> Option<&Gap> {
        self.selected.as_ref()
    }

    /// 評価式の重み (gap_weight, angle_weight)
    fn weights(&self) -> (f64, f64) {
        match self.scoring {
            GapScoring::Largest => (1.0, 0.0),
            GapScoring::Weighted => (self.config.gap_weight, self.config.angle_weight),
        }
    }

    /// ギャップの評価値
    ///
    /// `width · gap_weight + (1 − |center_angle| / π) · angle_weight`
    pub fn score(&self, gap: &Gap) -> f64 {
        let (gap_weight, angle_weight) = self.weights();
        gap.width * gap_weight + (1.0 - gap.center_angle.abs() / PI) * angle_weight
    }

    /// 評価値が最大のギャップを選択（同値は先勝ち）
    fn select<'a>(&self, gaps: &'a [Gap]) -> Option<&'a Gap> {
        let mut best: Option<(&Gap, f64)> = None;
        for gap in gaps {
            let score = self.score(gap);
            if best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((gap, score));
            }
        }
        best.map(|(gap, _)| gap)
    }
}

impl INavigator for FollowGap {
    fn plan(&mut self, scan: &Scan) -> VelocityCommand {
        let gaps = find_gaps(scan, &self.config.gap_params());
        let max_angular = self.config.max_angular_speed;

        self.selected = self.select(&gaps).copied();
        let Some(gap) = self.selected else {
            warn!("{}: 通過可能なギャップなし、後退旋回します", self.get_name());
            return VelocityCommand::new(REVERSE_SPEED, max_angular);
        };

        let angle = gap.center_angle;
        let angular = (max_angular * angle / PI).clamp(-max_angular, max_angular);
        let linear = (self.config.max_linear_speed * (1.0 - angle.abs() / PI)).max(MIN_FORWARD_SPEED);

        debug!(
            "{}: 候補{}件から[{}..{})を選択 幅{:.2}m 方向{:.3}rad",
            self.get_name(),
            gaps.len(),
            gap.start_idx,
            gap.end_idx,
            gap.width,
            angle
        );

        VelocityCommand::new(linear, angular)
    }

    fn reset(&mut self) {
        self.selected = None;
    }

    fn get_name(&self) -> &'static str {
        match self.scoring {
            GapScoring::Largest => "largest_gap",
            GapScoring::Weighted => "weighted_gap",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn notch_scan() -> Scan {
        let ranges: Vec<Option<f64>> = (0..360)
            .map(|i| if (100..=140).contains(&i) { Some(0.1) } else { Some(3.0) })
            .collect();
        Scan::from_ranges(&ranges)
    }

    #[test]
    fn test_largest_gap_picks_wider_side_of_notch() {
        let mut nav = FollowGap::new(FollowGapConfig::default(), GapScoring::Largest).unwrap();
        let command = nav.plan(&notch_scan());

        let gap = nav.selected_gap().unwrap();
        assert_eq!(gap.start_idx, 141);
        assert_eq!(gap.end_idx, 360);

        // 中心-110度
        assert_approx_eq!(command.angular, 4.0 * (-110.0 / 180.0), 1e-9);
        assert_approx_eq!(command.linear, 2.0 * (70.0 / 180.0), 1e-9);
    }

    #[test]
    fn test_weighted_prefers_frontal_gap_when_angle_dominates() {
        // 前方寄り(10..50)と後方寄り(160..200)の同幅ギャップ
        let ranges: Vec<Option<f64>> = (0..360)
            .map(|i| {
                if (10..50).contains(&i) || (160..200).contains(&i) { Some(3.0) } else { Some(0.2) }
            })
            .collect();
        let scan = Scan::from_ranges(&ranges);

        let config = FollowGapConfig { gap_weight: 0.0, angle_weight: 1.0, ..Default::default() };
        let mut weighted = FollowGap::new(config, GapScoring::Weighted).unwrap();
        weighted.plan(&scan);
        assert_eq!(weighted.selected_gap().unwrap().start_idx, 10);

        // 評価値: 正面性 1 - 30/180
        let gap = *weighted.selected_gap().unwrap();
        assert_approx_eq!(weighted.score(&gap), 1.0 - 30.0 / 180.0, 1e-9);
    }

    #[test]
    fn test_weighted_tie_keeps_first_gap() {
        // 左右対称なギャップ: +40度と-40度で同じ評価値
        let ranges: Vec<Option<f64>> = (0..360)
            .map(|i| {
                if (20..60).contains(&i) || (300..340).contains(&i) { Some(3.0) } else { Some(0.2) }
            })
            .collect();
        let scan = Scan::from_ranges(&ranges);

        let mut nav = FollowGap::new(FollowGapConfig::default(), GapScoring::Weighted).unwrap();
        let gaps = find_gaps(&scan, &nav.config.gap_params());
        assert_eq!(gaps.len(), 2);
        assert_eq!(nav.score(&gaps[0]), nav.score(&gaps[1]));

        let command = nav.plan(&scan);
        assert_eq!(nav.selected_gap().unwrap().start_idx, 20);
        assert!(command.angular > 0.0);
    }

    #[test]
    fn test_largest_ignores_angle_weight() {
        let config = FollowGapConfig { gap_weight: 0.0, angle_weight: 100.0, ..Default::default() };
        let nav = FollowGap::new(config, GapScoring::Largest).unwrap();
        let gaps = find_gaps(&notch_scan(), &config.gap_params());
        assert_approx_eq!(nav.score(&gaps[0]), gaps[0].width);
    }

    #[test]
    fn test_boxed_in_reverses_with_max_turn() {
        let mut nav = FollowGap::new(FollowGapConfig::default(), GapScoring::Weighted).unwrap();
        let command = nav.plan(&Scan::from_ranges(&vec![Some(0.3); 360]));

        assert_eq!(command, VelocityCommand::new(-0.2, 4.0));
        assert!(command.is_finite());
        assert!(nav.selected_gap().is_none());
    }

    #[test]
    fn test_angular_is_clipped() {
        let config = FollowGapConfig { max_angular_speed: 1.0, ..Default::default() };
        let mut nav = FollowGap::new(config, GapScoring::Largest).unwrap();
        let command = nav.plan(&notch_scan());
        assert!(command.angular.abs() <= 1.0);
    }

    #[test]
    fn test_names_and_validation() {
        let largest = FollowGap::new(FollowGapConfig::default(), GapScoring::Largest).unwrap();
        let weighted = FollowGap::new(FollowGapConfig::default(), GapScoring::Weighted).unwrap();
        assert_eq!(largest.get_name(), "largest_gap");
        assert_eq!(weighted.get_name(), "weighted_gap");

        let config = FollowGapConfig { max_linear_speed: -1.0, ..Default::default() };
        assert!(FollowGap::new(config, GapScoring::Largest).is_err());
    }
}
