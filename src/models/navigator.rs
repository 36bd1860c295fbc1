use serde::{Deserialize, Serialize};

use crate::models::{
    common::{ConfigError, VelocityCommand},
    direct_avoidance::{DirectAvoidance, DirectAvoidanceConfig},
    equidistance::{EquidistanceConfig, EquidistancePid},
    follow_gap::{FollowGap, FollowGapConfig, GapScoring},
    lidar::Scan,
    traits::INavigator,
};

/// ナビゲーション設定
///
/// シナリオファイルでは `strategy` キーで戦略を選択し、残りのキーで
/// その戦略のパラメータを上書きします。
///
/// ```yaml
/// strategy: weighted_gap
/// max_linear_speed: 1.5
/// angle_weight: 0.8
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum NavigationConfig {
    DirectAvoidance(DirectAvoidanceConfig),
    LargestGap(FollowGapConfig),
    WeightedGap(FollowGapConfig),
    EquidistancePid(EquidistanceConfig),
}

impl NavigationConfig {
    /// 戦略名（`strategy` タグの値）
    pub fn name(&self) -> &'static str {
        match self {
            NavigationConfig::DirectAvoidance(_) => "direct_avoidance",
            NavigationConfig::LargestGap(_) => "largest_gap",
            NavigationConfig::WeightedGap(_) => "weighted_gap",
            NavigationConfig::EquidistancePid(_) => "equidistance_pid",
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            NavigationConfig::DirectAvoidance(config) => config.validate(),
            NavigationConfig::LargestGap(config) | NavigationConfig::WeightedGap(config) => {
                config.validate()
            }
            NavigationConfig::EquidistancePid(config) => config.validate(),
        }
    }
}

impl Default for NavigationConfig {
    fn default() -> Self {
        NavigationConfig::DirectAvoidance(DirectAvoidanceConfig::default())
    }
}

/// ナビゲーション戦略
///
/// 戦略の集合は閉じているため、動的ディスパッチではなく列挙型で保持します。
#[derive(Debug, Clone)]
pub enum NavigationStrategy {
    DirectAvoidance(DirectAvoidance),
    LargestGapFollower(FollowGap),
    WeightedGapFollower(FollowGap),
    EquidistancePid(EquidistancePid),
}

impl NavigationStrategy {
    /// 設定から戦略を構築します
    ///
    /// # 引数
    ///
    /// * `config` - 戦略の種類とパラメータ
    ///
    /// # 戻り値
    ///
    /// 初期状態の戦略、パラメータが不正な場合は `ConfigError`
    pub fn from_config(config: &NavigationConfig) -> Result<Self, ConfigError> {
        let strategy = match config {
            NavigationConfig::DirectAvoidance(c) => {
                NavigationStrategy::DirectAvoidance(DirectAvoidance::new(*c)?)
            }
            NavigationConfig::LargestGap(c) => {
                NavigationStrategy::LargestGapFollower(FollowGap::new(*c, GapScoring::Largest)?)
            }
            NavigationConfig::WeightedGap(c) => {
                NavigationStrategy::WeightedGapFollower(FollowGap::new(*c, GapScoring::Weighted)?)
            }
            NavigationConfig::EquidistancePid(c) => {
                NavigationStrategy::EquidistancePid(EquidistancePid::new(*c)?)
            }
        };
        Ok(strategy)
    }

    fn as_navigator(&self) -> &dyn INavigator {
        match self {
            NavigationStrategy::DirectAvoidance(nav) => nav,
            NavigationStrategy::LargestGapFollower(nav) | NavigationStrategy::WeightedGapFollower(nav) => nav,
            NavigationStrategy::EquidistancePid(nav) => nav,
        }
    }

    fn as_navigator_mut(&mut self) -> &mut dyn INavigator {
        match self {
            NavigationStrategy::DirectAvoidance(nav) => nav,
            NavigationStrategy::LargestGapFollower(nav) | NavigationStrategy::WeightedGapFollower(nav) => nav,
            NavigationStrategy::EquidistancePid(nav) => nav,
        }
    }
}

impl INavigator for NavigationStrategy {
    fn plan(&mut self, scan: &Scan) -> VelocityCommand {
        self.as_navigator_mut().plan(scan)
    }

    fn reset(&mut self) {
        self.as_navigator_mut().reset();
    }

    fn get_name(&self) -> &'static str {
        self.as_navigator().get_name()
    }
}
