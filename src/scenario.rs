use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::evaluation::{Evaluator, EvaluatorConfig};
use crate::map_loader::{self, MapLoadError, MapSource};
use crate::models::{
    common::math_utils, ConfigError, LidarConfig, NavigationConfig, OccupancyMap, Pose2D,
    VehicleFootprint,
};

/// シナリオメタデータ
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioMeta {
    pub version: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// 開始姿勢
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct StartPose {
    pub x_m: f64,
    pub y_m: f64,
    #[serde(default)]
    pub heading_deg: f64,
}

impl StartPose {
    pub fn to_pose(&self) -> Pose2D {
        Pose2D::new(self.x_m, self.y_m, math_utils::deg_to_rad(self.heading_deg))
    }
}

fn default_length_m() -> f64 {
    0.5
}

fn default_width_m() -> f64 {
    0.3
}

/// 車両設定
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct VehicleSection {
    pub start: StartPose,
    #[serde(default = "default_length_m")]
    pub length_m: f64,
    #[serde(default = "default_width_m")]
    pub width_m: f64,
}

impl VehicleSection {
    pub fn footprint(&self) -> VehicleFootprint {
        VehicleFootprint {
            length: self.length_m,
            width: self.width_m,
        }
    }
}

/// ライダー設定
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct LidarSection {
    pub num_beams: usize,
    pub min_range_m: f64,
    pub max_range_m: f64,
}

impl Default for LidarSection {
    fn default() -> Self {
        let defaults = LidarConfig::default();
        Self {
            num_beams: defaults.num_beams,
            min_range_m: defaults.min_range,
            max_range_m: defaults.max_range,
        }
    }
}

impl LidarSection {
    pub fn to_config(&self) -> LidarConfig {
        LidarConfig {
            num_beams: self.num_beams,
            min_range: self.min_range_m,
            max_range: self.max_range_m,
        }
    }
}

/// 完全なシナリオ設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioConfig {
    pub meta: ScenarioMeta,
    pub map: MapSource,
    pub vehicle: VehicleSection,
    #[serde(default)]
    pub lidar: LidarSection,
    #[serde(default)]
    pub evaluation: EvaluatorConfig,
    /// 評価するナビゲーション設定（1つ以上）
    pub navigation: Vec<NavigationConfig>,
}

impl ScenarioConfig {
    /// YAMLファイルからシナリオ設定を読み込み
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();

        // ファイル存在チェック
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.to_path_buf()));
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| ScenarioError::IoError(path.to_path_buf(), e))?;

        let config: ScenarioConfig = serde_yaml::from_str(&contents)
            .map_err(|e| ScenarioError::ParseError(path.to_path_buf(), e))?;

        config.validate()?;

        Ok(config)
    }

    /// YAML文字列からシナリオ設定を読み込み
    pub fn from_yaml_str(contents: &str) -> Result<Self, ScenarioError> {
        let config: ScenarioConfig = serde_yaml::from_str(contents)
            .map_err(|e| ScenarioError::ParseError(Path::new("<inline>").to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// 設定の基本的な検証
    pub fn validate(&self) -> Result<(), ScenarioError> {
        let start = &self.vehicle.start;
        if !(start.x_m.is_finite() && start.y_m.is_finite() && start.heading_deg.is_finite()) {
            return Err(ScenarioError::ValidationError("start pose must be finite".to_string()));
        }
        if !(self.map.resolution.is_finite() && self.map.resolution > 0.0) {
            return Err(ScenarioError::ValidationError("map resolution must be positive".to_string()));
        }

        VehicleFootprint::new(self.vehicle.length_m, self.vehicle.width_m)?;
        self.lidar.to_config().validate()?;
        self.evaluation.validate()?;

        if self.navigation.is_empty() {
            return Err(ScenarioError::ValidationError(
                "at least one navigation config is required".to_string(),
            ));
        }
        for (index, navigation) in self.navigation.iter().enumerate() {
            navigation.validate().map_err(|e| {
                ScenarioError::ValidationError(format!("navigation[{}] ({}): {}", index, navigation.name(), e))
            })?;
        }

        Ok(())
    }

    /// 地図を読み込み（相対パスは `base_dir` 基準）
    pub fn load_map(&self, base_dir: &Path) -> Result<Arc<OccupancyMap>, ScenarioError> {
        let map = map_loader::load_source(&self.map, base_dir)?;

        let start = self.vehicle.start.to_pose();
        if map.world_to_cell(start.x, start.y).is_none() {
            return Err(ScenarioError::ValidationError(format!(
                "start pose ({}, {}) outside map bounds {:.1}x{:.1}m",
                start.x,
                start.y,
                map.width_m(),
                map.height_m()
            )));
        }
        if map.is_obstacle_at(start.x, start.y) {
            return Err(ScenarioError::ValidationError(format!(
                "start pose ({}, {}) is inside an obstacle",
                start.x, start.y
            )));
        }

        Ok(Arc::new(map))
    }

    /// 地図を共有する評価器を作成
    pub fn build_evaluator(&self, map: Arc<OccupancyMap>) -> Result<Evaluator, ScenarioError> {
        let evaluator = Evaluator::new(
            map,
            self.vehicle.start.to_pose(),
            self.lidar.to_config(),
            self.vehicle.footprint(),
            self.evaluation,
        )?;
        Ok(evaluator)
    }

    /// シナリオの概要を表示
    pub fn print_summary(&self) {
        println!("=== シナリオ情報 ===");
        println!("名前: {}", self.meta.name);
        println!("説明: {}", self.meta.description);
        println!("バージョン: {}", self.meta.version);
        println!();

        println!("=== 地図・車両 ===");
        println!("地図: {} ({:.3}m/セル)", self.map.image.display(), self.map.resolution);
        let start = &self.vehicle.start;
        println!("開始姿勢: ({:.2}, {:.2}) {:.1}度", start.x_m, start.y_m, start.heading_deg);
        println!("車両サイズ: {:.2} x {:.2}m", self.vehicle.length_m, self.vehicle.width_m);
        println!(
            "ライダー: {}本 {:.2}〜{:.2}m",
            self.lidar.num_beams, self.lidar.min_range_m, self.lidar.max_range_m
        );
        println!();

        println!("=== 評価設定 ===");
        println!("時間刻み: {:.3}秒", self.evaluation.dt);
        println!("最大時間: {:.1}秒", self.evaluation.max_sim_time);
        println!("最小周回距離: {:.1}m", self.evaluation.min_lap_distance);
        println!();

        println!("=== ナビゲーション設定 ===");
        for (index, navigation) in self.navigation.iter().enumerate() {
            println!("  [{}] {}", index, navigation.name());
        }
    }
}

/// シナリオ読み込みエラー
#[derive(Debug)]
pub enum ScenarioError {
    FileNotFound(std::path::PathBuf),
    IoError(std::path::PathBuf, std::io::Error),
    ParseError(std::path::PathBuf, serde_yaml::Error),
    ValidationError(String),
    MapLoad(MapLoadError),
}

impl std::fmt::Display for ScenarioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScenarioError::FileNotFound(path) => {
                write!(f, "シナリオファイルが見つかりません: {}", path.display())
            }
            ScenarioError::IoError(path, err) => {
                write!(f, "ファイル読み込みエラー {}: {}", path.display(), err)
            }
            ScenarioError::ParseError(path, err) => {
                write!(f, "YAML解析エラー {}: {}", path.display(), err)
            }
            ScenarioError::ValidationError(msg) => {
                write!(f, "設定検証エラー: {}", msg)
            }
            ScenarioError::MapLoad(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ScenarioError {}

impl From<ConfigError> for ScenarioError {
    fn from(err: ConfigError) -> Self {
        ScenarioError::ValidationError(err.to_string())
    }
}

impl From<MapLoadError> for ScenarioError {
    fn from(err: MapLoadError) -> Self {
        ScenarioError::MapLoad(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
meta:
  version: "1.0"
  name: test
map:
  image: track.pgm
  resolution: 0.05
vehicle:
  start: { x_m: 4.0, y_m: 1.5 }
evaluation:
  max_sim_time: 30.0
navigation:
  - strategy: direct_avoidance
  - strategy: equidistance_pid
    kp: 0.8
"#;

    #[test]
    fn test_parse_with_defaults() {
        let config = ScenarioConfig::from_yaml_str(SCENARIO).unwrap();

        assert_eq!(config.map.obstacle_threshold, 128);
        assert_eq!(config.vehicle.length_m, 0.5);
        assert_eq!(config.lidar.num_beams, 360);
        assert_eq!(config.evaluation.max_sim_time, 30.0);
        assert_eq!(config.evaluation.dt, 0.05);
        assert_eq!(config.navigation.len(), 2);
        assert_eq!(config.navigation[1].name(), "equidistance_pid");
        assert_eq!(config.vehicle.start.to_pose(), Pose2D::new(4.0, 1.5, 0.0));
    }

    #[test]
    fn test_empty_navigation_rejected() {
        let yaml = SCENARIO.split("navigation:").next().unwrap().to_string() + "navigation: []\n";
        assert!(matches!(
            ScenarioConfig::from_yaml_str(&yaml),
            Err(ScenarioError::ValidationError(_))
        ));
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let yaml = SCENARIO.replace("max_sim_time: 30.0", "max_sim_time: -1.0");
        assert!(ScenarioConfig::from_yaml_str(&yaml).is_err());

        let yaml = SCENARIO.replace("kp: 0.8", "kp: 0.8\n    max_linear_speed: 0.0");
        let err = ScenarioConfig::from_yaml_str(&yaml).unwrap_err();
        assert!(err.to_string().contains("navigation[1]"));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ScenarioConfig::from_file("no/such/scenario.yaml"),
            Err(ScenarioError::FileNotFound(_))
        ));
    }
}
