use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::models::{
    common::{ensure_non_negative, ensure_positive, math_utils, ConfigError, LocalPoint, Pose2D},
    occupancy_map::OccupancyMap,
    traits::ISensor,
};

/// 1本のビームの計測結果
///
/// 「障害物なし」は明示的な `NoHit` で表し、原点 (0, 0) のヒットと区別します。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BeamReturn {
    /// 車両ローカル座標系でのヒット点
    Hit(LocalPoint),
    /// 最大距離内に障害物なし、またはビームが地図外に出た
    NoHit,
}

impl BeamReturn {
    /// ヒット点までの距離（NoHitの場合はNone）
    pub fn range(&self) -> Option<f64> {
        match self {
            BeamReturn::Hit(point) => Some(point.magnitude()),
            BeamReturn::NoHit => None,
        }
    }

    pub fn point(&self) -> Option<LocalPoint> {
        match self {
            BeamReturn::Hit(point) => Some(*point),
            BeamReturn::NoHit => None,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, BeamReturn::Hit(_))
    }
}

/// 1ティック分のスキャン
///
/// インデックス0が車両前方、以降は反時計回りに等間隔で並びます。
#[derive(Debug, Clone, PartialEq)]
pub struct Scan {
    returns: Vec<BeamReturn>,
    angle_increment: f64,
}

impl Scan {
    /// ビーム結果の列からスキャンを作成（角度間隔は 2π/N）
    pub fn new(returns: Vec<BeamReturn>) -> Self {
        let angle_increment = if returns.is_empty() {
            0.0
        } else {
            TAU / returns.len() as f64
        };
        Self { returns, angle_increment }
    }

    /// 距離の列から合成スキャンを作成します
    ///
    /// テストや外部データの取り込み用です。`None` はNoHitになります。
    ///
    /// # 引数
    ///
    /// * `ranges` - ビームごとの距離（メートル）
    ///
    /// # 戻り値
    ///
    /// ローカル座標に変換済みのスキャン
    pub fn from_ranges(ranges: &[Option<f64>]) -> Self {
        let increment = if ranges.is_empty() { 0.0 } else { TAU / ranges.len() as f64 };
        let returns = ranges
            .iter()
            .enumerate()
            .map(|(i, range)| match range {
                Some(r) => BeamReturn::Hit(LocalPoint::from_polar(*r, i as f64 * increment)),
                None => BeamReturn::NoHit,
            })
            .collect();
        Self::new(returns)
    }

    pub fn len(&self) -> usize {
        self.returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }

    pub fn angle_increment(&self) -> f64 {
        self.angle_increment
    }

    pub fn returns(&self) -> &[BeamReturn] {
        &self.returns
    }

    pub fn get(&self, index: usize) -> Option<&BeamReturn> {
        self.returns.get(index)
    }

    /// ビームの距離（NoHitまたは範囲外はNone）
    pub fn range(&self, index: usize) -> Option<f64> {
        self.returns.get(index).and_then(BeamReturn::range)
    }

    /// 度数をビームインデックスに変換（360度 → N）
    pub fn degrees_to_index(&self, degrees: f64) -> i64 {
        (degrees * self.returns.len() as f64 / 360.0).round() as i64
    }

    /// 全ビームの距離を返し、NoHitは `fill` で埋める
    pub fn ranges_or(&self, fill: f64) -> Vec<f64> {
        self.returns
            .iter()
            .map(|beam| beam.range().unwrap_or(fill))
            .collect()
    }

    /// ヒット点のみを列挙
    pub fn hit_points(&self) -> impl Iterator<Item = LocalPoint> + '_ {
        self.returns.iter().filter_map(BeamReturn::point)
    }

    pub fn hit_count(&self) -> usize {
        self.returns.iter().filter(|beam| beam.is_hit()).count()
    }

    /// 最も近いヒットまでの距離
    pub fn min_range(&self) -> Option<f64> {
        self.returns
            .iter()
            .filter_map(BeamReturn::range)
            .fold(None, |acc: Option<f64>, r| Some(acc.map_or(r, |m| m.min(r))))
    }
}

/// 度数で指定するスキャンのセクター
///
/// `start_deg` から `end_deg`（含まない）までのビームを対象とします。
/// インデックスは `round(deg · N / 360)` で求め、Nで折り返します。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sector {
    pub start_deg: f64,
    pub end_deg: f64,
}

impl Sector {
    pub fn new(start_deg: f64, end_deg: f64) -> Self {
        Self { start_deg, end_deg }
    }

    /// 0 <= start < end <= 360 であることを検証
    pub fn validate(&self, name: &'static str) -> Result<(), ConfigError> {
        let valid = self.start_deg.is_finite()
            && self.end_deg.is_finite()
            && self.start_deg >= 0.0
            && self.start_deg < self.end_deg
            && self.end_deg <= 360.0;
        if valid {
            Ok(())
        } else {
            Err(ConfigError::InvalidSector {
                name,
                start_deg: self.start_deg,
                end_deg: self.end_deg,
            })
        }
    }

    /// セクターに含まれるビームインデックスを列挙
    pub fn indices(&self, scan: &Scan) -> impl Iterator<Item = usize> {
        let len = scan.len();
        let (start, end) = if len == 0 {
            (0, 0)
        } else {
            (scan.degrees_to_index(self.start_deg), scan.degrees_to_index(self.end_deg))
        };
        (start..end).map(move |i| math_utils::wrap_index(i, len))
    }

    /// セクター内の最小距離（ヒットがなければ+∞）
    pub fn min_range(&self, scan: &Scan) -> f64 {
        self.indices(scan)
            .filter_map(|i| scan.range(i))
            .fold(f64::INFINITY, f64::min)
    }
}

/// ライダー設定
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LidarConfig {
    /// ビーム数
    pub num_beams: usize,
    /// 最小計測距離（メートル）
    pub min_range: f64,
    /// 最大計測距離（メートル）
    pub max_range: f64,
}

impl Default for LidarConfig {
    fn default() -> Self {
        Self {
            num_beams: 360,
            min_range: 0.1,
            max_range: 5.0,
        }
    }
}

impl LidarConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_beams == 0 {
            return Err(ConfigError::Invalid("num_beams must be positive".to_string()));
        }
        ensure_non_negative("min_range", self.min_range)?;
        ensure_positive("max_range", self.max_range)?;
        if self.max_range <= self.min_range {
            return Err(ConfigError::Invalid(format!(
                "max_range ({}) must exceed min_range ({})",
                self.max_range, self.min_range
            )));
        }
        Ok(())
    }
}

/// 回転式距離センサー
///
/// 各ビームについて格子1セル刻みでレイマーチングを行い、最初に当たった障害物を
/// 車両ローカル座標のヒット点として返します。保持する状態は最後に更新された姿勢のみで、
/// スキャンは (地図, 姿勢) の純粋関数です。
#[derive(Debug, Clone)]
pub struct Lidar {
    config: LidarConfig,
    /// 最後に更新された姿勢
    pose: Pose2D,
}

impl Lidar {
    /// 新しいライダーを作成します
    ///
    /// # 引数
    ///
    /// * `config` - ビーム数と計測距離
    ///
    /// # 戻り値
    ///
    /// 検証済みのライダー、設定が不正な場合は `ConfigError`
    pub fn new(config: LidarConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            pose: Pose2D::default(),
        })
    }

    /// ライダーの姿勢を更新
    pub fn update(&mut self, pose: Pose2D) {
        self.pose = pose;
    }

    /// 現在の姿勢でスキャンを取得
    pub fn get_scan(&self, map: &OccupancyMap) -> Scan {
        self.sense(map, &self.pose)
    }

    /// 1本のビームをマーチングし、ヒット距離を返す
    ///
    /// 格子外に出た時点、または最大距離に達した時点でNoneを返します。
    fn march_beam(&self, map: &OccupancyMap, origin: (f64, f64), bearing: f64) -> Option<f64> {
        let resolution = map.resolution();
        let first_step = (self.config.min_range / resolution) as usize;
        let last_step = (self.config.max_range / resolution) as usize;
        let (cos_a, sin_a) = (bearing.cos(), bearing.sin());

        for r in first_step..last_step {
            let step = r as f64;
            let col = (origin.0 + step * cos_a).floor() as i64;
            // 画像の行は下向きなのでsinの符号を反転
            let row = (origin.1 - step * sin_a).floor() as i64;

            if !map.contains_cell(col, row) {
                return None;
            }
            if map.is_obstacle(col as usize, row as usize) {
                return Some(step * resolution);
            }
        }

        None
    }
}

impl ISensor for Lidar {
    fn sense(&self, map: &OccupancyMap, pose: &Pose2D) -> Scan {
        let num_beams = self.config.num_beams;
        let increment = TAU / num_beams as f64;

        // 車両位置をセル座標（連続値）に変換
        let origin = (
            pose.x / map.resolution(),
            map.height() as f64 - pose.y / map.resolution(),
        );

        let returns = (0..num_beams)
            .map(|i| {
                let local_angle = i as f64 * increment;
                match self.march_beam(map, origin, pose.theta + local_angle) {
                    Some(range) => BeamReturn::Hit(LocalPoint::from_polar(range, local_angle)),
                    None => BeamReturn::NoHit,
                }
            })
            .collect();

        Scan {
            returns,
            angle_increment: increment,
        }
    }
}
