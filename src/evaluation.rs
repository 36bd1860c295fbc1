//! # Evaluation モジュール
//!
//! ナビゲーション設定を1エピソード走らせ、終了条件と評価値を求めます。
//!
//! ## 終了条件（判定順）
//!
//! 1. **衝突**: スコア = +∞（失格）
//! 2. **周回完了**: 最小周回距離以上を走行し、開始地点の半径内に戻った。スコア = 経過時間
//! 3. **停滞**: 一定時間、基準点から閾値以上動かなかった
//! 4. **時間上限**: シミュレーション時間、または（設定時のみ）実時間の上限に達した
//!
//! 3と4のスコアは `max_sim_time + shortfall_penalty · max(0, min_lap_distance − 走行距離)` です。
//! スコアは小さいほど良く、外部の最適化器はこの値を最小化します。

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::{
    common::{ensure_non_negative, ensure_positive},
    ConfigError, LidarConfig, NavigationConfig, OccupancyMap, Pose2D, VehicleFootprint,
};
use crate::simulation::{Simulation, TelemetryCallback};

/// 評価設定
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// 時間刻み（秒）
    pub dt: f64,
    /// シミュレーション時間の上限（秒）
    pub max_sim_time: f64,
    /// 実時間の上限（秒）、未設定なら無効
    pub wall_clock_cap: Option<f64>,
    /// 周回判定の半径（メートル）
    pub lap_detection_radius: f64,
    /// 周回とみなす最小走行距離（メートル）
    pub min_lap_distance: f64,
    /// 停滞とみなす時間（秒）
    pub immobility_timeout: f64,
    /// 停滞判定の移動量閾値（メートル）
    pub immobility_distance: f64,
    /// 不足距離1メートルあたりのペナルティ（秒）
    pub shortfall_penalty: f64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            dt: 0.05,
            max_sim_time: 60.0,
            wall_clock_cap: None,
            lap_detection_radius: 0.5,
            min_lap_distance: 5.0,
            immobility_timeout: 5.0,
            immobility_distance: 0.05,
            shortfall_penalty: 1.0,
        }
    }
}

impl EvaluatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(ConfigError::InvalidTimeStep(self.dt));
        }
        ensure_positive("max_sim_time", self.max_sim_time)?;
        if let Some(cap) = self.wall_clock_cap {
            ensure_positive("wall_clock_cap", cap)?;
        }
        ensure_positive("lap_detection_radius", self.lap_detection_radius)?;
        ensure_non_negative("min_lap_distance", self.min_lap_distance)?;
        ensure_positive("immobility_timeout", self.immobility_timeout)?;
        ensure_non_negative("immobility_distance", self.immobility_distance)?;
        ensure_non_negative("shortfall_penalty", self.shortfall_penalty)?;
        Ok(())
    }

    /// シミュレーション時間上限に対応するステップ数
    pub fn max_steps(&self) -> u64 {
        (self.max_sim_time / self.dt - 1e-9).ceil().max(1.0) as u64
    }

    /// 周回未完了時の評価値
    pub fn penalized_score(&self, distance_traveled: f64) -> f64 {
        let shortfall = (self.min_lap_distance - distance_traveled).max(0.0);
        self.max_sim_time + self.shortfall_penalty * shortfall
    }
}

/// エピソードの終了理由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Collision,
    LapCompleted,
    Immobile,
    SimTimeLimit,
    WallClockLimit,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TerminationReason::Collision => "衝突",
            TerminationReason::LapCompleted => "周回完了",
            TerminationReason::Immobile => "停滞",
            TerminationReason::SimTimeLimit => "シミュレーション時間上限",
            TerminationReason::WallClockLimit => "実時間上限",
        };
        write!(f, "{}", label)
    }
}

/// 1エピソードの評価結果
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpisodeMetrics {
    /// 経過シミュレーション時間（秒）
    pub elapsed_sim_time: f64,
    /// 累積走行距離（メートル）
    pub distance_traveled: f64,
    pub collided: bool,
    pub lap_completed: bool,
    /// 評価値（小さいほど良い、衝突は+∞）
    pub score: f64,
    pub termination: TerminationReason,
    pub steps: u64,
}

impl EpisodeMetrics {
    /// 順位付け用スコア（大きいほど良い）
    ///
    /// 衝突は -1000、周回未完了は -1000 + 走行距離、周回完了は 10000 − 10 × 周回時間。
    pub fn ranking_score(&self) -> f64 {
        if self.collided {
            -1000.0
        } else if self.lap_completed {
            10000.0 - 10.0 * self.elapsed_sim_time
        } else {
            -1000.0 + self.distance_traveled
        }
    }
}

/// 評価エラー
#[derive(Debug)]
pub enum EvaluationError {
    /// 設定が不正
    Config(ConfigError),
    /// ワーカータスクが異常終了した
    Worker(String),
    /// 非同期ランタイムの構築に失敗した
    Runtime(std::io::Error),
}

impl std::fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvaluationError::Config(err) => write!(f, "評価設定エラー: {}", err),
            EvaluationError::Worker(msg) => write!(f, "評価タスクが異常終了しました: {}", msg),
            EvaluationError::Runtime(err) => write!(f, "ランタイム構築エラー: {}", err),
        }
    }
}

impl std::error::Error for EvaluationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EvaluationError::Config(err) => Some(err),
            EvaluationError::Runtime(err) => Some(err),
            EvaluationError::Worker(_) => None,
        }
    }
}

impl From<ConfigError> for EvaluationError {
    fn from(err: ConfigError) -> Self {
        EvaluationError::Config(err)
    }
}

/// 周回判定
#[derive(Debug, Clone, Copy)]
pub struct LapTracker {
    start: Pose2D,
    radius: f64,
    min_distance: f64,
}

impl LapTracker {
    pub fn new(start: Pose2D, radius: f64, min_distance: f64) -> Self {
        Self { start, radius, min_distance }
    }

    /// 最小距離以上を走行し、開始地点の半径内にいれば周回完了
    pub fn is_complete(&self, pose: &Pose2D, distance_traveled: f64) -> bool {
        distance_traveled >= self.min_distance && self.start.distance_xy(pose) <= self.radius
    }
}

/// 停滞判定
///
/// 基準点から閾値を超えて移動するたびに基準点と基準時刻を更新し、
/// 基準時刻からタイムアウトが経過したら停滞とみなします。
#[derive(Debug, Clone, Copy)]
pub struct ImmobilityMonitor {
    anchor: Pose2D,
    anchor_time: f64,
    timeout: f64,
    threshold: f64,
}

impl ImmobilityMonitor {
    pub fn new(start: Pose2D, timeout: f64, threshold: f64) -> Self {
        Self {
            anchor: start,
            anchor_time: 0.0,
            timeout,
            threshold,
        }
    }

    /// 姿勢を記録し、停滞していればtrue
    pub fn update(&mut self, pose: &Pose2D, time: f64) -> bool {
        if self.anchor.distance_xy(pose) > self.threshold {
            self.anchor = *pose;
            self.anchor_time = time;
            false
        } else {
            time - self.anchor_time >= self.timeout
        }
    }
}

/// エピソード評価器
///
/// 地図は `Arc` で共有されるため、複製は安価です。各エピソードは独自の
/// 車両・センサー・戦略状態を持ち、同じ入力に対して同じ結果を返します。
#[derive(Debug, Clone)]
pub struct Evaluator {
    map: Arc<OccupancyMap>,
    start_pose: Pose2D,
    lidar: LidarConfig,
    footprint: VehicleFootprint,
    config: EvaluatorConfig,
}

impl Evaluator {
    /// 新しい評価器を作成します
    ///
    /// # 引数
    ///
    /// * `map` - 共有される地図
    /// * `start_pose` - エピソードの開始姿勢
    /// * `lidar` - 距離センサーの設定
    /// * `footprint` - 車両矩形
    /// * `config` - 評価設定
    ///
    /// # 戻り値
    ///
    /// 検証済みの評価器、設定が不正な場合は `ConfigError`
    pub fn new(
        map: Arc<OccupancyMap>,
        start_pose: Pose2D,
        lidar: LidarConfig,
        footprint: VehicleFootprint,
        config: EvaluatorConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        lidar.validate()?;
        VehicleFootprint::new(footprint.length, footprint.width)?;

        Ok(Self {
            map,
            start_pose,
            lidar,
            footprint,
            config,
        })
    }

    pub fn start_pose(&self) -> Pose2D {
        self.start_pose
    }

    /// 1エピソードを評価
    pub fn evaluate(&self, navigation: &NavigationConfig) -> Result<EpisodeMetrics, EvaluationError> {
        self.run_episode(navigation, None)
    }

    /// テレメトリを受け取りながら1エピソードを評価
    pub fn evaluate_with_telemetry(
        &self,
        navigation: &NavigationConfig,
        callback: TelemetryCallback,
    ) -> Result<EpisodeMetrics, EvaluationError> {
        self.run_episode(navigation, Some(callback))
    }

    fn run_episode(
        &self,
        navigation: &NavigationConfig,
        telemetry: Option<TelemetryCallback>,
    ) -> Result<EpisodeMetrics, EvaluationError> {
        let config = &self.config;
        let mut sim = Simulation::new(
            Arc::clone(&self.map),
            self.start_pose,
            self.lidar,
            self.footprint,
            navigation,
        )?;
        if let Some(callback) = telemetry {
            sim.set_telemetry(callback);
        }

        let lap = LapTracker::new(self.start_pose, config.lap_detection_radius, config.min_lap_distance);
        let mut immobility =
            ImmobilityMonitor::new(self.start_pose, config.immobility_timeout, config.immobility_distance);
        let max_steps = config.max_steps();
        let started = Instant::now();

        info!(
            "エピソード開始: {} (開始姿勢: {:.2}, {:.2}, {:.2}rad)",
            navigation.name(),
            self.start_pose.x,
            self.start_pose.y,
            self.start_pose.theta
        );

        let termination = loop {
            let tick = sim.step(config.dt)?;

            if tick.collided {
                break TerminationReason::Collision;
            }
            if lap.is_complete(&tick.pose, sim.distance_traveled()) {
                break TerminationReason::LapCompleted;
            }
            if immobility.update(&tick.pose, sim.time()) {
                break TerminationReason::Immobile;
            }
            if sim.step_count() >= max_steps {
                break TerminationReason::SimTimeLimit;
            }
            if let Some(cap) = config.wall_clock_cap {
                if started.elapsed().as_secs_f64() >= cap {
                    warn!("実時間上限 {:.1}秒 に達しました", cap);
                    break TerminationReason::WallClockLimit;
                }
            }

            if sim.step_count() % 200 == 0 {
                debug!(
                    "進行状況: {:.1}秒 走行距離 {:.2}m",
                    sim.time(),
                    sim.distance_traveled()
                );
            }
        };

        let elapsed_sim_time = sim.time();
        let distance_traveled = sim.distance_traveled();
        let score = match termination {
            TerminationReason::Collision => f64::INFINITY,
            TerminationReason::LapCompleted => elapsed_sim_time,
            _ => config.penalized_score(distance_traveled),
        };

        let metrics = EpisodeMetrics {
            elapsed_sim_time,
            distance_traveled,
            collided: termination == TerminationReason::Collision,
            lap_completed: termination == TerminationReason::LapCompleted,
            score,
            termination,
            steps: sim.step_count(),
        };

        info!(
            "エピソード終了: {} 理由={} 時間={:.2}秒 距離={:.2}m スコア={:.3}",
            navigation.name(),
            termination,
            elapsed_sim_time,
            distance_traveled,
            score
        );

        Ok(metrics)
    }

    /// 複数の設定を並列に評価します
    ///
    /// 各設定はブロッキングタスクとして独立に実行され、結果は入力順に返ります。
    /// 個々の設定のエラーはその要素にのみ現れます。
    pub async fn evaluate_batch(
        &self,
        configs: &[NavigationConfig],
    ) -> Vec<Result<EpisodeMetrics, EvaluationError>> {
        let handles: Vec<_> = configs
            .iter()
            .cloned()
            .map(|navigation| {
                let evaluator = self.clone();
                tokio::task::spawn_blocking(move || evaluator.evaluate(&navigation))
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(err) => Err(EvaluationError::Worker(err.to_string())),
            };
            results.push(result);
        }
        results
    }

    /// マルチスレッドランタイムを構築して並列評価
    pub fn evaluate_batch_blocking(
        &self,
        configs: &[NavigationConfig],
    ) -> Result<Vec<Result<EpisodeMetrics, EvaluationError>>, EvaluationError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("navsim-eval")
            .build()
            .map_err(EvaluationError::Runtime)?;
        Ok(runtime.block_on(self.evaluate_batch(configs)))
    }
}
