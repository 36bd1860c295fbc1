//! # Simulation モジュール
//!
//! 1台の車両と距離センサーによる閉ループシミュレーションの1ティック分の処理を提供します。
//!
//! グローバル状態は持たず、地図・車両・センサー・衝突判定・ナビゲーション戦略を
//! 1つのコンテキスト（[`Simulation`]）にまとめて保持します。
//!
//! ## ティック処理順序
//!
//! 1. **指令適用**: 前ティックのスキャンから計算済みの指令で姿勢を積分
//! 2. **センシング**: 新しい姿勢でスキャンを生成
//! 3. **衝突判定**: スキャンのヒット点と車両矩形を照合
//! 4. **計画**: 自律モードでは新しいスキャンから次の指令を計算
//! 5. **テレメトリ**: コールバックが設定されていれば記録を渡す
//!
//! 指令は常に1ティック遅れて適用されます。最初のティックの指令はゼロです。

use std::sync::Arc;

use tracing::{debug, trace};

use crate::models::{
    CollisionDetector, ConfigError, ICollision, INavigator, Lidar, LidarConfig, NavigationConfig,
    NavigationStrategy, OccupancyMap, Pose2D, Scan, Vehicle, VehicleFootprint, VelocityCommand,
};

/// 制御モード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    /// ナビゲーション戦略が次の指令を計算する
    Autonomous,
    /// 外部から `step_manual` で指令を与える
    Manual,
}

/// 1ティックの出力
#[derive(Debug, Clone)]
pub struct TickOutput {
    pub scan: Scan,
    pub collided: bool,
    pub pose: Pose2D,
    /// このティックで適用した指令
    pub applied_command: VelocityCommand,
}

/// 1ティック分のテレメトリ
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickTelemetry {
    /// ステップ番号（1始まり）
    pub step: u64,
    /// ティック終了時のシミュレーション時刻（秒）
    pub time: f64,
    pub pose: Pose2D,
    pub applied_command: VelocityCommand,
    /// 次のティックで適用される指令
    pub next_command: VelocityCommand,
    pub collided: bool,
    pub hit_count: usize,
    pub min_range: Option<f64>,
}

/// テレメトリ受信用コールバック
pub type TelemetryCallback = Box<dyn FnMut(&TickTelemetry) + Send>;

/// 閉ループシミュレーション
pub struct Simulation {
    map: Arc<OccupancyMap>,
    start_pose: Pose2D,
    vehicle: Vehicle,
    lidar: Lidar,
    collision: CollisionDetector,
    navigator: NavigationStrategy,
    mode: ControlMode,
    /// 次のティックで適用する指令
    pending_command: VelocityCommand,
    current_time: f64,
    step_count: u64,
    telemetry: Option<TelemetryCallback>,
}

impl Simulation {
    /// 新しいシミュレーションを作成します
    ///
    /// # 引数
    ///
    /// * `map` - 共有される占有格子地図
    /// * `start_pose` - 開始姿勢
    /// * `lidar_config` - 距離センサーの設定
    /// * `footprint` - 車両矩形
    /// * `navigation` - ナビゲーション戦略の設定
    ///
    /// # 戻り値
    ///
    /// 自律モードのシミュレーション、設定が不正な場合は `ConfigError`
    pub fn new(
        map: Arc<OccupancyMap>,
        start_pose: Pose2D,
        lidar_config: LidarConfig,
        footprint: VehicleFootprint,
        navigation: &NavigationConfig,
    ) -> Result<Self, ConfigError> {
        let mut lidar = Lidar::new(lidar_config)?;
        lidar.update(start_pose);

        Ok(Self {
            map,
            start_pose,
            vehicle: Vehicle::new(start_pose),
            lidar,
            collision: CollisionDetector::new(VehicleFootprint::new(footprint.length, footprint.width)?),
            navigator: NavigationStrategy::from_config(navigation)?,
            mode: ControlMode::Autonomous,
            pending_command: VelocityCommand::stop(),
            current_time: 0.0,
            step_count: 0,
            telemetry: None,
        })
    }

    /// テレメトリコールバックを設定
    pub fn set_telemetry(&mut self, callback: TelemetryCallback) {
        self.telemetry = Some(callback);
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    /// 制御モードを切り替え（保留中の指令は破棄）
    pub fn set_mode(&mut self, mode: ControlMode) {
        if self.mode != mode {
            debug!("制御モード切替: {:?} -> {:?}", self.mode, mode);
            self.mode = mode;
            self.pending_command = VelocityCommand::stop();
        }
    }

    pub fn pose(&self) -> Pose2D {
        self.vehicle.pose
    }

    pub fn time(&self) -> f64 {
        self.current_time
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// 開始からの累積走行距離（メートル）
    pub fn distance_traveled(&self) -> f64 {
        self.vehicle.odometer
    }

    pub fn pending_command(&self) -> VelocityCommand {
        self.pending_command
    }

    /// 1ティック進めます（保留中の指令を適用）
    ///
    /// # 引数
    ///
    /// * `dt` - 時間刻み（秒、正の有限値）
    ///
    /// # 戻り値
    ///
    /// スキャン・衝突フラグ・姿勢、`dt` が不正な場合は `ConfigError`
    pub fn step(&mut self, dt: f64) -> Result<TickOutput, ConfigError> {
        let command = self.pending_command;
        self.advance(command, dt)
    }

    /// 外部から与えた指令で1ティック進めます
    ///
    /// 保留中の指令の代わりに `command` を適用します。手動モードでは
    /// 戦略は呼ばれず、次の保留指令はゼロになります。
    pub fn step_manual(&mut self, command: VelocityCommand, dt: f64) -> Result<TickOutput, ConfigError> {
        if !command.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "manual command must be finite: ({}, {})",
                command.linear, command.angular
            )));
        }
        self.advance(command, dt)
    }

    fn advance(&mut self, command: VelocityCommand, dt: f64) -> Result<TickOutput, ConfigError> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(ConfigError::InvalidTimeStep(dt));
        }

        // 1. 指令適用
        self.vehicle.update(command, dt);
        let pose = self.vehicle.pose;

        // 2. センシング
        self.lidar.update(pose);
        let scan = self.lidar.get_scan(&self.map);

        // 3. 衝突判定
        let collided = self.collision.check_collision(&scan);

        // 4. 計画
        self.pending_command = match self.mode {
            ControlMode::Autonomous => self.navigator.plan(&scan),
            ControlMode::Manual => VelocityCommand::stop(),
        };

        self.current_time += dt;
        self.step_count += 1;

        trace!(
            "ステップ{} t={:.2}s 姿勢({:.3}, {:.3}, {:.3}) 次指令({:.2}, {:.2}) 衝突={}",
            self.step_count,
            self.current_time,
            pose.x,
            pose.y,
            pose.theta,
            self.pending_command.linear,
            self.pending_command.angular,
            collided
        );

        // 5. テレメトリ
        if let Some(callback) = self.telemetry.as_mut() {
            callback(&TickTelemetry {
                step: self.step_count,
                time: self.current_time,
                pose,
                applied_command: command,
                next_command: self.pending_command,
                collided,
                hit_count: scan.hit_count(),
                min_range: scan.min_range(),
            });
        }

        Ok(TickOutput {
            scan,
            collided,
            pose,
            applied_command: command,
        })
    }

    /// 開始状態に戻す
    ///
    /// 姿勢・保留指令・時刻・ステップ数・戦略の内部状態を初期化します。
    /// 制御モードとテレメトリコールバックは維持されます。
    pub fn reset(&mut self) {
        self.vehicle.reset(self.start_pose);
        self.lidar.update(self.start_pose);
        self.navigator.reset();
        self.pending_command = VelocityCommand::stop();
        self.current_time = 0.0;
        self.step_count = 0;
        debug!("シミュレーションをリセット: {}", self.navigator.get_name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DirectAvoidanceConfig;
    use std::sync::Mutex;

    fn room() -> Arc<OccupancyMap> {
        let cells = 100;
        let map = OccupancyMap::from_fn(cells, cells, 0.05, |col, row| {
            if col < 2 || row < 2 || col >= cells - 2 || row >= cells - 2 { 0 } else { 255 }
        })
        .unwrap();
        Arc::new(map)
    }

    fn simulation() -> Simulation {
        Simulation::new(
            room(),
            Pose2D::new(2.5, 2.5, 0.0),
            LidarConfig::default(),
            VehicleFootprint::default(),
            &NavigationConfig::DirectAvoidance(DirectAvoidanceConfig::default()),
        )
        .unwrap()
    }

    #[test]
    fn test_first_tick_applies_zero_command() {
        let mut sim = simulation();
        let tick = sim.step(0.05).unwrap();

        assert_eq!(tick.applied_command, VelocityCommand::stop());
        assert_eq!(tick.pose, Pose2D::new(2.5, 2.5, 0.0));
        assert_eq!(tick.scan.hit_count(), 360);
        assert!(!tick.collided);

        // 次のティックで計画済みの指令が適用される
        let planned = sim.pending_command();
        let tick = sim.step(0.05).unwrap();
        assert_eq!(tick.applied_command, planned);
        assert_ne!(tick.pose, Pose2D::new(2.5, 2.5, 0.0));
        assert_eq!(sim.step_count(), 2);
    }

    #[test]
    fn test_invalid_time_step_rejected() {
        let mut sim = simulation();
        assert_eq!(sim.step(0.0).unwrap_err(), ConfigError::InvalidTimeStep(0.0));
        assert!(sim.step(-0.1).is_err());
        assert!(sim.step(f64::NAN).is_err());
        assert_eq!(sim.step_count(), 0);
    }

    #[test]
    fn test_manual_mode_skips_strategy() {
        let mut sim = simulation();
        sim.set_mode(ControlMode::Manual);
        assert_eq!(sim.mode(), ControlMode::Manual);

        let tick = sim.step_manual(VelocityCommand::new(1.0, 0.0), 0.1).unwrap();
        assert_eq!(tick.applied_command, VelocityCommand::new(1.0, 0.0));
        assert!((tick.pose.x - 2.6).abs() < 1e-9);
        assert_eq!(sim.pending_command(), VelocityCommand::stop());

        assert!(sim.step_manual(VelocityCommand::new(f64::NAN, 0.0), 0.1).is_err());
    }

    #[test]
    fn test_reset_restores_start() {
        let mut sim = simulation();
        for _ in 0..10 {
            sim.step(0.05).unwrap();
        }
        sim.reset();

        assert_eq!(sim.pose(), Pose2D::new(2.5, 2.5, 0.0));
        assert_eq!(sim.time(), 0.0);
        assert_eq!(sim.step_count(), 0);
        assert_eq!(sim.distance_traveled(), 0.0);
        assert_eq!(sim.pending_command(), VelocityCommand::stop());
    }

    #[test]
    fn test_telemetry_callback_receives_each_tick() {
        let records = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&records);

        let mut sim = simulation();
        sim.set_telemetry(Box::new(move |record: &TickTelemetry| {
            sink.lock().unwrap().push(*record);
        }));
        for _ in 0..3 {
            sim.step(0.05).unwrap();
        }

        let records = records.lock().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].step, 3);
        assert_eq!(records[0].hit_count, 360);
        assert_eq!(records[1].applied_command, records[0].next_command);
    }
}
