use crate::models::{
    common::{Pose2D, VelocityCommand},
    lidar::Scan,
    occupancy_map::OccupancyMap,
};

/// 全てのナビゲーション戦略が実装する基本インターフェース
pub trait INavigator {
    /// スキャンから次の速度指令を計算
    ///
    /// 戦略固有の内部状態（PIDの積分項など）は呼び出しごとに1回だけ更新されます。
    fn plan(&mut self, scan: &Scan) -> VelocityCommand;

    /// エピソード開始時に内部状態をリセット
    fn reset(&mut self);

    /// 戦略名の取得
    fn get_name(&self) -> &'static str;
}

/// 距離センサーのインターフェース
pub trait ISensor {
    /// 地図と姿勢からスキャンを生成
    fn sense(&self, map: &OccupancyMap, pose: &Pose2D) -> Scan;
}

/// 衝突検知のインターフェース
pub trait ICollision {
    /// 衝突判定
    fn check_collision(&self, scan: &Scan) -> bool;
}
