use crate::models::{
    common::{ensure_positive, ConfigError, LocalPoint, Pose2D, VelocityCommand},
    lidar::Scan,
    traits::ICollision,
};
use tracing::trace;

/// 車両の占有矩形
///
/// 車両原点を中心とし、車両ローカル座標系の軸に沿った矩形です。
/// スキャン点は既にローカル座標なので、判定時に回転は不要です。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleFootprint {
    /// 前後方向の長さ（メートル）
    pub length: f64,
    /// 左右方向の幅（メートル）
    pub width: f64,
}

impl Default for VehicleFootprint {
    fn default() -> Self {
        Self {
            length: 0.5,
            width: 0.3,
        }
    }
}

impl VehicleFootprint {
    pub fn new(length: f64, width: f64) -> Result<Self, ConfigError> {
        ensure_positive("vehicle.length", length)?;
        ensure_positive("vehicle.width", width)?;
        Ok(Self { length, width })
    }

    /// ローカル座標の点が矩形内（境界含む）にあるか
    pub fn contains(&self, point: &LocalPoint) -> bool {
        point.x.abs() <= self.length / 2.0 && point.y.abs() <= self.width / 2.0
    }
}

/// ユニサイクルモデルの車両
///
/// 質量・滑りを持たない運動学モデルで、姿勢はティックごとに1回だけ更新されます。
#[derive(Debug, Clone)]
pub struct Vehicle {
    /// 現在の姿勢
    pub pose: Pose2D,
    /// 最後に適用した速度指令
    pub last_command: VelocityCommand,
    /// 累積走行距離（メートル）
    pub odometer: f64,
}

impl Vehicle {
    pub fn new(pose: Pose2D) -> Self {
        Self {
            pose,
            last_command: VelocityCommand::stop(),
            odometer: 0.0,
        }
    }

    /// 速度指令を時間刻み分だけ積分します
    ///
    /// 方位を先に更新し、更新後の方位で位置を進めます。
    /// 軌跡の再現性のため、この順序は変更しないでください。
    ///
    /// # 引数
    ///
    /// * `command` - 線速度・角速度
    /// * `dt` - 時間刻み（秒）
    pub fn update(&mut self, command: VelocityCommand, dt: f64) {
        let previous = self.pose;
        self.pose = integrate(&self.pose, command, dt);
        self.last_command = command;
        self.odometer += previous.distance_xy(&self.pose);

        trace!(
            "車両更新: ({:.3}, {:.3}, {:.3}rad) v={:.2} w={:.2}",
            self.pose.x, self.pose.y, self.pose.theta, command.linear, command.angular
        );
    }

    /// 指定姿勢に戻す
    pub fn reset(&mut self, pose: Pose2D) {
        self.pose = pose;
        self.last_command = VelocityCommand::stop();
        self.odometer = 0.0;
    }
}

/// ユニサイクルモデルの積分
///
/// `theta' = theta + w*dt; x' = x + v*cos(theta')*dt; y' = y + v*sin(theta')*dt`
pub fn integrate(pose: &Pose2D, command: VelocityCommand, dt: f64) -> Pose2D {
    let theta = pose.theta + command.angular * dt;
    Pose2D {
        x: pose.x + command.linear * theta.cos() * dt,
        y: pose.y + command.linear * theta.sin() * dt,
        theta,
    }
}

/// 衝突検知器
///
/// スキャンのヒット点が車両矩形内に1点でもあれば衝突とみなします。
#[derive(Debug, Clone, Copy)]
pub struct CollisionDetector {
    pub footprint: VehicleFootprint,
}

impl CollisionDetector {
    pub fn new(footprint: VehicleFootprint) -> Self {
        Self { footprint }
    }

    /// 矩形内にある最初のヒット点
    pub fn first_intrusion(&self, scan: &Scan) -> Option<LocalPoint> {
        scan.hit_points().find(|point| self.footprint.contains(point))
    }
}

impl ICollision for CollisionDetector {
    fn check_collision(&self, scan: &Scan) -> bool {
        match self.first_intrusion(scan) {
            Some(point) => {
                trace!("衝突検知: 点 ({:.3}, {:.3}) が車両矩形内", point.x, point.y);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::lidar::BeamReturn;
    use assert_approx_eq::assert_approx_eq;
    use std::f64::consts::PI;

    fn single_point_scan(point: LocalPoint) -> Scan {
        let mut returns = vec![BeamReturn::NoHit; 360];
        returns[0] = BeamReturn::Hit(point);
        Scan::new(returns)
    }

    #[test]
    fn test_straight_line_without_rotation() {
        let mut vehicle = Vehicle::new(Pose2D::new(1.0, 2.0, PI / 4.0));
        let command = VelocityCommand::new(1.5, 0.0);
        for _ in 0..100 {
            vehicle.update(command, 0.02);
        }

        // T = 2秒、距離 3m
        let expected = 3.0 / 2f64.sqrt();
        assert_approx_eq!(vehicle.pose.x, 1.0 + expected, 1e-9);
        assert_approx_eq!(vehicle.pose.y, 2.0 + expected, 1e-9);
        assert_approx_eq!(vehicle.pose.theta, PI / 4.0);
        assert_approx_eq!(vehicle.odometer, 3.0, 1e-9);
    }

    #[test]
    fn test_rotation_in_place() {
        let mut vehicle = Vehicle::new(Pose2D::new(1.0, 2.0, 0.0));
        let command = VelocityCommand::new(0.0, 0.5);
        for step in 1..=50 {
            vehicle.update(command, 0.1);
            assert_eq!(vehicle.pose.x, 1.0);
            assert_eq!(vehicle.pose.y, 2.0);
            assert_approx_eq!(vehicle.pose.theta, 0.05 * step as f64, 1e-12);
        }
        // 方位は正規化されない
        assert_approx_eq!(vehicle.pose.theta, 2.5, 1e-12);
    }

    #[test]
    fn test_heading_updates_before_position() {
        let pose = integrate(&Pose2D::new(0.0, 0.0, 0.0), VelocityCommand::new(1.0, PI / 2.0), 1.0);
        assert_approx_eq!(pose.theta, PI / 2.0);
        assert_approx_eq!(pose.x, 0.0);
        assert_approx_eq!(pose.y, 1.0);
    }

    #[test]
    fn test_collision_inside_footprint() {
        let detector = CollisionDetector::new(VehicleFootprint::new(0.5, 0.3).unwrap());
        assert!(detector.check_collision(&single_point_scan(LocalPoint::new(0.1, 0.0))));
        assert!(!detector.check_collision(&single_point_scan(LocalPoint::new(0.4, 0.2))));
        // 境界上は衝突
        assert!(detector.check_collision(&single_point_scan(LocalPoint::new(0.25, -0.15))));
    }

    #[test]
    fn test_no_hit_samples_never_collide() {
        let detector = CollisionDetector::new(VehicleFootprint::default());
        let scan = Scan::new(vec![BeamReturn::NoHit; 360]);
        assert!(!detector.check_collision(&scan));
    }

    #[test]
    fn test_genuine_hit_at_origin_collides() {
        let detector = CollisionDetector::new(VehicleFootprint::default());
        assert!(detector.check_collision(&single_point_scan(LocalPoint::new(0.0, 0.0))));
    }

    #[test]
    fn test_footprint_validation() {
        assert!(VehicleFootprint::new(0.0, 0.3).is_err());
        assert!(VehicleFootprint::new(0.5, -0.3).is_err());
    }
}
