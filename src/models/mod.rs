// 基本的なデータ型と数学ユーティリティ
pub mod common;

// センサー・衝突判定・ナビゲーションの基本インターフェース（trait）定義
pub mod traits;

// 環境と車両
pub mod occupancy_map;
pub mod lidar;
pub mod vehicle;

// ナビゲーション戦略
pub mod gap;
pub mod direct_avoidance;
pub mod follow_gap;
pub mod equidistance;
pub mod navigator;

// 便利な re-export
pub use common::*;
pub use traits::*;
pub use occupancy_map::{OccupancyMap, DEFAULT_OBSTACLE_THRESHOLD};
pub use lidar::{BeamReturn, Lidar, LidarConfig, Scan, Sector};
pub use vehicle::{CollisionDetector, Vehicle, VehicleFootprint};
pub use gap::{Gap, GapParams};
pub use direct_avoidance::{DirectAvoidance, DirectAvoidanceConfig};
pub use follow_gap::{FollowGap, FollowGapConfig, GapScoring};
pub use equidistance::{EquidistanceConfig, EquidistancePid};
pub use navigator::{NavigationConfig, NavigationStrategy};
