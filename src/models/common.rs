/// 車両の2次元姿勢（位置と方位）
///
/// 方位角は正規化されません。角度を比較する場合は
/// [`math_utils::normalize_angle`] で明示的に折り返してください。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose2D {
    pub x: f64,     // m
    pub y: f64,     // m
    pub theta: f64, // rad (反時計回りが正)
}

impl Pose2D {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }

    /// XY平面での2次元距離を計算
    pub fn distance_xy(&self, other: &Pose2D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl Default for Pose2D {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }
}

/// 車両ローカル座標系での2次元点
///
/// x軸が車両前方、y軸が車両左方向です。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalPoint {
    pub x: f64, // m
    pub y: f64, // m
}

impl LocalPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// 極座標から点を作成
    pub fn from_polar(range: f64, angle: f64) -> Self {
        Self::new(range * angle.cos(), range * angle.sin())
    }

    /// 原点からの距離
    pub fn magnitude(&self) -> f64 {
        (self.x.powi(2) + self.y.powi(2)).sqrt()
    }
}

/// 速度指令（ユニサイクルモデルの入力）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityCommand {
    pub linear: f64,  // m/s
    pub angular: f64, // rad/s
}

impl VelocityCommand {
    pub fn new(linear: f64, angular: f64) -> Self {
        Self { linear, angular }
    }

    /// 停止指令
    pub fn stop() -> Self {
        Self::new(0.0, 0.0)
    }

    /// 有限値のみで構成されているか
    pub fn is_finite(&self) -> bool {
        self.linear.is_finite() && self.angular.is_finite()
    }
}

impl Default for VelocityCommand {
    fn default() -> Self {
        Self::stop()
    }
}

/// 設定エラー
///
/// 構築時に検出される不正なパラメータを表します。値を黙って丸めることはせず、
/// 必ずこのエラーで失敗させます。
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// 解像度が正でない、または有限でない
    InvalidResolution(f64),
    /// 地図サイズが不正
    InvalidMapDimensions { width: usize, height: usize, cells: usize },
    /// 時間刻みが正でない
    InvalidTimeStep(f64),
    /// セクター範囲が不正（開始 >= 終了、または0〜360度の範囲外）
    InvalidSector { name: &'static str, start_deg: f64, end_deg: f64 },
    /// 正の値でなければならないパラメータ
    NonPositive { name: &'static str, value: f64 },
    /// 負であってはならないパラメータ
    Negative { name: &'static str, value: f64 },
    /// その他の検証エラー
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidResolution(value) => {
                write!(f, "解像度が不正です: {} (正の有限値が必要)", value)
            }
            ConfigError::InvalidMapDimensions { width, height, cells } => {
                write!(f, "地図サイズが不正です: {}x{} (セル数: {})", width, height, cells)
            }
            ConfigError::InvalidTimeStep(dt) => {
                write!(f, "時間刻みが不正です: {} (正の有限値が必要)", dt)
            }
            ConfigError::InvalidSector { name, start_deg, end_deg } => {
                write!(f, "セクター {} が不正です: {}〜{}度", name, start_deg, end_deg)
            }
            ConfigError::NonPositive { name, value } => {
                write!(f, "{} は正の値が必要です: {}", name, value)
            }
            ConfigError::Negative { name, value } => {
                write!(f, "{} は0以上が必要です: {}", name, value)
            }
            ConfigError::Invalid(msg) => write!(f, "設定検証エラー: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// 値が正の有限値であることを検証
pub fn ensure_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { name, value })
    }
}

/// 値が0以上の有限値であることを検証
pub fn ensure_non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { name, value })
    }
}

/// 数学ユーティリティ関数
pub mod math_utils {
    use std::f64::consts::{PI, TAU};

    /// 度をラジアンに変換
    pub fn deg_to_rad(degrees: f64) -> f64 {
        degrees * PI / 180.0
    }

    /// 角度を(-π, π]の範囲に正規化
    pub fn normalize_angle(angle_rad: f64) -> f64 {
        let mut normalized = angle_rad.rem_euclid(TAU);
        if normalized > PI {
            normalized -= TAU;
        }
        normalized
    }

    /// インデックスを0..lenの範囲に折り返す（負の値も可）
    pub fn wrap_index(index: i64, len: usize) -> usize {
        index.rem_euclid(len as i64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::math_utils::*;
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_normalize_angle_range() {
        assert_approx_eq!(normalize_angle(0.0), 0.0);
        assert_approx_eq!(normalize_angle(PI), PI);
        assert_approx_eq!(normalize_angle(-PI), PI);
        assert_approx_eq!(normalize_angle(3.0 * PI / 2.0), -PI / 2.0);
        assert_approx_eq!(normalize_angle(-5.0 * PI / 2.0), -PI / 2.0);

        for k in -20..20 {
            let a = normalize_angle(k as f64 * 0.7);
            assert!(a > -PI && a <= PI, "{} out of range", a);
        }
    }

    #[test]
    fn test_wrap_index() {
        assert_eq!(wrap_index(365, 360), 5);
        assert_eq!(wrap_index(-1, 360), 359);
        assert_eq!(wrap_index(0, 360), 0);
    }

    #[test]
    fn test_ensure_positive() {
        assert!(ensure_positive("dt", 0.05).is_ok());
        assert!(ensure_positive("dt", 0.0).is_err());
        assert!(ensure_positive("dt", f64::NAN).is_err());
        assert!(ensure_non_negative("margin", 0.0).is_ok());
        assert!(ensure_non_negative("margin", -0.1).is_err());
    }
}
