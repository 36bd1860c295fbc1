use crate::models::common::ConfigError;

/// 障害物判定のデフォルト閾値（8bit輝度の約50%）
pub const DEFAULT_OBSTACLE_THRESHOLD: u8 = 128;

/// 占有格子地図
///
/// ラスタ画像の輝度値を閾値処理した二値の格子地図です。
/// 行0が地図の最大Y側に対応します（行優先、Y軸反転）。
/// 読み込み後は変更されないため、`Arc` で複数のシミュレーションから共有できます。
#[derive(Debug, Clone)]
pub struct OccupancyMap {
    /// 横方向のセル数
    width: usize,
    /// 縦方向のセル数
    height: usize,
    /// セルあたりのメートル数
    resolution: f64,
    /// 行優先の輝度値（0=黒, 255=白）
    intensities: Vec<u8>,
    /// この値未満の輝度を障害物とみなす
    obstacle_threshold: u8,
}

impl OccupancyMap {
    /// 輝度バッファから地図を作成します
    ///
    /// # 引数
    ///
    /// * `width` - 横方向のセル数
    /// * `height` - 縦方向のセル数
    /// * `resolution` - セルあたりのメートル数（正の有限値）
    /// * `intensities` - 行優先の輝度値（長さ width × height）
    /// * `obstacle_threshold` - 障害物判定閾値
    ///
    /// # 戻り値
    ///
    /// 検証済みの地図、パラメータが不正な場合は `ConfigError`
    pub fn new(
        width: usize,
        height: usize,
        resolution: f64,
        intensities: Vec<u8>,
        obstacle_threshold: u8,
    ) -> Result<Self, ConfigError> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(ConfigError::InvalidResolution(resolution));
        }
        if width == 0 || height == 0 || intensities.len() != width * height {
            return Err(ConfigError::InvalidMapDimensions {
                width,
                height,
                cells: intensities.len(),
            });
        }

        Ok(Self {
            width,
            height,
            resolution,
            intensities,
            obstacle_threshold,
        })
    }

    /// セル座標（列, 行）から輝度を生成する関数で地図を作成
    pub fn from_fn<F>(width: usize, height: usize, resolution: f64, mut f: F) -> Result<Self, ConfigError>
    where
        F: FnMut(usize, usize) -> u8,
    {
        let mut intensities = Vec::with_capacity(width * height);
        for row in 0..height {
            for col in 0..width {
                intensities.push(f(col, row));
            }
        }
        Self::new(width, height, resolution, intensities, DEFAULT_OBSTACLE_THRESHOLD)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// 地図の幅（メートル）
    pub fn width_m(&self) -> f64 {
        self.width as f64 * self.resolution
    }

    /// 地図の高さ（メートル）
    pub fn height_m(&self) -> f64 {
        self.height as f64 * self.resolution
    }

    /// セルの輝度値を取得（範囲外はNone）
    pub fn intensity(&self, col: usize, row: usize) -> Option<u8> {
        if col < self.width && row < self.height {
            Some(self.intensities[row * self.width + col])
        } else {
            None
        }
    }

    /// 符号付きセル座標が格子内かどうか
    #[inline]
    pub fn contains_cell(&self, col: i64, row: i64) -> bool {
        col >= 0 && row >= 0 && (col as usize) < self.width && (row as usize) < self.height
    }

    /// セルが障害物かどうか（範囲外はfalse）
    #[inline]
    pub fn is_obstacle(&self, col: usize, row: usize) -> bool {
        self.intensity(col, row)
            .map(|value| value < self.obstacle_threshold)
            .unwrap_or(false)
    }

    /// メートル座標をセル座標に変換
    ///
    /// 行0が最大Y側になるようにY軸を反転します。格子外の場合はNone。
    pub fn world_to_cell(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let col = (x / self.resolution).floor() as i64;
        let row = (self.height as f64 - y / self.resolution).floor() as i64;

        if self.contains_cell(col, row) {
            Some((col as usize, row as usize))
        } else {
            None
        }
    }

    /// メートル座標が障害物上にあるか（格子外はfalse）
    pub fn is_obstacle_at(&self, x: f64, y: f64) -> bool {
        self.world_to_cell(x, y)
            .map(|(col, row)| self.is_obstacle(col, row))
            .unwrap_or(false)
    }

    /// 障害物セル数
    pub fn obstacle_count(&self) -> usize {
        self.intensities
            .iter()
            .filter(|&&value| value < self.obstacle_threshold)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_resolution() {
        assert_eq!(
            OccupancyMap::new(2, 2, 0.0, vec![255; 4], 128).unwrap_err(),
            ConfigError::InvalidResolution(0.0)
        );
        assert!(OccupancyMap::new(2, 2, -0.05, vec![255; 4], 128).is_err());
        assert!(OccupancyMap::new(2, 2, f64::INFINITY, vec![255; 4], 128).is_err());
    }

    #[test]
    fn test_rejects_mismatched_buffer() {
        assert!(matches!(
            OccupancyMap::new(3, 2, 0.1, vec![255; 5], 128),
            Err(ConfigError::InvalidMapDimensions { width: 3, height: 2, cells: 5 })
        ));
        assert!(OccupancyMap::new(0, 0, 0.1, vec![], 128).is_err());
    }

    #[test]
    fn test_world_to_cell_flips_y() {
        let map = OccupancyMap::from_fn(100, 50, 0.1, |_, _| 255).unwrap();

        // 行0は最大Y側
        assert_eq!(map.world_to_cell(0.05, 4.95), Some((0, 0)));
        // 左下
        assert_eq!(map.world_to_cell(0.05, 0.05), Some((0, 49)));
        assert_eq!(map.world_to_cell(5.0, 2.5), Some((50, 25)));

        assert_eq!(map.world_to_cell(-0.01, 1.0), None);
        assert_eq!(map.world_to_cell(1.0, 5.01), None);
        assert_eq!(map.world_to_cell(1.0, 0.0), None);
    }

    #[test]
    fn test_threshold_marks_dark_cells() {
        let map = OccupancyMap::from_fn(4, 1, 0.1, |col, _| [0u8, 127, 128, 255][col]).unwrap();
        assert!(map.is_obstacle(0, 0));
        assert!(map.is_obstacle(1, 0));
        assert!(!map.is_obstacle(2, 0));
        assert!(!map.is_obstacle(3, 0));
        assert!(!map.is_obstacle(4, 0));
        assert_eq!(map.obstacle_count(), 2);
    }
}
