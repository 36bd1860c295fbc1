//! ラスタ画像からの地図読み込み
//!
//! グレースケール画像（PGM/PNG/BMP）を読み込み、輝度の閾値処理で
//! [`OccupancyMap`] を作成します。画像の1行目が地図の最大Y側になります。

use std::path::{Path, PathBuf};

use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::{ConfigError, OccupancyMap, DEFAULT_OBSTACLE_THRESHOLD};

fn default_obstacle_threshold() -> u8 {
    DEFAULT_OBSTACLE_THRESHOLD
}

/// 地図ファイルの指定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapSource {
    /// 画像ファイルのパス（シナリオファイルからの相対パス可）
    pub image: PathBuf,
    /// セルあたりのメートル数
    pub resolution: f64,
    /// この値未満の輝度を障害物とみなす
    #[serde(default = "default_obstacle_threshold")]
    pub obstacle_threshold: u8,
}

/// 地図読み込みエラー
#[derive(Debug)]
pub enum MapLoadError {
    FileNotFound(PathBuf),
    Decode(PathBuf, image::ImageError),
    InvalidMap(PathBuf, ConfigError),
}

impl std::fmt::Display for MapLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MapLoadError::FileNotFound(path) => {
                write!(f, "地図画像が見つかりません: {}", path.display())
            }
            MapLoadError::Decode(path, err) => {
                write!(f, "地図画像の読み込みエラー {}: {}", path.display(), err)
            }
            MapLoadError::InvalidMap(path, err) => {
                write!(f, "地図が不正です {}: {}", path.display(), err)
            }
        }
    }
}

impl std::error::Error for MapLoadError {}

/// グレースケール画像から地図を作成
pub fn from_gray_image(
    image: &GrayImage,
    resolution: f64,
    obstacle_threshold: u8,
) -> Result<OccupancyMap, ConfigError> {
    let (width, height) = image.dimensions();
    OccupancyMap::new(
        width as usize,
        height as usize,
        resolution,
        image.as_raw().clone(),
        obstacle_threshold,
    )
}

/// 画像ファイルから地図を読み込みます
///
/// # 引数
///
/// * `path` - 画像ファイルのパス
/// * `resolution` - セルあたりのメートル数
/// * `obstacle_threshold` - 障害物判定閾値
///
/// # 戻り値
///
/// 読み込んだ地図、失敗した場合は `MapLoadError`
pub fn load_map<P: AsRef<Path>>(
    path: P,
    resolution: f64,
    obstacle_threshold: u8,
) -> Result<OccupancyMap, MapLoadError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(MapLoadError::FileNotFound(path.to_path_buf()));
    }

    let image = image::open(path)
        .map_err(|e| MapLoadError::Decode(path.to_path_buf(), e))?
        .into_luma8();
    let map = from_gray_image(&image, resolution, obstacle_threshold)
        .map_err(|e| MapLoadError::InvalidMap(path.to_path_buf(), e))?;

    info!(
        "地図読み込み完了: {} ({}x{}セル, {:.1}x{:.1}m, 障害物{}セル)",
        path.display(),
        map.width(),
        map.height(),
        map.width_m(),
        map.height_m(),
        map.obstacle_count()
    );

    Ok(map)
}

/// 地図指定から読み込み（相対パスは `base_dir` 基準）
pub fn load_source(source: &MapSource, base_dir: &Path) -> Result<OccupancyMap, MapLoadError> {
    let path = if source.image.is_absolute() {
        source.image.clone()
    } else {
        base_dir.join(&source.image)
    };
    load_map(path, source.resolution, source.obstacle_threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_from_gray_image_keeps_row_order() {
        // 上端の行だけ黒
        let image = GrayImage::from_fn(4, 3, |_, y| if y == 0 { Luma([0]) } else { Luma([255]) });
        let map = from_gray_image(&image, 0.5, 128).unwrap();

        assert_eq!(map.width(), 4);
        assert_eq!(map.height(), 3);
        assert!(map.is_obstacle(2, 0));
        assert!(!map.is_obstacle(2, 2));
        // 行0は最大Y側
        assert!(map.is_obstacle_at(1.0, 1.4));
        assert!(!map.is_obstacle_at(1.0, 0.2));
    }

    #[test]
    fn test_load_png_round_trip() {
        let image = GrayImage::from_fn(10, 6, |x, _| if x < 2 { Luma([10]) } else { Luma([240]) });
        let path = std::env::temp_dir().join(format!("navsim_map_loader_{}.png", std::process::id()));
        image.save(&path).unwrap();

        let map = load_map(&path, 0.05, 128).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(map.obstacle_count(), 12);
        assert!((map.resolution() - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_missing_file() {
        let result = load_map("does/not/exist.pgm", 0.05, 128);
        assert!(matches!(result, Err(MapLoadError::FileNotFound(_))));
    }

    #[test]
    fn test_invalid_resolution_reported() {
        let image = GrayImage::from_pixel(2, 2, Luma([255]));
        assert!(matches!(
            from_gray_image(&image, 0.0, 128),
            Err(ConfigError::InvalidResolution(_))
        ));
    }
}
