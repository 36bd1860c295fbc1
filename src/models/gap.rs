//! 空き領域（ギャップ）抽出
//!
//! 直接回避とギャップ追従の両戦略が共有する、連続した空きビーム列の抽出処理です。
//! 走査は線形で、インデックスN-1と0の間の折り返しは結合しません。

use crate::models::{common::math_utils, lidar::Scan};

/// ギャップが見つからない場合の後退速度（m/s）
pub const REVERSE_SPEED: f64 = -0.2;

/// ギャップ追従時の最低前進速度（m/s）
pub const MIN_FORWARD_SPEED: f64 = 0.2;

/// ギャップ抽出パラメータ
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GapParams {
    /// 停止距離（メートル）
    pub stop_distance: f64,
    /// 安全マージン（メートル）
    pub safety_margin: f64,
    /// 採用する最小ギャップ幅（メートル）
    pub min_gap_width: f64,
    /// 距離の上限（NoHitもこの値で埋める）
    pub max_detection_dist: f64,
}

impl GapParams {
    /// 空きとみなす距離の閾値
    pub fn free_threshold(&self) -> f64 {
        self.stop_distance + self.safety_margin
    }
}

/// 連続した空きビーム列
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gap {
    /// 開始インデックス
    pub start_idx: usize,
    /// 終了インデックス（この値を含まない）
    pub end_idx: usize,
    /// 区間内の平均距離（メートル）
    pub mean_range: f64,
    /// 先頭ビームから末尾ビームまでの角度幅（ラジアン）
    pub angular_width: f64,
    /// 通過可能幅の近似値 = 平均距離 × 角度幅（メートル）
    pub width: f64,
    /// 中心ビームのインデックス
    pub center_idx: usize,
    /// 中心方向（(-π, π]に正規化済み）
    pub center_angle: f64,
}

/// スキャンからギャップ候補を全て抽出します
///
/// NoHitは `max_detection_dist` で埋め、全ての距離をその値で頭打ちにしてから、
/// 閾値 `stop_distance + safety_margin` を超える連続区間を探します。
/// 末尾まで続いている区間も候補に含めます。
///
/// # 引数
///
/// * `scan` - 1ティック分のスキャン
/// * `params` - 抽出パラメータ
///
/// # 戻り値
///
/// 幅が `min_gap_width` 以上のギャップ（インデックス昇順）
pub fn find_gaps(scan: &Scan, params: &GapParams) -> Vec<Gap> {
    let ranges: Vec<f64> = scan
        .ranges_or(params.max_detection_dist)
        .into_iter()
        .map(|r| r.min(params.max_detection_dist))
        .collect();
    let increment = scan.angle_increment();
    let threshold = params.free_threshold();

    let mut gaps = Vec::new();
    let mut gap_start: Option<usize> = None;

    for (i, range) in ranges.iter().enumerate() {
        if *range > threshold {
            if gap_start.is_none() {
                gap_start = Some(i);
            }
        } else if let Some(start) = gap_start.take() {
            push_if_wide(&mut gaps, &ranges, start, i, increment, params);
        }
    }

    // 最後のギャップ
    if let Some(start) = gap_start {
        push_if_wide(&mut gaps, &ranges, start, ranges.len(), increment, params);
    }

    gaps
}

fn push_if_wide(
    gaps: &mut Vec<Gap>,
    ranges: &[f64],
    start: usize,
    end: usize,
    increment: f64,
    params: &GapParams,
) {
    let segment = &ranges[start..end];
    let count = segment.len();
    let mean_range = segment.iter().sum::<f64>() / count as f64;
    let angular_width = (count - 1) as f64 * increment;
    let width = (mean_range * angular_width).abs();

    if width >= params.min_gap_width {
        let center_idx = start + count / 2;
        gaps.push(Gap {
            start_idx: start,
            end_idx: end,
            mean_range,
            angular_width,
            width,
            center_idx,
            center_angle: math_utils::normalize_angle(center_idx as f64 * increment),
        });
    }
}

/// 最も幅の広いギャップを選択（同値の場合は先に見つかったもの）
pub fn widest_gap(gaps: &[Gap]) -> Option<&Gap> {
    let mut best: Option<&Gap> = None;
    for gap in gaps {
        if best.is_none_or(|b| gap.width > b.width) {
            best = Some(gap);
        }
    }
    best
}
