//! # navsim
//!
//! 2次元占有格子地図上で距離センサー（ライダー）を搭載した車両を走らせ、
//! 反応型の障害物回避戦略を評価するシミュレータです。
//!
//! - [`models`]: 地図・センサー・車両・衝突判定・ナビゲーション戦略
//! - [`simulation`]: 1ティック分の閉ループ処理
//! - [`evaluation`]: エピソードの実行と評価値の算出、並列バッチ評価
//! - [`scenario`]: YAMLシナリオファイル
//! - [`map_loader`]: ラスタ画像からの地図読み込み
//! - [`logging`]: tracingによるログ出力設定

pub mod evaluation;
pub mod logging;
pub mod map_loader;
pub mod models;
pub mod scenario;
pub mod simulation;
