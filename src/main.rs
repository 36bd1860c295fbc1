use std::path::Path;
use std::str::FromStr;

use clap::{Arg, Command};
use navsim::evaluation::{EpisodeMetrics, EvaluationError};
use navsim::logging::{init_logging, LogConfig, LogOutput};
use navsim::models::NavigationConfig;
use navsim::scenario::ScenarioConfig;

fn main() {
    // コマンドライン引数の解析
    let matches = Command::new("navsim")
        .version("0.1.0")
        .about("ライダー車両ナビゲーションシミュレータ")
        .long_about("2次元占有格子地図上でライダー搭載車両を走らせ、\n\
                     反応型ナビゲーション戦略を周回時間で評価します。")
        .arg(
            Arg::new("scenario")
                .short('s')
                .long("scenario")
                .value_name("FILE")
                .help("シナリオファイル(.yaml)のパスを指定")
        )
        .arg(
            Arg::new("info")
                .short('i')
                .long("info")
                .action(clap::ArgAction::SetTrue)
                .help("シナリオの情報のみ表示して終了")
        )
        .arg(
            Arg::new("strategy")
                .long("strategy")
                .value_name("NAME")
                .help("指定した戦略のみ評価 (direct_avoidance, largest_gap, weighted_gap, equidistance_pid)")
        )
        .arg(
            Arg::new("log-output")
                .long("log-output")
                .value_name("TARGET")
                .default_value("console")
                .help("ログ出力先 (console, file, both)")
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(clap::ArgAction::Count)
                .help("詳細出力レベル (-v: 基本, -vv: 詳細, -vvv: ティック単位)")
        )
        .get_matches();

    let verbose_level = matches.get_count("verbose");
    let log_output = matches
        .get_one::<String>("log-output")
        .map(|s| LogOutput::from_str(s))
        .unwrap_or(Ok(LogOutput::Console));
    let log_output = match log_output {
        Ok(output) => output,
        Err(e) => {
            eprintln!("エラー: {}", e);
            std::process::exit(2);
        }
    };

    let log_config = LogConfig {
        output: log_output,
        ..LogConfig::default()
    }
    .with_verbosity(verbose_level);
    if let Err(e) = init_logging(log_config) {
        eprintln!("警告: ログ初期化に失敗しました: {}", e);
    }

    println!("ライダー車両ナビゲーションシミュレータ - navsim v0.1.0");
    println!();

    if let Some(scenario_path) = matches.get_one::<String>("scenario") {
        let strategy = matches.get_one::<String>("strategy").map(String::as_str);
        if let Err(e) = run_scenario(scenario_path, matches.get_flag("info"), strategy, verbose_level) {
            eprintln!("エラー: {}", e);
            std::process::exit(1);
        }
    } else {
        show_default_help();
    }
}

/// シナリオファイルを読み込んで実行
fn run_scenario(
    scenario_path: &str,
    info_only: bool,
    strategy: Option<&str>,
    verbose_level: u8,
) -> Result<(), Box<dyn std::error::Error>> {
    let scenario = ScenarioConfig::from_file(scenario_path)?;

    if verbose_level > 0 {
        println!("シナリオファイル読み込み完了: {}", scenario_path);
    }

    if info_only {
        scenario.print_summary();
        return Ok(());
    }

    let configs: Vec<NavigationConfig> = scenario
        .navigation
        .iter()
        .filter(|c| strategy.is_none_or(|name| c.name() == name))
        .cloned()
        .collect();
    if configs.is_empty() {
        return Err(format!("戦略 '{}' はシナリオに含まれていません", strategy.unwrap_or("")).into());
    }

    scenario.print_summary();
    println!();

    let base_dir = Path::new(scenario_path).parent().unwrap_or(Path::new("."));
    let map = scenario.load_map(base_dir)?;
    let evaluator = scenario.build_evaluator(map)?;

    let results: Vec<Result<EpisodeMetrics, EvaluationError>> = if configs.len() == 1 {
        vec![evaluator.evaluate(&configs[0])]
    } else {
        evaluator.evaluate_batch_blocking(&configs)?
    };

    println!("=== 評価結果 ===");
    let mut failures = 0;
    for (config, result) in configs.iter().zip(results) {
        match result {
            Ok(metrics) => print_metrics(config, &metrics),
            Err(e) => {
                failures += 1;
                println!("  {:<18} エラー: {}", config.name(), e);
            }
        }
    }

    if failures > 0 {
        return Err(format!("{}件の評価が失敗しました", failures).into());
    }
    Ok(())
}

fn print_metrics(config: &NavigationConfig, metrics: &EpisodeMetrics) {
    println!(
        "  {:<18} 終了理由: {:<10} 時間: {:>6.2}秒 距離: {:>6.2}m スコア: {:>8.3} 順位スコア: {:>9.1} ({}ステップ)",
        config.name(),
        metrics.termination.to_string(),
        metrics.elapsed_sim_time,
        metrics.distance_traveled,
        metrics.score,
        metrics.ranking_score(),
        metrics.steps
    );
}

/// デフォルトヘルプを表示
fn show_default_help() {
    println!("使用方法:");
    println!("  navsim [オプション]");
    println!();
    println!("オプション:");
    println!("  -s, --scenario <FILE>     シナリオファイルを指定して実行");
    println!("  -i, --info                シナリオ情報のみ表示");
    println!("      --strategy <NAME>     指定した戦略のみ評価");
    println!("      --log-output <TARGET> ログ出力先 (console, file, both)");
    println!("  -v, --verbose             詳細出力 (複数指定で詳細レベル上昇)");
    println!("  -h, --help                このヘルプを表示");
    println!();
    println!("例:");
    println!("  navsim -s scenarios/oval_track.yaml");
    println!("  navsim -s scenarios/oval_track.yaml --strategy weighted_gap -vv");
    println!("  navsim -s scenarios/oval_track.yaml -i");
}
