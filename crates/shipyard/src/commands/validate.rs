use crate::utils;
use colored::Colorize;
use shipyard_container::{RunOptions, plan_group};
use std::path::Path;

/// 定義を静的に検証して起動順を表示する（Dockerには接続しない）
pub fn handle(file: Option<&Path>) -> anyhow::Result<()> {
    println!("{}", "設定を検証中...".blue());

    let group = utils::load_group(file)?;
    let plan = match plan_group(&group, &RunOptions::default()) {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ 設定エラー".red().bold());
            eprintln!("  {}", e);
            return Err(anyhow::anyhow!("設定の検証に失敗しました"));
        }
    };

    println!("{}", "✓ 設定ファイルは正常です！".green().bold());
    println!();
    println!("グループ: {}", plan.group.cyan());
    if let Some(version) = plan.api_version {
        println!("必要なDocker APIバージョン: {}", version);
    }
    println!("起動順:");
    for (i, level) in plan.levels.iter().enumerate() {
        let aliases: Vec<String> = level
            .iter()
            .map(|c| format!("{} ({})", c.spec.alias.cyan(), c.spec.image))
            .collect();
        println!("  {}. {}", i + 1, aliases.join(", "));
    }

    let skipped: Vec<&str> = group
        .containers
        .iter()
        .filter(|c| c.skip)
        .map(|c| c.alias.as_str())
        .collect();
    if !skipped.is_empty() {
        println!("スキップ: {}", skipped.join(", ").dimmed());
    }
    Ok(())
}
